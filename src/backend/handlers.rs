use super::state::{BackendState, RecordRow};
use crate::errors::AppError;
use crate::login::{RESEND_COOLDOWN, is_valid_phone};
use crate::models::{
    ApiEnvelope, CreateRecordRequest, LoginRequest, LoginResponse, RefreshTokenRequest,
    SendCodeRequest, TodayRecord, WeightOption,
};
use crate::record_cache::shanghai_date;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};
use chrono::Utc;
use tracing::{info, warn};

pub async fn send_code(
    State(state): State<BackendState>,
    Json(payload): Json<SendCodeRequest>,
) -> Result<Json<ApiEnvelope<String>>, AppError> {
    let phone = payload.phone.trim().to_string();
    if !is_valid_phone(&phone) {
        return Ok(Json(ApiEnvelope::fail(400, "invalid phone number")));
    }

    let now = Utc::now().timestamp_millis();
    let cooldown_ms = RESEND_COOLDOWN.as_millis() as i64;
    let wait_ms = state
        .data
        .read(|data| data.code_sent_at.get(&phone).map(|sent| sent + cooldown_ms - now))
        .await
        .filter(|wait| *wait > 0);
    if let Some(wait_ms) = wait_ms {
        let seconds = (wait_ms + 999) / 1000;
        return Ok(Json(ApiEnvelope::fail(
            429,
            format!("发送过于频繁，请{seconds}秒后再试"),
        )));
    }

    state
        .data
        .update(|data| {
            data.prune_expired(now);
            data.code_sent_at.insert(phone, now);
        })
        .await?;
    info!("verification code issued");
    Ok(Json(ApiEnvelope::ok("verification code sent".to_string())))
}

pub async fn login(
    State(state): State<BackendState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiEnvelope<LoginResponse>>, AppError> {
    if !is_valid_phone(&payload.phone) {
        return Ok(Json(ApiEnvelope::fail(400, "invalid phone number")));
    }
    if payload.code != state.config.login_code {
        warn!("login rejected: wrong code");
        return Ok(Json(ApiEnvelope::fail(401, "invalid or expired verification code")));
    }

    let now = Utc::now().timestamp_millis();
    let login = state
        .data
        .update(|data| {
            let user_id = data.user_for_phone(&payload.phone);
            state.issue_tokens(data, user_id, now)
        })
        .await?;

    info!(user_id = login.user_id, "user logged in");
    Ok(Json(ApiEnvelope::ok(login)))
}

pub async fn refresh_token(
    State(state): State<BackendState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<ApiEnvelope<LoginResponse>>, AppError> {
    let now = Utc::now().timestamp_millis();
    let rotated = state
        .data
        .update(|data| {
            let user_id = data.revoke_grant(&payload.refresh_token)?;
            Some(state.issue_tokens(data, user_id, now))
        })
        .await?;

    match rotated {
        Some(login) => {
            info!(user_id = login.user_id, "token pair rotated");
            Ok(Json(ApiEnvelope::ok(login)))
        }
        None => Ok(Json(ApiEnvelope::fail(401, "refresh token invalid"))),
    }
}

pub async fn create_record(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRecordRequest>,
) -> Result<Json<ApiEnvelope<i64>>, AppError> {
    let user_id = authorize(&state, &headers).await?;
    let Some(option) = WeightOption::from_code(i64::from(payload.weight_type)) else {
        return Ok(Json(ApiEnvelope::fail(400, "weightType must be 1 or 2")));
    };

    let now = Utc::now();
    let today = shanghai_date(now).to_string();
    let created = state
        .data
        .update(|data| {
            if data.record_on(user_id, &today).is_some() {
                return None;
            }
            data.next_record_id += 1;
            let id = data.next_record_id;
            data.records.push(RecordRow {
                id,
                user_id,
                weight_type: option.code(),
                record_date: today.clone(),
                create_time: now.to_rfc3339(),
            });
            Some(id)
        })
        .await?;

    match created {
        Some(id) => {
            info!(user_id, record_id = id, option = option.label(), "record created");
            Ok(Json(ApiEnvelope::ok(id)))
        }
        None => Ok(Json(ApiEnvelope::fail(409, "already recorded today"))),
    }
}

pub async fn get_today_record(
    State(state): State<BackendState>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<TodayRecord>>, AppError> {
    let user_id = authorize(&state, &headers).await?;
    let today = shanghai_date(Utc::now()).to_string();

    let record = state
        .data
        .read(|data| {
            data.record_on(user_id, &today).map(|row| TodayRecord {
                id: Some(row.id),
                user_id: Some(row.user_id),
                weight_type: Some(i64::from(row.weight_type)),
                record_date: Some(row.record_date.clone()),
                create_time: Some(row.create_time.clone()),
            })
        })
        .await;

    Ok(Json(match record {
        Some(record) => ApiEnvelope::ok(record),
        None => ApiEnvelope::empty(),
    }))
}

async fn authorize(state: &BackendState, headers: &HeaderMap) -> Result<i64, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

    let now = Utc::now().timestamp_millis();
    state
        .data
        .read(|data| {
            data.access_tokens
                .get(token)
                .filter(|issued| issued.expires_at_millis > now)
                .map(|issued| issued.user_id)
        })
        .await
        .ok_or_else(|| AppError::unauthorized("access token invalid or expired"))
}
