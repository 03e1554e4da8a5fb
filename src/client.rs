//! HTTP client for the weight backend.
//!
//! Every endpoint is a JSON `POST` answering with an [`ApiEnvelope`].
//! Authenticated calls carry the session's bearer token and get at most one
//! refresh-and-retry when the backend answers 401.

use crate::errors::ClientError;
use crate::models::{
    ApiEnvelope, CreateRecordRequest, LoginRequest, LoginResponse, RefreshTokenRequest,
    SendCodeRequest, TodayRecord, WeightOption,
};
use crate::session::SessionStore;
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct RawResponse {
    path: &'static str,
    status: StatusCode,
    body: Vec<u8>,
}

impl RawResponse {
    fn require_ok(&self) -> Result<(), ClientError> {
        if self.status == StatusCode::OK {
            Ok(())
        } else {
            warn!(path = self.path, status = self.status.as_u16(), "unexpected status");
            Err(ClientError::Http(self.status.as_u16()))
        }
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<ApiEnvelope<T>, ClientError> {
        serde_json::from_slice(&self.body).map_err(|err| {
            warn!(path = self.path, "failed to decode response envelope: {err}");
            ClientError::InvalidResponse
        })
    }
}

fn into_data<T>(envelope: ApiEnvelope<T>, fallback: &str) -> Result<T, ClientError> {
    let success = envelope.is_success();
    match envelope.data {
        Some(data) if success => Ok(data),
        _ => Err(ClientError::Api(
            envelope.msg.unwrap_or_else(|| fallback.to_string()),
        )),
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, session)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub async fn send_verification_code(&self, phone: &str) -> Result<String, ClientError> {
        let request = SendCodeRequest {
            phone: phone.to_string(),
        };
        let response = self.post("send-code", &request, None).await?;

        // The backend explains rate limits in the envelope even on error
        // statuses, so decoding comes first here.
        match serde_json::from_slice::<ApiEnvelope<String>>(&response.body) {
            Ok(envelope) => into_data(envelope, "failed to send verification code"),
            Err(_) if response.status != StatusCode::OK => {
                Err(ClientError::Http(response.status.as_u16()))
            }
            Err(err) => {
                warn!("failed to decode send-code response: {err}");
                Err(ClientError::InvalidResponse)
            }
        }
    }

    pub async fn login(&self, phone: &str, code: &str) -> Result<LoginResponse, ClientError> {
        let request = LoginRequest {
            phone: phone.to_string(),
            code: code.to_string(),
        };
        let response = self.post("login", &request, None).await?;
        response.require_ok()?;

        let login = into_data(response.decode::<LoginResponse>()?, "login failed")?;
        info!(user_id = login.user_id, "logged in");
        Ok(login)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<LoginResponse, ClientError> {
        let request = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self.post("refresh-token", &request, None).await?;
        response.require_ok()?;

        into_data(response.decode::<LoginResponse>()?, "failed to refresh token")
    }

    /// `Ok(None)` when the backend has nothing for today.
    pub async fn get_today_record(&self) -> Result<Option<TodayRecord>, ClientError> {
        let response = self
            .post_authorized("get-today-record", &serde_json::json!({}))
            .await?;
        response.require_ok()?;

        let envelope = response.decode::<TodayRecord>()?;
        self.session.touch().await?;
        if envelope.is_success() {
            Ok(envelope.data)
        } else {
            debug!(msg = ?envelope.msg, "today record query unsuccessful");
            Ok(None)
        }
    }

    pub async fn create_record(&self, option: WeightOption) -> Result<i64, ClientError> {
        let request = CreateRecordRequest {
            user_id: 0,
            weight_type: option.code(),
        };
        let response = self.post_authorized("create-record", &request).await?;
        response.require_ok()?;

        let record_id = into_data(response.decode::<i64>()?, "failed to create record")?;
        self.session.touch().await?;
        info!(record_id, option = option.label(), "record created");
        Ok(record_id)
    }

    /// Refreshes the token pair first when the stored expiry has passed.
    pub async fn ensure_valid_token(&self) -> Result<(), ClientError> {
        if self.session.is_token_expired().await {
            debug!("access token expired, refreshing");
            self.refresh_session().await?;
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<(), ClientError> {
        let Some(refresh_token) = self.session.refresh_token().await else {
            return Err(ClientError::Api("not logged in or token expired".to_string()));
        };

        let tokens = self.refresh_token(&refresh_token).await?;
        self.session
            .update_tokens(&tokens.access_token, &tokens.refresh_token, tokens.expire_time)
            .await?;
        info!("access token refreshed");
        Ok(())
    }

    /// At most one refresh and one retry; the retry's response is final,
    /// whatever its status.
    async fn post_authorized<B: Serialize>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<RawResponse, ClientError> {
        self.ensure_valid_token().await?;

        let response = self.post_with_session_token(path, body).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(path, "access token rejected, refreshing and retrying once");
        self.refresh_session().await?;
        self.post_with_session_token(path, body).await
    }

    async fn post_with_session_token<B: Serialize>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<RawResponse, ClientError> {
        let token = self.session.access_token().await;
        self.post(path, body, token.as_deref()).await
    }

    async fn post<B: Serialize>(
        &self,
        path: &'static str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ClientError> {
        let mut request = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(path, status = status.as_u16(), bytes = body.len(), "response received");

        Ok(RawResponse { path, status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_data_uses_backend_message() {
        let envelope: ApiEnvelope<String> = ApiEnvelope::fail(400, "code expired");
        match into_data(envelope, "fallback") {
            Err(ClientError::Api(message)) => assert_eq!(message, "code expired"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn into_data_falls_back_when_message_missing() {
        let envelope: ApiEnvelope<i64> = serde_json::from_str(r#"{"code":500}"#).unwrap();
        match into_data(envelope, "failed to create record") {
            Err(ClientError::Api(message)) => assert_eq!(message, "failed to create record"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn successful_envelope_without_data_is_an_error() {
        let envelope: ApiEnvelope<i64> = ApiEnvelope::empty();
        assert!(matches!(into_data(envelope, "x"), Err(ClientError::Api(_))));
    }

    #[test]
    fn non_ok_status_maps_to_http_error() {
        let response = RawResponse {
            path: "login",
            status: StatusCode::BAD_GATEWAY,
            body: Vec::new(),
        };
        assert!(matches!(response.require_ok(), Err(ClientError::Http(502))));
    }
}
