use crate::config::BackendConfig;
use crate::errors::StoreError;
use crate::login::RESEND_COOLDOWN;
use crate::models::LoginResponse;
use crate::storage::JsonStore;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub user_id: i64,
    pub expires_at_millis: i64,
}

/// A refresh token and the access token issued alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshGrant {
    pub user_id: i64,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: i64,
    pub user_id: i64,
    pub weight_type: u8,
    pub record_date: String,
    pub create_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendData {
    pub next_user_id: i64,
    pub next_record_id: i64,
    /// Phone number to user id.
    pub users: BTreeMap<String, i64>,
    pub access_tokens: BTreeMap<String, IssuedToken>,
    pub refresh_tokens: BTreeMap<String, RefreshGrant>,
    /// Phone number to the epoch millis of the last code sent.
    pub code_sent_at: BTreeMap<String, i64>,
    pub records: Vec<RecordRow>,
}

impl BackendData {
    pub fn user_for_phone(&mut self, phone: &str) -> i64 {
        if let Some(id) = self.users.get(phone) {
            return *id;
        }
        self.next_user_id += 1;
        self.users.insert(phone.to_string(), self.next_user_id);
        self.next_user_id
    }

    /// Consumes a refresh token and revokes its paired access token.
    pub fn revoke_grant(&mut self, refresh_token: &str) -> Option<i64> {
        let grant = self.refresh_tokens.remove(refresh_token)?;
        self.access_tokens.remove(&grant.access_token);
        Some(grant.user_id)
    }

    /// Drops expired access tokens and send-code timestamps past the
    /// resend cooldown.
    pub fn prune_expired(&mut self, now_millis: i64) {
        let cooldown_ms = RESEND_COOLDOWN.as_millis() as i64;
        self.access_tokens
            .retain(|_, issued| issued.expires_at_millis > now_millis);
        self.code_sent_at
            .retain(|_, sent| *sent + cooldown_ms > now_millis);
    }

    pub fn record_on(&self, user_id: i64, date: &str) -> Option<&RecordRow> {
        self.records
            .iter()
            .find(|row| row.user_id == user_id && row.record_date == date)
    }
}

#[derive(Clone)]
pub struct BackendState {
    pub config: Arc<BackendConfig>,
    pub data: Arc<JsonStore<BackendData>>,
    token_seq: Arc<AtomicU64>,
}

impl BackendState {
    pub async fn open(config: BackendConfig) -> Result<Self, StoreError> {
        let data = JsonStore::open(&config.data_path).await?;
        Ok(Self {
            config: Arc::new(config),
            data: Arc::new(data),
            token_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    fn next_token(&self, kind: &str, user_id: i64, now_millis: i64) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        format!("{kind}-{user_id}-{now_millis}-{seq}")
    }

    /// Issues a fresh access/refresh pair for `user_id` into `data`.
    pub fn issue_tokens(&self, data: &mut BackendData, user_id: i64, now_millis: i64) -> LoginResponse {
        let access_token = self.next_token("at", user_id, now_millis);
        let refresh_token = self.next_token("rt", user_id, now_millis);
        let expire_time = now_millis + self.config.access_token_ttl_secs * 1000;

        data.prune_expired(now_millis);
        data.access_tokens.insert(
            access_token.clone(),
            IssuedToken {
                user_id,
                expires_at_millis: expire_time,
            },
        );
        data.refresh_tokens.insert(
            refresh_token.clone(),
            RefreshGrant {
                user_id,
                access_token: access_token.clone(),
            },
        );

        LoginResponse {
            user_id,
            access_token,
            refresh_token,
            expire_time,
        }
    }
}
