//! Persisted login session: identity, token pair, and inactivity tracking.
//!
//! Login state changes are published on a single [`watch`] channel. Every
//! `save` and `logout` sends exactly once, so a re-login while already
//! logged in still reaches subscribers.

use crate::errors::StoreError;
use crate::storage::{LocalStore, StoredSession};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Sessions unused for longer than this many days are dropped at startup.
pub const INACTIVITY_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginStatus {
    pub logged_in: bool,
    pub user_id: Option<i64>,
    pub phone: Option<String>,
}

impl From<&StoredSession> for LoginStatus {
    fn from(session: &StoredSession) -> Self {
        let logged_in =
            session.user_id.is_some() && session.phone.is_some() && session.access_token.is_some();
        Self {
            logged_in,
            user_id: session.user_id,
            phone: session.phone.clone(),
        }
    }
}

pub struct SessionStore {
    store: Arc<LocalStore>,
    status: watch::Sender<LoginStatus>,
}

impl SessionStore {
    pub async fn open(store: Arc<LocalStore>) -> Result<Self, StoreError> {
        Self::open_at(store, Utc::now()).await
    }

    /// Loads the persisted session and clears it when it has been idle
    /// beyond [`INACTIVITY_RETENTION_DAYS`].
    pub async fn open_at(store: Arc<LocalStore>, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let status = store.read(|data| LoginStatus::from(&data.session)).await;
        let session = Self {
            store,
            status: watch::Sender::new(status),
        };

        if session.is_inactive_beyond_retention_at(now).await {
            info!("session idle for more than {INACTIVITY_RETENTION_DAYS} days, logging out");
            session.logout().await?;
        }

        Ok(session)
    }

    pub fn subscribe(&self) -> watch::Receiver<LoginStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> LoginStatus {
        self.status.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.status.borrow().logged_in
    }

    pub fn user_id(&self) -> Option<i64> {
        self.status.borrow().user_id
    }

    pub async fn access_token(&self) -> Option<String> {
        self.store.read(|data| data.session.access_token.clone()).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.store.read(|data| data.session.refresh_token.clone()).await
    }

    pub async fn snapshot(&self) -> StoredSession {
        self.store.read(|data| data.session.clone()).await
    }

    pub async fn save(
        &self,
        user_id: i64,
        phone: &str,
        access_token: &str,
        refresh_token: &str,
        expire_time_millis: i64,
    ) -> Result<(), StoreError> {
        self.save_at(user_id, phone, access_token, refresh_token, expire_time_millis, Utc::now())
            .await
    }

    pub async fn save_at(
        &self,
        user_id: i64,
        phone: &str,
        access_token: &str,
        refresh_token: &str,
        expire_time_millis: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let session = StoredSession {
            user_id: Some(user_id),
            phone: Some(phone.to_string()),
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            expire_time_millis: Some(expire_time_millis),
            last_used_at_seconds: Some(epoch_seconds(now)),
        };
        let status = LoginStatus::from(&session);
        self.store.update(|data| data.session = session).await?;

        info!(user_id, "session saved");
        self.status.send_replace(status);
        Ok(())
    }

    /// Replaces the token pair; identity and login status are untouched.
    pub async fn update_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expire_time_millis: i64,
    ) -> Result<(), StoreError> {
        self.update_tokens_at(access_token, refresh_token, expire_time_millis, Utc::now())
            .await
    }

    pub async fn update_tokens_at(
        &self,
        access_token: &str,
        refresh_token: &str,
        expire_time_millis: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store
            .update(|data| {
                data.session.access_token = Some(access_token.to_string());
                data.session.refresh_token = Some(refresh_token.to_string());
                data.session.expire_time_millis = Some(expire_time_millis);
                data.session.last_used_at_seconds = Some(epoch_seconds(now));
            })
            .await
    }

    pub async fn touch(&self) -> Result<(), StoreError> {
        self.touch_at(Utc::now()).await
    }

    pub async fn touch_at(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.store
            .update(|data| data.session.last_used_at_seconds = Some(epoch_seconds(now)))
            .await
    }

    pub async fn is_token_expired(&self) -> bool {
        self.is_token_expired_at(Utc::now()).await
    }

    /// Expiry exactly at `now` counts as expired.
    pub async fn is_token_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.store.read(|data| data.session.expire_time_millis).await {
            Some(expire_time_millis) => expire_time_millis <= now.timestamp_millis(),
            None => true,
        }
    }

    pub async fn is_inactive_beyond_retention(&self) -> bool {
        self.is_inactive_beyond_retention_at(Utc::now()).await
    }

    pub async fn is_inactive_beyond_retention_at(&self, now: DateTime<Utc>) -> bool {
        match self.store.read(|data| data.session.last_used_at_seconds).await {
            Some(last_used) => {
                let retention = Duration::days(INACTIVITY_RETENTION_DAYS);
                epoch_seconds(now) - last_used > retention.num_seconds() as f64
            }
            None => false,
        }
    }

    pub async fn logout(&self) -> Result<(), StoreError> {
        self.store
            .update(|data| data.session = StoredSession::default())
            .await?;

        info!("session cleared");
        self.status.send_replace(LoginStatus::default());
        Ok(())
    }
}

fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}
