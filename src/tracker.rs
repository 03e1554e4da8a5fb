use crate::client::ApiClient;
use crate::errors::{StoreError, TrackError};
use crate::models::WeightOption;
use crate::record_cache::RecordCache;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodayStatus {
    pub option: Option<WeightOption>,
}

impl TodayStatus {
    pub fn recorded(&self) -> bool {
        self.option.is_some()
    }
}

/// Today's answer for the logged-in user, local first and remote second.
pub struct TodayTracker {
    client: ApiClient,
    session: Arc<SessionStore>,
    records: RecordCache,
}

impl TodayTracker {
    pub fn new(client: ApiClient, records: RecordCache) -> Self {
        let session = Arc::clone(client.session());
        Self {
            client,
            session,
            records,
        }
    }

    /// Cached state, after dropping a mark from a previous day.
    pub async fn local_status(&self) -> Result<TodayStatus, StoreError> {
        let Some(user_id) = self.session.user_id() else {
            return Ok(TodayStatus::default());
        };

        self.records.reconcile_if_stale(Some(user_id)).await?;
        Ok(TodayStatus {
            option: self.records.today_option(Some(user_id)).await,
        })
    }

    /// Asks the backend and makes the cache agree with it.
    pub async fn sync_with_remote(&self) -> Result<TodayStatus, TrackError> {
        let Some(user_id) = self.session.user_id() else {
            return Err(TrackError::NotLoggedIn);
        };

        let remote = self.client.get_today_record().await?;
        let option = self
            .records
            .reconcile_with_remote(Some(user_id), remote.as_ref())
            .await?;
        Ok(TodayStatus { option })
    }

    /// Local state when the backend cannot be reached.
    pub async fn check_today(&self) -> Result<TodayStatus, StoreError> {
        let local = self.local_status().await?;
        if !self.session.is_logged_in() {
            return Ok(local);
        }

        match self.sync_with_remote().await {
            Ok(remote) => Ok(remote),
            Err(TrackError::Storage(err)) => Err(err),
            Err(err) => {
                warn!("today record query failed, keeping local state: {err}");
                Ok(local)
            }
        }
    }

    pub async fn submit(&self, option: WeightOption) -> Result<i64, TrackError> {
        if self.local_status().await?.recorded() {
            return Err(TrackError::AlreadyRecorded);
        }
        // The mark belongs to whoever submitted, even if the session
        // changes while the request is in flight.
        let user_id = match self.session.user_id() {
            Some(user_id) if self.session.is_logged_in() => user_id,
            _ => return Err(TrackError::NotLoggedIn),
        };

        let record_id = match self.client.create_record(option).await {
            Ok(record_id) => record_id,
            Err(err) if err.is_unauthorized() => {
                info!("token rejected after refresh, logging out");
                self.session.logout().await?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        self.records.save(Some(user_id), option).await?;
        Ok(record_id)
    }
}
