use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::errors::{ClientError, StoreError};
use crate::login::LoginFlow;
use crate::record_cache::RecordCache;
use crate::session::{LoginStatus, SessionStore};
use crate::storage::LocalStore;
use crate::tracker::TodayTracker;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the client-side state and hands it to whoever drives the UI.
pub struct AppContext {
    pub session: Arc<SessionStore>,
    pub records: RecordCache,
    pub client: ApiClient,
}

impl AppContext {
    pub async fn open(config: &ClientConfig) -> Result<Self, StoreError> {
        let store = Arc::new(LocalStore::open(&config.store_path).await?);
        let session = Arc::new(SessionStore::open(Arc::clone(&store)).await?);
        let records = RecordCache::new(store);
        let client = ApiClient::new(config.base_url.clone(), Arc::clone(&session));
        info!(base_url = %config.base_url, logged_in = session.is_logged_in(), "client ready");

        Ok(Self {
            session,
            records,
            client,
        })
    }

    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(self.client.clone(), self.records.clone())
    }

    pub fn tracker(&self) -> TodayTracker {
        TodayTracker::new(self.client.clone(), self.records.clone())
    }

    /// Refreshes an expired token of a restored session; a failed refresh
    /// ends the session.
    pub async fn resume(&self) -> Result<LoginStatus, StoreError> {
        if self.session.is_logged_in() && self.session.is_token_expired().await {
            match self.client.ensure_valid_token().await {
                Ok(()) => info!("restored session refreshed"),
                Err(ClientError::Storage(err)) => return Err(err),
                Err(err) => {
                    warn!("could not refresh restored session: {err}");
                    self.session.logout().await?;
                }
            }
        }
        Ok(self.session.status())
    }
}
