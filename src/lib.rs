pub mod backend;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod login;
pub mod models;
pub mod record_cache;
pub mod session;
pub mod storage;
pub mod tracker;

pub use client::ApiClient;
pub use config::{BackendConfig, ClientConfig};
pub use context::AppContext;
pub use errors::{ClientError, LoginError, StoreError, TrackError};
pub use models::WeightOption;
pub use record_cache::RecordCache;
pub use session::{LoginStatus, SessionStore};
pub use storage::LocalStore;
pub use tracker::{TodayStatus, TodayTracker};
