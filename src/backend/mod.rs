//! Development backend speaking the same HTTP contract as production, with
//! a fixed login code. Used for local runs and integration tests.

pub mod app;
pub mod handlers;
pub mod state;

pub use app::router;
pub use state::BackendState;
