use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("local storage unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode local state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid response")]
    InvalidResponse,

    #[error("HTTP error: {0}")]
    Http(u16),

    /// Backend copy, shown verbatim.
    #[error("{0}")]
    Api(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Http(401))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("please enter an 11-digit mobile number")]
    InvalidPhone,

    #[error("please enter the 6-digit verification code")]
    InvalidCode,

    #[error("please wait {remaining_secs}s before requesting another code")]
    CoolingDown { remaining_secs: u64 },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("already recorded today, come back tomorrow")]
    AlreadyRecorded,

    #[error("not logged in")]
    NotLoggedIn,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Error returned by the development backend's handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
