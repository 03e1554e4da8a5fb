use super::handlers;
use super::state::BackendState;
use crate::config::API_BASE_PATH;
use axum::{Router, routing::post};

pub fn router(state: BackendState) -> Router {
    let api = Router::new()
        .route("/send-code", post(handlers::send_code))
        .route("/login", post(handlers::login))
        .route("/refresh-token", post(handlers::refresh_token))
        .route("/create-record", post(handlers::create_record))
        .route("/get-today-record", post(handlers::get_today_record));

    Router::new().nest(API_BASE_PATH, api).with_state(state)
}
