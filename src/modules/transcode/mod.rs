use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod assembler;
pub mod dto;
pub mod events;
pub mod handler;
pub mod invoker;
pub mod job;
pub mod model;
pub mod profiles;
pub mod scheduler;
pub mod service;
pub mod stream_handler;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transcode", post(stream_handler::transcode_single))
        .route("/transcode/multi", post(handler::transcode_multi))
}

pub fn info_router() -> Router<AppState> {
    Router::new().route("/renditions", get(handler::list_renditions))
}
