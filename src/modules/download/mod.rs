use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod dto;
pub mod executor;
pub mod handler;
pub mod metadata;
pub mod model;
pub mod publisher;
pub mod sanitize;
pub mod service;
pub mod stream_handler;
pub mod validation;

pub use executor::JobExecutor;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::download))
        .route("/progress", get(stream_handler::download_progress))
}
