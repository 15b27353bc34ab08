use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;

pub mod controller;
pub mod dto;
pub mod handler;
pub mod service;
pub mod session;
pub mod stream_handler;

pub use session::SessionStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handler::get_queue)
                .post(handler::enqueue)
                .delete(handler::clear_queue),
        )
        .route("/bulk", post(handler::enqueue_bulk))
        .route("/run", post(handler::run_queue))
        .route("/completed", delete(handler::prune_completed))
        .route("/{id}", delete(handler::remove_job))
        .route("/{id}/events", get(stream_handler::job_events))
}

pub fn session_router() -> Router<AppState> {
    Router::new().route("/", delete(handler::end_session))
}
