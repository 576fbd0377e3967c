//! Control surface gateway.
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared [`AppState`], so `main.rs` never sees individual
//! endpoints.

use axum::Router;

use crate::app::AppState;

mod capture;
mod health;
mod status;
mod timelapse;

// ---

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(capture::router())
        .merge(timelapse::router())
        .merge(status::router())
        .merge(health::router())
        .with_state(state)
}
