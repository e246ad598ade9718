//! HTTP/WS surface: one merged router over the engine composition root.

pub mod backups;
pub mod files;
pub mod health;
pub mod modpacks;
pub mod servers;
pub mod websocket;

use crate::engine::Engine;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/health", get(health::health))
        .merge(servers::router())
        .merge(files::router())
        .merge(backups::router())
        .merge(modpacks::router())
        .merge(websocket::router())
}
