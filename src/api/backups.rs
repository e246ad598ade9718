//! Backup lifecycle operations (C16), scoped to a server.

use crate::engine::Engine;
use crate::error::Result;
use crate::models::{BackupRecord, BackupType};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/servers/:id/backups", get(list).post(create))
        .route("/backups/:id", get(get_one).delete(delete_one))
        .route("/backups/:id/restore", post(restore))
}

async fn list(State(engine): State<Arc<Engine>>, Path(server_id): Path<Uuid>) -> Result<Json<Vec<BackupRecord>>> {
    Ok(Json(engine.backups.list(server_id).await?))
}

#[derive(Deserialize)]
struct CreateBackupBody {
    name: String,
}

async fn create(State(engine): State<Arc<Engine>>, Path(server_id): Path<Uuid>, Json(body): Json<CreateBackupBody>) -> Result<Json<BackupRecord>> {
    Ok(Json(engine.backups.create(server_id, body.name, BackupType::Manual).await?))
}

async fn get_one(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<Json<BackupRecord>> {
    Ok(Json(engine.backups.get(id).await?))
}

async fn delete_one(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.backups.delete(id).await
}

async fn restore(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.backups.restore(id).await
}
