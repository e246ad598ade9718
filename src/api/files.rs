//! File browser/editor scoped to one server's storage root (C11).

use crate::core::safe_filesystem::{DirEntry, SafeFilesystem};
use crate::engine::Engine;
use crate::error::{AppError, Result};
use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{body::Bytes, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/servers/:id/files", get(list).delete(delete_path))
        .route("/servers/:id/files/read", get(read))
        .route("/servers/:id/files/download", get(download))
        .route("/servers/:id/files/write", axum::routing::post(write))
        .route("/servers/:id/files/upload", axum::routing::post(upload))
        .route("/servers/:id/files/mkdir", axum::routing::post(mkdir))
}

#[derive(Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

async fn filesystem_for(engine: &Engine, server_id: Uuid) -> Result<SafeFilesystem> {
    let record = engine.get_server(server_id).await?;
    Ok(SafeFilesystem::new(record.storage_path))
}

async fn list(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Query(q): Query<PathQuery>) -> Result<Json<Vec<DirEntry>>> {
    let fs = filesystem_for(&engine, id).await?;
    Ok(Json(fs.list(&q.path).await?))
}

async fn read(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Query(q): Query<PathQuery>) -> Result<Vec<u8>> {
    let fs = filesystem_for(&engine, id).await?;
    fs.read(&q.path).await
}

async fn download(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Query(q): Query<PathQuery>) -> Result<impl IntoResponse> {
    let fs = filesystem_for(&engine, id).await?;
    let bytes = fs.read(&q.path).await?;
    let filename = q.path.rsplit('/').next().unwrap_or("download").to_string();
    Ok((
        [(
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        bytes,
    ))
}

#[derive(Deserialize)]
struct WriteBody {
    path: String,
    content: String,
}

async fn write(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Json(body): Json<WriteBody>) -> Result<()> {
    let fs = filesystem_for(&engine, id).await?;
    fs.write(&body.path, body.content.as_bytes()).await
}

async fn upload(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Query(q): Query<PathQuery>, mut multipart: Multipart) -> Result<()> {
    let fs = filesystem_for(&engine, id).await?;
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::InvalidRequest { message: e.to_string() })? {
        let relative = if q.path.is_empty() {
            field.file_name().unwrap_or("upload.bin").to_string()
        } else {
            format!("{}/{}", q.path.trim_end_matches('/'), field.file_name().unwrap_or("upload.bin"))
        };
        let data: Bytes = field.bytes().await.map_err(|e| AppError::InvalidRequest { message: e.to_string() })?;
        fs.write(&relative, &data).await?;
    }
    Ok(())
}

#[derive(Deserialize)]
struct MkdirBody {
    path: String,
}

async fn mkdir(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Json(body): Json<MkdirBody>) -> Result<()> {
    let fs = filesystem_for(&engine, id).await?;
    fs.mkdir(&body.path).await
}

async fn delete_path(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Query(q): Query<PathQuery>) -> Result<()> {
    let fs = filesystem_for(&engine, id).await?;
    fs.delete(&q.path).await
}
