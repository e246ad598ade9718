//! Modpack catalog browsing and modpack-driven server creation (C2, C8).

use crate::catalog::types::{CatalogSearchResponse, Changelog, ModEntry, ModpackDescription, ModpackMeta};
use crate::engine::Engine;
use crate::error::Result;
use crate::models::ModpackRecord;
use crate::provisioning::orchestrator::CreateServerFromModpackRequest;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/modpacks/search", get(search))
        .route("/modpacks/list", get(list_cached))
        .route("/modpacks/create-server", post(create_server))
        .route("/modpacks/:id", get(get_one))
        .route("/modpacks/:id/description", get(description))
        .route("/modpacks/:id/files", get(files))
        .route("/modpacks/:id/files/:fileId/changelog", get(changelog))
        .route("/modpacks/:id/files/:fileId/mods", get(mods_for_file))
        .route("/modpacks/:id/mods", get(mods_latest))
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    #[serde(default)]
    #[allow(dead_code)]
    game_version: Option<String>,
    #[serde(default)]
    page: u32,
}

const SEARCH_PAGE_SIZE: u32 = 20;

async fn search(State(engine): State<Arc<Engine>>, Query(q): Query<SearchQuery>) -> Result<Json<CatalogSearchResponse>> {
    let offset = q.page.saturating_mul(SEARCH_PAGE_SIZE);
    Ok(Json(engine.catalog.search(&q.query, SEARCH_PAGE_SIZE, offset).await?))
}

async fn get_one(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Result<Json<ModpackMeta>> {
    Ok(Json(engine.catalog.modpack_meta(&id).await?))
}

async fn description(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Result<Json<ModpackDescription>> {
    Ok(Json(engine.catalog.description(&id).await?))
}

#[derive(Deserialize)]
struct FilesQuery {
    #[serde(default)]
    #[allow(dead_code)]
    game_version: Option<String>,
}

async fn files(State(engine): State<Arc<Engine>>, Path(id): Path<String>, Query(_q): Query<FilesQuery>) -> Result<Json<Vec<crate::catalog::types::ModpackFile>>> {
    Ok(Json(engine.catalog.modpack_files(&id).await?))
}

async fn changelog(State(engine): State<Arc<Engine>>, Path((id, file_id)): Path<(String, String)>) -> Result<Json<Changelog>> {
    Ok(Json(engine.catalog.changelog(&id, &file_id).await?))
}

async fn mods_for_file(State(engine): State<Arc<Engine>>, Path((id, file_id)): Path<(String, String)>) -> Result<Json<Vec<ModEntry>>> {
    Ok(Json(engine.expand_modpack_mods(&id, &file_id).await?))
}

async fn mods_latest(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Result<Json<Vec<ModEntry>>> {
    Ok(Json(engine.expand_modpack_mods_latest(&id).await?))
}

async fn list_cached(State(engine): State<Arc<Engine>>) -> Result<Json<Vec<ModpackRecord>>> {
    Ok(Json(engine.db.list_modpacks().await?))
}

#[derive(Deserialize)]
struct CreateServerFromModpackBody {
    #[serde(rename = "modpackId")]
    modpack_id: String,
    #[serde(rename = "fileId")]
    file_id: String,
    name: String,
    description: Option<String>,
    port: u16,
    memory: u32,
    jvm_opts: Option<String>,
    storage_path: Option<String>,
}

#[derive(Serialize)]
struct CreateServerFromModpackResponse {
    session_id: Uuid,
}

async fn create_server(State(engine): State<Arc<Engine>>, Json(body): Json<CreateServerFromModpackBody>) -> Json<CreateServerFromModpackResponse> {
    let session_id = engine
        .provisioning
        .start(CreateServerFromModpackRequest {
            display_name: body.name,
            description: body.description,
            catalog_modpack_id: body.modpack_id,
            catalog_file_id: body.file_id,
            requested_port: body.port,
            memory_mb: body.memory,
            jvm_opts: body.jvm_opts,
            storage_path: body.storage_path,
        })
        .await;
    Json(CreateServerFromModpackResponse { session_id })
}
