//! Server lifecycle and registry operations.

use crate::core::server_registry::ServerPatch;
use crate::engine::{CreateServerRequest, Engine};
use crate::error::Result;
use crate::models::{EngineFamily, GameOptions, LogLine, ServerProperty, ServerRecord};
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/servers", get(list).post(create))
        .route("/servers/:id", get(get_one).put(update).delete(delete_one))
        .route("/servers/:id/start", post(start))
        .route("/servers/:id/stop", post(stop))
        .route("/servers/:id/restart", post(restart))
        .route("/servers/:id/logs", get(logs))
        .route("/servers/:id/command", post(send_command))
        .route("/servers/:id/properties", get(get_properties).put(put_properties))
        .route("/versions/:engine", get(versions))
}

async fn list(State(engine): State<Arc<Engine>>) -> Result<Json<Vec<ServerRecord>>> {
    Ok(Json(engine.list_servers().await?))
}

async fn get_one(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<Json<ServerRecord>> {
    Ok(Json(engine.get_server(id).await?))
}

#[derive(Deserialize)]
pub struct CreateServerBody {
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineFamily,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    pub jvm_opts: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub backup_schedule_enabled: bool,
    pub storage_path: Option<String>,
    pub game_options: Option<GameOptions>,
}

async fn create(State(engine): State<Arc<Engine>>, Json(body): Json<CreateServerBody>) -> Result<Json<ServerRecord>> {
    let record = engine
        .create_server(CreateServerRequest {
            name: body.name,
            description: body.description,
            engine: body.engine,
            version: body.version,
            port: body.port,
            memory_mb: body.memory_mb,
            jvm_opts: body.jvm_opts,
            auto_start: body.auto_start,
            backup_schedule_enabled: body.backup_schedule_enabled,
            storage_path: body.storage_path,
            game_options: body.game_options,
        })
        .await?;
    Ok(Json(record))
}

#[derive(Deserialize, Default)]
pub struct UpdateServerBody {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub memory_mb: Option<u32>,
    pub jvm_opts: Option<String>,
    pub auto_start: Option<bool>,
    pub backup_schedule_enabled: Option<bool>,
    pub game_options: Option<GameOptions>,
}

async fn update(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Json(body): Json<UpdateServerBody>) -> Result<Json<ServerRecord>> {
    let patch = ServerPatch {
        name: body.name,
        description: body.description,
        memory_mb: body.memory_mb,
        jvm_opts: body.jvm_opts,
        auto_start: body.auto_start,
        backup_schedule_enabled: body.backup_schedule_enabled,
        game_options: body.game_options,
    };
    Ok(Json(engine.update_server(id, patch).await?))
}

async fn delete_one(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.delete_server(id).await
}

async fn start(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.start_server(id).await
}

async fn stop(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.stop_server(id).await
}

async fn restart(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<()> {
    engine.restart_server(id).await
}

async fn logs(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<Json<Vec<LogLine>>> {
    Ok(Json(engine.logs_snapshot(id).await?))
}

#[derive(Deserialize)]
pub struct CommandBody {
    pub text: String,
}

async fn send_command(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Json(body): Json<CommandBody>) -> Result<()> {
    engine.send_command(id, &body.text).await
}

async fn get_properties(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>) -> Result<Json<Vec<ServerProperty>>> {
    Ok(Json(engine.get_server_properties(id).await?))
}

#[derive(Deserialize)]
struct PropertyEntry {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct PropertiesBody {
    properties: Vec<PropertyEntry>,
}

async fn put_properties(State(engine): State<Arc<Engine>>, Path(id): Path<Uuid>, Json(body): Json<PropertiesBody>) -> Result<Json<Vec<ServerProperty>>> {
    let properties = body
        .properties
        .into_iter()
        .map(|entry| ServerProperty { server_id: id, key: entry.key, value: entry.value })
        .collect();
    Ok(Json(engine.set_server_properties(id, properties).await?))
}

#[derive(Serialize)]
struct VersionEntry {
    version: String,
    channel: crate::artifacts::version_resolver::ReleaseChannel,
}

#[derive(Deserialize)]
struct VersionsQuery {
    #[serde(default)]
    #[allow(dead_code)]
    page: Option<u32>,
}

async fn versions(State(engine): State<Arc<Engine>>, Path(engine_family): Path<String>, Query(_query): Query<VersionsQuery>) -> Result<Json<Vec<VersionEntry>>> {
    let engine_family: EngineFamily = engine_family.parse()?;
    let versions = engine.list_engine_versions(engine_family).await?;
    Ok(Json(
        versions
            .into_iter()
            .map(|(version, channel)| VersionEntry { version, channel })
            .collect(),
    ))
}
