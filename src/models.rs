//! Data model shared across the registry, supervisor, and API layers.
//! Grounded on `hostd::database::ServerConfig` and `hostd::core::app_state::ActiveServer`,
//! reshaped to match the record fields in spec.md section 3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EngineFamily {
    Vanilla,
    Paper,
    Spigot,
    Bukkit,
    Fabric,
    Forge,
    NeoForge,
    Quilt,
    Purpur,
    Folia,
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl EngineFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFamily::Vanilla => "Vanilla",
            EngineFamily::Paper => "Paper",
            EngineFamily::Spigot => "Spigot",
            EngineFamily::Bukkit => "Bukkit",
            EngineFamily::Fabric => "Fabric",
            EngineFamily::Forge => "Forge",
            EngineFamily::NeoForge => "NeoForge",
            EngineFamily::Quilt => "Quilt",
            EngineFamily::Purpur => "Purpur",
            EngineFamily::Folia => "Folia",
        }
    }

    pub fn lowercase(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl std::str::FromStr for EngineFamily {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "vanilla" => EngineFamily::Vanilla,
            "paper" => EngineFamily::Paper,
            "spigot" => EngineFamily::Spigot,
            "bukkit" => EngineFamily::Bukkit,
            "fabric" => EngineFamily::Fabric,
            "forge" => EngineFamily::Forge,
            "neoforge" => EngineFamily::NeoForge,
            "quilt" => EngineFamily::Quilt,
            "purpur" => EngineFamily::Purpur,
            "folia" => EngineFamily::Folia,
            other => {
                return Err(crate::error::AppError::InvalidRequest {
                    message: format!("unknown engine family: {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Exited,
    Error,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for ServerState {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Stopped" => ServerState::Stopped,
            "Starting" => ServerState::Starting,
            "Running" => ServerState::Running,
            "Stopping" => ServerState::Stopping,
            "Exited" => ServerState::Exited,
            "Error" => ServerState::Error,
            other => return Err(crate::error::AppError::internal(format!("bad server state {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    NamedVolume,
    BindPath,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for StorageKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NamedVolume" => StorageKind::NamedVolume,
            "BindPath" => StorageKind::BindPath,
            other => return Err(crate::error::AppError::internal(format!("bad storage kind {other}"))),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOptions {
    pub seed: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_gamemode")]
    pub gamemode: String,
    #[serde(default = "default_true")]
    pub pvp: bool,
    #[serde(default)]
    pub whitelist: bool,
    #[serde(default = "default_true")]
    pub online_mode: bool,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_motd")]
    pub motd: String,
}

fn default_difficulty() -> String {
    "normal".to_string()
}
fn default_gamemode() -> String {
    "survival".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_players() -> u32 {
    20
}
fn default_motd() -> String {
    "A Hearth-managed server".to_string()
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            seed: None,
            difficulty: default_difficulty(),
            gamemode: default_gamemode(),
            pvp: true,
            whitelist: false,
            online_mode: true,
            max_players: default_max_players(),
            motd: default_motd(),
        }
    }
}

/// Durable server record. Source of truth lives in [`crate::core::server_registry::ServerRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineFamily,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    pub jvm_opts: String,
    pub auto_start: bool,
    /// Independent of `auto_start`; see DESIGN.md for the resolved Open Question.
    pub backup_schedule_enabled: bool,
    pub state: ServerState,
    pub storage_kind: StorageKind,
    pub storage_path: String,
    pub process_handle: Option<String>,
    pub game_options: GameOptions,
    pub modpack_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProperty {
    pub server_id: Uuid,
    pub key: String,
    pub value: String,
}

/// Cached upstream catalog entry. Keyed by the catalog's own id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModpackRecord {
    pub catalog_id: String,
    pub name: String,
    pub authors: String, // JSON-encoded Vec<String>
    pub game_version: String,
    pub modloader: String,
    pub download_url: Option<String>,
    pub icon_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for BackupStatus {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => BackupStatus::Pending,
            "InProgress" => BackupStatus::InProgress,
            "Completed" => BackupStatus::Completed,
            "Failed" => BackupStatus::Failed,
            other => return Err(crate::error::AppError::internal(format!("bad backup status {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupType {
    Manual,
    Scheduled,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for BackupType {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Manual" => BackupType::Manual,
            "Scheduled" => BackupType::Scheduled,
            other => return Err(crate::error::AppError::internal(format!("bad backup type {other}"))),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub server_id: Uuid,
    pub name: String,
    pub status: BackupStatus,
    pub archive_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One line of child stdout/stderr/system output, transient per-server ring content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub server_id: Uuid,
    pub seq: u64,
    pub wall_time: DateTime<Utc>,
    pub stream: LogStream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSession {
    pub session_id: Uuid,
    pub server_id: Option<Uuid>,
    pub current_step: String,
    pub percent: u8,
    pub message: String,
    pub current: Option<u32>,
    pub total: Option<u32>,
}

/// `{kind: script|jar, path}` returned by the Artifact Installer (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnableDescriptor {
    pub kind: RunnableKind,
    pub path: std::path::PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnableKind {
    Script,
    Jar,
}
