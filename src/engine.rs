//! Engine (C12): the single composition root. One `Engine` value is built
//! at startup and handed to every axum handler as `State<Arc<Engine>>`,
//! replacing the teacher's scattered `AppState`/`ApiAppState` split
//! (Design Notes, "Global service singletons").

use crate::artifacts::cache::ArtifactCache;
use crate::artifacts::config_writer::ConfigWriter;
use crate::artifacts::installer::ArtifactInstaller;
use crate::artifacts::version_resolver::VersionResolver;
use crate::backup::BackupManager;
use crate::catalog::cache::FileDetailCache;
use crate::catalog::client::CatalogClient;
use crate::config::Config;
use crate::core::process_manager::ProcessSupervisor;
use crate::core::progress_channel::ProgressChannel;
use crate::core::server_registry::{NewServerRequest, ServerPatch, ServerRegistry};
use crate::core::subscription_hub::SubscriptionHub;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::host_executor::{DirectExecutor, HostExecutor};
use crate::models::{EngineFamily, GameOptions, LogLine, ServerProperty, ServerRecord, ServerState, StorageKind};
use crate::provisioning::orchestrator::ProvisioningOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Direct (non-modpack) server creation request for the `create(record)` operation.
pub struct CreateServerRequest {
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineFamily,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    pub jvm_opts: Option<String>,
    pub auto_start: bool,
    pub backup_schedule_enabled: bool,
    pub storage_path: Option<String>,
    pub game_options: Option<GameOptions>,
}

pub struct Engine {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub registry: Arc<ServerRegistry>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub hub: Arc<SubscriptionHub>,
    pub progress: Arc<ProgressChannel>,
    pub catalog: Arc<CatalogClient>,
    pub file_detail_cache: Arc<FileDetailCache>,
    pub artifact_cache: Arc<ArtifactCache>,
    pub backups: Arc<BackupManager>,
    pub provisioning: Arc<ProvisioningOrchestrator>,
    pub host_executor: Arc<dyn HostExecutor>,
}

impl Engine {
    pub async fn build(config: Config) -> anyhow::Result<Arc<Self>> {
        let config = Arc::new(config);
        let db = Arc::new(Database::connect(&config.database_url).await?);
        let registry = Arc::new(ServerRegistry::new(db.clone()));
        let hub = SubscriptionHub::new();
        let progress = ProgressChannel::new();
        let host_executor: Arc<dyn HostExecutor> = Arc::new(DirectExecutor);

        let supervisor = ProcessSupervisor::new(registry.clone(), hub.clone(), host_executor.clone());

        let catalog = Arc::new(CatalogClient::new("https://api.hearth-catalog.invalid/v1", config.catalog_api_key.clone()));
        let file_detail_cache = Arc::new(FileDetailCache::new(catalog.clone()));

        let artifact_cache_dir = config.servers_base_dir.join(".artifact-cache");
        let artifact_cache = Arc::new(ArtifactCache::new(artifact_cache_dir));

        let backups_dir = config.servers_base_dir.join(".backups");
        let backups = BackupManager::new(db.clone(), registry.clone(), backups_dir);

        let provisioning = ProvisioningOrchestrator::new(catalog.clone(), registry.clone(), progress.clone(), db.clone(), config.servers_base_dir.clone());

        Ok(Arc::new(Self {
            config,
            db,
            registry,
            supervisor,
            hub,
            progress,
            catalog,
            file_detail_cache,
            artifact_cache,
            backups,
            provisioning,
            host_executor,
        }))
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.registry.list().await
    }

    pub async fn get_server(&self, id: Uuid) -> Result<ServerRecord> {
        self.registry.get(id).await
    }

    pub async fn create_server(&self, request: CreateServerRequest) -> Result<ServerRecord> {
        let port = self.registry.find_available_port(request.port).await?;
        let storage_path = request
            .storage_path
            .unwrap_or_else(|| self.config.servers_base_dir.join(uuid::Uuid::new_v4().to_string()).to_string_lossy().into_owned());
        tokio::fs::create_dir_all(&storage_path).await?;
        self.registry
            .create(NewServerRequest {
                name: request.name,
                description: request.description,
                engine: request.engine,
                version: request.version,
                requested_port: port,
                memory_mb: request.memory_mb,
                jvm_opts: request.jvm_opts.unwrap_or_default(),
                auto_start: request.auto_start,
                backup_schedule_enabled: request.backup_schedule_enabled,
                storage_kind: StorageKind::BindPath,
                storage_path,
                game_options: request.game_options.unwrap_or_default(),
                modpack_id: None,
            })
            .await
    }

    pub async fn update_server(&self, id: Uuid, patch: ServerPatch) -> Result<ServerRecord> {
        self.registry.update(id, patch).await
    }

    pub async fn get_server_properties(&self, id: Uuid) -> Result<Vec<ServerProperty>> {
        self.registry.list_properties(id).await
    }

    pub async fn set_server_properties(&self, id: Uuid, properties: Vec<ServerProperty>) -> Result<Vec<ServerProperty>> {
        self.registry.set_properties(id, properties).await
    }

    /// Data flow per the concurrency model: C9 reserves Starting, C3/C4
    /// materialize the executable, C5 writes config, C6 spawns. Any failure
    /// before the process is spawned persists `ServerState::Error` instead of
    /// leaving the record in whatever state it was already in.
    pub async fn start_server(&self, id: Uuid) -> Result<()> {
        let record = self.registry.get(id).await?;
        if record.state == ServerState::Running || record.state == ServerState::Starting {
            return Err(AppError::AlreadyRunning {
                message: format!("server {id} is already {:?}", record.state),
            });
        }

        match self.prepare_and_spawn(&record).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.registry.set_state(id, ServerState::Error, record.process_handle.clone()).await;
                Err(err)
            }
        }
    }

    async fn prepare_and_spawn(&self, record: &ServerRecord) -> Result<()> {
        let server_dir = PathBuf::from(&record.storage_path);
        tokio::fs::create_dir_all(&server_dir).await?;

        let installer = ArtifactInstaller::new(self.host_executor.clone());
        let runnable = match installer.detect_runnable(&server_dir, record.engine).await {
            Ok(runnable) => runnable,
            Err(_) => {
                let resolver = VersionResolver::new();
                let plan = resolver.resolve(record.engine, &record.version).await?;
                installer.install(&plan, &server_dir, record.engine).await?
            }
        };

        let overrides = self.registry.list_properties(record.id).await?;
        ConfigWriter::write_all(record, &overrides, &server_dir).await?;
        self.supervisor.start(record, &runnable, &server_dir).await
    }

    pub async fn stop_server(&self, id: Uuid) -> Result<()> {
        self.supervisor.stop(id).await
    }

    pub async fn restart_server(&self, id: Uuid) -> Result<()> {
        self.supervisor.stop(id).await?;
        self.start_server(id).await
    }

    pub async fn send_command(&self, id: Uuid, text: &str) -> Result<()> {
        self.supervisor.send_command(id, text).await
    }

    /// Synchronous log snapshot: the current backlog, without keeping the
    /// subscription's receiver alive.
    pub async fn logs_snapshot(&self, id: Uuid) -> Result<Vec<LogLine>> {
        self.registry.get(id).await?;
        let subscription = self.hub.subscribe_logs(id).await;
        Ok(subscription.backlog)
    }

    pub async fn list_engine_versions(&self, engine: EngineFamily) -> Result<Vec<(String, crate::artifacts::version_resolver::ReleaseChannel)>> {
        VersionResolver::new().list_versions(engine).await
    }

    /// Enriched mod list for one modpack file: downloads the archive,
    /// parses `manifest.json`, and joins it against catalog metadata.
    pub async fn expand_modpack_mods(&self, modpack_id: &str, file_id: &str) -> Result<Vec<crate::catalog::types::ModEntry>> {
        let file_detail = self.file_detail_cache.get(modpack_id, file_id).await?;
        crate::catalog::expansion::expand_mod_list(&self.catalog, &file_detail).await
    }

    pub async fn expand_modpack_mods_latest(&self, modpack_id: &str) -> Result<Vec<crate::catalog::types::ModEntry>> {
        let file_detail = self.catalog.latest_file(modpack_id).await?;
        crate::catalog::expansion::expand_mod_list(&self.catalog, &file_detail).await
    }

    /// Cancels in-flight work and stops a spawned process before removing
    /// the durable record, per the concurrency model's cancellation rule.
    pub async fn delete_server(&self, id: Uuid) -> Result<()> {
        let record = self.registry.get(id).await?;
        if matches!(record.state, ServerState::Starting | ServerState::Running | ServerState::Stopping) {
            let _ = self.supervisor.stop(id).await;
        }
        self.registry.delete(id).await?;
        Ok(())
    }
}
