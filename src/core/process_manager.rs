//! Process Supervisor (C6): owns the live child process for each running
//! server, detects state transitions from its log output, and enforces the
//! graceful-stop escalation contract. Grounded on
//! `hostd::core::process_manager::ProcessManager`.

use crate::core::server_registry::ServerRegistry;
use crate::core::subscription_hub::SubscriptionHub;
use crate::error::{AppError, Result};
use crate::host_executor::HostExecutor;
use crate::models::{LogLine, LogStream, RunnableDescriptor, RunnableKind, ServerRecord, ServerState};
use chrono::Utc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use uuid::Uuid;

const LOG_RING_CAPACITY: usize = 1000;
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(30);
const TERMINATE_TO_KILL_DELAY: Duration = Duration::from_secs(5);

/// Which log phrases flip a server's reported state. Matching is
/// case-insensitive and never allowed to regress Running back to Starting.
fn detect_transition(current: ServerState, text: &str) -> Option<ServerState> {
    let lower = text.to_ascii_lowercase();
    if current != ServerState::Running
        && (lower.contains("starting minecraft server") || lower.contains("starting net.minecraft.server"))
    {
        return Some(ServerState::Starting);
    }
    if lower.contains("done") && (lower.contains("for help") || lower.contains("help")) {
        return Some(ServerState::Running);
    }
    if current == ServerState::Running
        && (text.contains("Stopping server") || text.contains("Stopping the server") || text.contains("Saving worlds"))
    {
        return Some(ServerState::Stopping);
    }
    None
}

struct ManagedProcess {
    child: Child,
    stdin: ChildStdin,
    log_ring: VecDeque<LogLine>,
    seq: AtomicU64,
}

pub struct ProcessSupervisor {
    registry: Arc<ServerRegistry>,
    hub: Arc<SubscriptionHub>,
    executor: Arc<dyn HostExecutor>,
    processes: Arc<RwLock<HashMap<Uuid, Arc<Mutex<ManagedProcess>>>>>,
}

impl ProcessSupervisor {
    pub fn new(registry: Arc<ServerRegistry>, hub: Arc<SubscriptionHub>, executor: Arc<dyn HostExecutor>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            hub,
            executor,
            processes: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn build_launch_argv(record: &ServerRecord, runnable: &RunnableDescriptor) -> Vec<String> {
        match runnable.kind {
            RunnableKind::Script => vec![runnable.path.to_string_lossy().into_owned()],
            RunnableKind::Jar => {
                let mut argv = vec!["java".to_string()];
                argv.push(format!("-Xmx{}M", record.memory_mb));
                argv.push(format!("-Xms{}M", record.memory_mb.min(1024)));
                if !record.jvm_opts.is_empty() {
                    argv.extend(record.jvm_opts.split_whitespace().map(str::to_string));
                }
                argv.push("-jar".to_string());
                argv.push(runnable.path.to_string_lossy().into_owned());
                argv.push("nogui".to_string());
                argv
            }
        }
    }

    pub async fn start(&self, record: &ServerRecord, runnable: &RunnableDescriptor, cwd: &Path) -> Result<()> {
        if record.state == ServerState::Running || record.state == ServerState::Starting {
            return Err(AppError::AlreadyRunning {
                message: format!("server {} is already {:?}", record.id, record.state),
            });
        }
        {
            let processes = self.processes.read().await;
            if processes.contains_key(&record.id) {
                return Err(AppError::AlreadyRunning {
                    message: format!("server {} already has a tracked process", record.id),
                });
            }
        }

        let argv = Self::build_launch_argv(record, runnable);
        let mut child = self.executor.spawn(&argv, cwd)?;
        let stdin = child.stdin.take().ok_or_else(|| AppError::internal("child spawned without stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| AppError::internal("child spawned without stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| AppError::internal("child spawned without stderr"))?;

        let managed = Arc::new(Mutex::new(ManagedProcess {
            child,
            stdin,
            log_ring: VecDeque::with_capacity(LOG_RING_CAPACITY),
            seq: AtomicU64::new(0),
        }));

        self.processes.write().await.insert(record.id, managed.clone());
        self.registry.set_state(record.id, ServerState::Starting, Some(record.id.to_string())).await?;
        self.hub.publish_state(record.id, ServerState::Starting).await;

        self.spawn_log_reader(record.id, managed.clone(), BufReader::new(stdout), LogStream::Stdout);
        self.spawn_log_reader(record.id, managed.clone(), BufReader::new(stderr), LogStream::Stderr);
        self.spawn_exit_watcher(record.id, managed);

        Ok(())
    }

    fn spawn_log_reader<R>(&self, server_id: Uuid, managed: Arc<Mutex<ManagedProcess>>, mut reader: BufReader<R>, stream: LogStream)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let registry = self.registry.clone();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            let mut buf = String::new();
            loop {
                buf.clear();
                match reader.read_line(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = buf.trim_end_matches(['\r', '\n']).to_string();
                        let seq = {
                            let mut guard = managed.lock().await;
                            let seq = guard.seq.fetch_add(1, Ordering::Relaxed);
                            let line = LogLine {
                                server_id,
                                seq,
                                wall_time: Utc::now(),
                                stream,
                                text: text.clone(),
                            };
                            guard.log_ring.push_back(line);
                            if guard.log_ring.len() > LOG_RING_CAPACITY {
                                guard.log_ring.pop_front();
                            }
                            seq
                        };
                        let line = LogLine {
                            server_id,
                            seq,
                            wall_time: Utc::now(),
                            stream,
                            text: text.clone(),
                        };
                        hub.publish_log(server_id, line).await;

                        if let Ok(record) = registry.get(server_id).await {
                            if let Some(next_state) = detect_transition(record.state, &text) {
                                if next_state != record.state {
                                    tracing::info!(server_id = %server_id, from = ?record.state, to = ?next_state, "log-driven state transition");
                                    let _ = registry.set_state(server_id, next_state, record.process_handle.clone()).await;
                                    hub.publish_state(server_id, next_state).await;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(server_id = %server_id, error = %err, "log reader error");
                        break;
                    }
                }
            }
        });
    }

    fn spawn_exit_watcher(&self, server_id: Uuid, managed: Arc<Mutex<ManagedProcess>>) {
        let registry = self.registry.clone();
        let hub = self.hub.clone();
        let processes = self.processes.clone();
        tokio::spawn(async move {
            let status = {
                let mut guard = managed.lock().await;
                guard.child.wait().await
            };
            let final_state = match status {
                Ok(status) if status.success() => ServerState::Exited,
                _ => ServerState::Error,
            };
            tracing::info!(server_id = %server_id, ?final_state, "child process exited");
            let _ = registry.set_state(server_id, final_state, None).await;
            hub.publish_state(server_id, final_state).await;
            processes.write().await.remove(&server_id);
        });
    }

    pub async fn send_command(&self, server_id: Uuid, text: &str) -> Result<()> {
        let record = self.registry.get(server_id).await?;
        if record.state != ServerState::Running {
            return Err(AppError::NotRunning {
                message: format!("server {server_id} is not running"),
            });
        }
        let processes = self.processes.read().await;
        let managed = processes.get(&server_id).ok_or_else(|| AppError::NotRunning {
            message: format!("server {server_id} has no tracked process"),
        })?;
        let mut guard = managed.lock().await;
        guard.stdin.write_all(format!("{text}\n").as_bytes()).await?;
        guard.stdin.flush().await?;
        let seq = guard.seq.fetch_add(1, Ordering::Relaxed);
        let echo = LogLine {
            server_id,
            seq,
            wall_time: Utc::now(),
            stream: LogStream::System,
            text: format!("> {text}"),
        };
        guard.log_ring.push_back(echo.clone());
        drop(guard);
        self.hub.publish_log(server_id, echo).await;
        Ok(())
    }

    pub async fn stop(&self, server_id: Uuid) -> Result<()> {
        let record = self.registry.get(server_id).await?;
        if record.state == ServerState::Stopped || record.state == ServerState::Exited {
            return Err(AppError::AlreadyStopped {
                message: format!("server {server_id} is already stopped"),
            });
        }

        self.registry.set_state(server_id, ServerState::Stopping, record.process_handle.clone()).await?;
        self.hub.publish_state(server_id, ServerState::Stopping).await;

        if record.state == ServerState::Running {
            let _ = self.send_command(server_id, "stop").await;
        }

        let pid = {
            let processes = self.processes.read().await;
            match processes.get(&server_id) {
                Some(managed) => managed.lock().await.child.id(),
                None => None,
            }
        };

        tokio::time::sleep(GRACEFUL_STOP_TIMEOUT).await;
        if !self.is_running(server_id).await {
            return Ok(());
        }

        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        tokio::time::sleep(TERMINATE_TO_KILL_DELAY).await;
        if !self.is_running(server_id).await {
            return Ok(());
        }
        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        Ok(())
    }

    async fn is_running(&self, server_id: Uuid) -> bool {
        self.processes.read().await.contains_key(&server_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_requires_banner() {
        assert_eq!(
            detect_transition(ServerState::Stopped, "Starting minecraft server version 1.20.4"),
            Some(ServerState::Starting)
        );
        assert_eq!(detect_transition(ServerState::Stopped, "loading world"), None);
    }

    #[test]
    fn running_requires_done_and_help() {
        assert_eq!(
            detect_transition(ServerState::Starting, "Done (12.345s)! For help, type \"help\""),
            Some(ServerState::Running)
        );
        assert_eq!(detect_transition(ServerState::Starting, "Done loading chunk"), None);
    }

    #[test]
    fn running_never_regresses_to_starting() {
        assert_eq!(
            detect_transition(ServerState::Running, "Starting minecraft server version 1.20.4"),
            None
        );
    }

    #[test]
    fn stopping_detected_only_while_running() {
        assert_eq!(
            detect_transition(ServerState::Running, "Stopping the server"),
            Some(ServerState::Stopping)
        );
        assert_eq!(detect_transition(ServerState::Starting, "Stopping the server"), None);
    }

    #[test]
    fn launch_argv_for_jar_includes_memory_flags() {
        let mut record = sample_record();
        record.memory_mb = 4096;
        record.jvm_opts = "-XX:+UseG1GC".to_string();
        let runnable = RunnableDescriptor {
            kind: RunnableKind::Jar,
            path: "/srv/server.jar".into(),
        };
        let argv = ProcessSupervisor::build_launch_argv(&record, &runnable);
        assert_eq!(argv[0], "java");
        assert!(argv.contains(&"-Xmx4096M".to_string()));
        assert!(argv.contains(&"-Xms1024M".to_string()));
        assert!(argv.contains(&"-XX:+UseG1GC".to_string()));
        assert_eq!(argv.last().unwrap(), "nogui");
    }

    #[test]
    fn launch_argv_clamps_xms_below_one_gigabyte() {
        let mut record = sample_record();
        record.memory_mb = 512;
        let runnable = RunnableDescriptor {
            kind: RunnableKind::Jar,
            path: "/srv/server.jar".into(),
        };
        let argv = ProcessSupervisor::build_launch_argv(&record, &runnable);
        assert!(argv.contains(&"-Xmx512M".to_string()));
        assert!(argv.contains(&"-Xms512M".to_string()));
    }

    fn sample_record() -> ServerRecord {
        ServerRecord {
            id: Uuid::new_v4(),
            name: "alpha".to_string(),
            description: None,
            engine: crate::models::EngineFamily::Vanilla,
            version: "1.20.4".to_string(),
            port: 25565,
            memory_mb: 2048,
            jvm_opts: String::new(),
            auto_start: false,
            backup_schedule_enabled: false,
            state: ServerState::Stopped,
            storage_kind: crate::models::StorageKind::BindPath,
            storage_path: "/tmp/alpha".to_string(),
            process_handle: None,
            game_options: crate::models::GameOptions::default(),
            modpack_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
