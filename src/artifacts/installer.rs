//! Artifact Installer (C4): turns a [`FetchPlan`] into a runnable server on
//! disk. Grounded on the download/verify flow in
//! `hostd::modpack_installer::ModpackInstaller::download_file` and the
//! child-process execution idiom in `hostd::core::process_manager`.

use crate::artifacts::version_resolver::FetchPlan;
use crate::error::{AppError, Result};
use crate::host_executor::HostExecutor;
use crate::models::{EngineFamily, RunnableDescriptor, RunnableKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::time::Duration;

const INSTALLER_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const STDERR_TAIL_LINES: usize = 40;

pub struct ArtifactInstaller {
    http: reqwest::Client,
    executor: Arc<dyn HostExecutor>,
}

impl ArtifactInstaller {
    pub fn new(executor: Arc<dyn HostExecutor>) -> Self {
        Self {
            http: reqwest::Client::new(),
            executor,
        }
    }

    pub async fn install(&self, plan: &FetchPlan, server_dir: &Path, engine: EngineFamily) -> Result<RunnableDescriptor> {
        tokio::fs::create_dir_all(server_dir).await?;
        match plan {
            FetchPlan::DirectJar { url } => self.install_direct_jar(url, server_dir).await,
            FetchPlan::InstallerRun { url, argv } => self.install_via_installer(url, argv, server_dir, engine).await,
        }
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let tmp = dest.with_extension("download-tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        tokio::fs::rename(&tmp, dest).await?;
        Ok(())
    }

    async fn install_direct_jar(&self, url: &str, server_dir: &Path) -> Result<RunnableDescriptor> {
        let jar_path = server_dir.join("server.jar");
        self.download_to(url, &jar_path).await?;
        Ok(RunnableDescriptor {
            kind: RunnableKind::Jar,
            path: jar_path,
        })
    }

    async fn install_via_installer(&self, url: &str, extra_args: &[String], server_dir: &Path, engine: EngineFamily) -> Result<RunnableDescriptor> {
        let installer_path = server_dir.join("installer.jar");
        self.download_to(url, &installer_path).await?;

        let mut argv = vec!["java".to_string(), "-jar".to_string(), installer_path.to_string_lossy().into_owned()];
        argv.extend(extra_args.iter().cloned());

        let mut child = self.executor.spawn(&argv, server_dir)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let output = tokio::time::timeout(INSTALLER_TIMEOUT, async move {
            let stdout_task = async {
                if let Some(mut s) = stdout {
                    let mut buf = Vec::new();
                    let _ = tokio::io::AsyncReadExt::read_to_end(&mut s, &mut buf).await;
                    buf
                } else {
                    Vec::new()
                }
            };
            let stderr_task = async {
                if let Some(mut s) = stderr {
                    let mut buf = Vec::new();
                    let _ = tokio::io::AsyncReadExt::read_to_end(&mut s, &mut buf).await;
                    buf
                } else {
                    Vec::new()
                }
            };
            let (_stdout, stderr) = tokio::join!(stdout_task, stderr_task);
            let status = child.wait().await;
            (status, stderr)
        })
        .await
        .map_err(|_| AppError::Timeout {
            message: format!("installer did not finish within {INSTALLER_TIMEOUT:?}"),
        })?;

        let (status, stderr_bytes) = output;
        let status = status?;

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            let tail: String = stderr_text
                .lines()
                .rev()
                .take(STDERR_TAIL_LINES)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(AppError::InstallerFailed {
                message: format!("installer exited with {status}"),
                stderr_tail: tail,
            });
        }

        tokio::fs::remove_file(&installer_path).await.ok();
        self.detect_runnable(server_dir, engine).await
    }

    /// Walks well-known launch-script names, then falls back to a jar in the
    /// server directory: installer and library jars are excluded, a jar
    /// whose name carries a keyword for `engine` is preferred, and the first
    /// remaining candidate is used only when no keyword match exists.
    pub async fn detect_runnable(&self, server_dir: &Path, engine: EngineFamily) -> Result<RunnableDescriptor> {
        for script in ["run.sh", "start.sh", "run.bat", "start.bat"] {
            let candidate = server_dir.join(script);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(RunnableDescriptor {
                    kind: RunnableKind::Script,
                    path: candidate,
                });
            }
        }

        let mut entries = tokio::fs::read_dir(server_dir).await?;
        let mut candidates: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jar") {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_ascii_lowercase();
            if name.contains("installer") || is_library_jar(&name) {
                continue;
            }
            candidates.push(path);
        }
        candidates.sort();

        let keyword_match = candidates.iter().find(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_ascii_lowercase();
            jar_name_matches_engine(&name, engine)
        });

        keyword_match
            .or_else(|| candidates.first())
            .cloned()
            .map(|path| RunnableDescriptor {
                kind: RunnableKind::Jar,
                path,
            })
            .ok_or_else(|| AppError::ManifestMissing {
                message: format!("no launch script or jar found under {}", server_dir.display()),
            })
    }
}

fn is_library_jar(name: &str) -> bool {
    name.starts_with("lib-") || name.starts_with("lib_") || name.contains("library") || name.contains("libraries")
}

/// Keywords per spec: server/forge/neoforge/fabric/paper/spigot/bukkit/purpur/folia/minecraft.
fn jar_name_matches_engine(name: &str, engine: EngineFamily) -> bool {
    match engine {
        EngineFamily::Vanilla => name.contains("server") || name.contains("minecraft"),
        EngineFamily::Paper => name.contains("paper"),
        EngineFamily::Spigot => name.contains("spigot"),
        EngineFamily::Bukkit => name.contains("bukkit"),
        EngineFamily::Fabric => name.contains("fabric"),
        EngineFamily::Forge => name.contains("forge") && !name.contains("neoforge"),
        EngineFamily::NeoForge => name.contains("neoforge"),
        EngineFamily::Quilt => name.contains("quilt"),
        EngineFamily::Purpur => name.contains("purpur"),
        EngineFamily::Folia => name.contains("folia"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_executor::DirectExecutor;
    use crate::models::EngineFamily;
    use tempfile::tempdir;

    #[tokio::test]
    async fn detect_runnable_prefers_scripts_over_jars() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("server.jar"), b"jar").await.unwrap();
        tokio::fs::write(dir.path().join("run.sh"), b"#!/bin/sh\n").await.unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let runnable = installer.detect_runnable(dir.path(), EngineFamily::Vanilla).await.unwrap();
        assert_eq!(runnable.kind, RunnableKind::Script);
    }

    #[tokio::test]
    async fn detect_runnable_prefers_engine_keyword_over_other_jars() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("forge-installer.jar"), b"xxxxxxxxxxxxxxxxxxxx").await.unwrap();
        tokio::fs::write(dir.path().join("forge-1.20.1-47.2.0.jar"), b"x").await.unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let runnable = installer.detect_runnable(dir.path(), EngineFamily::Forge).await.unwrap();
        assert_eq!(runnable.path.file_name().unwrap(), "forge-1.20.1-47.2.0.jar");
    }

    #[tokio::test]
    async fn detect_runnable_does_not_match_neoforge_jar_for_forge_engine() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("neoforge-20.4.80.jar"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("server.jar"), b"x").await.unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let runnable = installer.detect_runnable(dir.path(), EngineFamily::Forge).await.unwrap();
        assert_eq!(runnable.path.file_name().unwrap(), "server.jar");
    }

    #[tokio::test]
    async fn detect_runnable_falls_back_to_first_candidate_without_keyword_match() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("custom-pack.jar"), b"x").await.unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let runnable = installer.detect_runnable(dir.path(), EngineFamily::Vanilla).await.unwrap();
        assert_eq!(runnable.path.file_name().unwrap(), "custom-pack.jar");
    }

    #[tokio::test]
    async fn detect_runnable_ignores_installer_and_library_jars() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("fabric-installer.jar"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("lib-guava.jar"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("fabric-server-launch.jar"), b"x").await.unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let runnable = installer.detect_runnable(dir.path(), EngineFamily::Fabric).await.unwrap();
        assert_eq!(runnable.path.file_name().unwrap(), "fabric-server-launch.jar");
    }

    #[tokio::test]
    async fn detect_runnable_errors_when_nothing_found() {
        let dir = tempdir().unwrap();
        let installer = ArtifactInstaller::new(Arc::new(DirectExecutor));
        let err = installer.detect_runnable(dir.path(), EngineFamily::Vanilla).await.unwrap_err();
        assert_eq!(err.kind(), "ManifestMissing");
    }
}
