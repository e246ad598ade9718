//! Version Resolver (C3): maps an `(engine, version)` pair to a
//! [`FetchPlan`] describing how the Artifact Installer should obtain a
//! runnable server. Grounded on the per-loader URL construction in
//! `hostd::loaders::forge::ForgeClient` and `hostd::version_resolver`,
//! narrowed from mod-dependency resolution to engine-jar acquisition.

use crate::error::{AppError, Result};
use crate::models::EngineFamily;
use serde::{Deserialize, Serialize};

/// What the Artifact Installer must do to produce a runnable server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchPlan {
    /// The download IS the server jar; no installer step required.
    DirectJar { url: String },
    /// Download an installer and execute it with the given arguments to
    /// produce the runnable server in place.
    InstallerRun { url: String, argv: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Release,
    Beta,
    Alpha,
}

pub struct VersionResolver {
    client: reqwest::Client,
}

impl VersionResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build the version resolver's http client"),
        }
    }

    pub async fn resolve(&self, engine: EngineFamily, version: &str) -> Result<FetchPlan> {
        match engine {
            EngineFamily::Vanilla => self.resolve_vanilla(version).await,
            EngineFamily::Paper => self.paper_like("paper", version).await,
            EngineFamily::Folia => self.paper_like("folia", version).await,
            EngineFamily::Purpur => Ok(FetchPlan::DirectJar {
                url: format!("https://api.purpurmc.org/v2/purpur/{version}/latest/download"),
            }),
            EngineFamily::Fabric => Ok(FetchPlan::DirectJar {
                url: format!("https://meta.fabricmc.net/v2/versions/loader/{version}/latest/latest/server/jar"),
            }),
            EngineFamily::Spigot | EngineFamily::Bukkit => Ok(FetchPlan::DirectJar {
                url: format!("https://cdn.getbukkit.org/spigot/spigot-{version}.jar"),
            }),
            EngineFamily::Forge => self.resolve_forge(version),
            EngineFamily::NeoForge => Ok(FetchPlan::InstallerRun {
                url: format!("https://maven.neoforged.net/releases/net/neoforged/neoforge/{version}/neoforge-{version}-installer.jar"),
                argv: vec!["--installServer".to_string()],
            }),
            EngineFamily::Quilt => Ok(FetchPlan::DirectJar {
                url: format!("https://meta.quiltmc.org/v3/versions/loader/{version}/latest/latest/server/jar"),
            }),
        }
    }

    /// Chases PaperMC's build-listing API to the highest numbered build for
    /// `version`, then builds the download URL from that real build number
    /// ("latest" is not itself a valid build-number path segment).
    async fn paper_like(&self, project: &str, version: &str) -> Result<FetchPlan> {
        let builds_url = format!("https://api.papermc.io/v2/projects/{project}/versions/{version}/builds");
        let builds: serde_json::Value = self.client.get(&builds_url).send().await?.error_for_status()?.json().await?;

        let latest_build = builds["builds"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|b| b["build"].as_u64())
            .max()
            .ok_or_else(|| AppError::UpstreamUnavailable {
                message: format!("{project} {version} has no published builds"),
            })?;

        Ok(FetchPlan::DirectJar {
            url: format!("https://api.papermc.io/v2/projects/{project}/versions/{version}/builds/{latest_build}/downloads/{project}-{version}-{latest_build}.jar"),
        })
    }

    /// `version` is the composite `"{gameVersion}-{forgeVersion}"` string
    /// (see spec's engine family version semantics); split on the last `-`.
    fn resolve_forge(&self, version: &str) -> Result<FetchPlan> {
        let (mc_version, forge_version) = version.rsplit_once('-').ok_or_else(|| AppError::InvalidRequest {
            message: format!("forge version '{version}' must be \"{{gameVersion}}-{{forgeVersion}}\""),
        })?;
        let url = format!(
            "https://maven.minecraftforge.net/net/minecraftforge/forge/{mc_version}-{forge_version}/forge-{mc_version}-{forge_version}-installer.jar"
        );
        Ok(FetchPlan::InstallerRun {
            url,
            argv: vec!["--installServer".to_string()],
        })
    }

    async fn resolve_vanilla(&self, version: &str) -> Result<FetchPlan> {
        let manifest: serde_json::Value = self
            .client
            .get("https://launchermeta.mojang.com/mc/game/version_manifest.json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let entry = manifest["versions"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|v| v["id"].as_str() == Some(version))
            .ok_or_else(|| AppError::UpstreamUnavailable {
                message: format!("unknown vanilla version {version}"),
            })?;

        let version_url = entry["url"].as_str().ok_or_else(|| AppError::UpstreamUnavailable {
            message: "version manifest entry missing url".to_string(),
        })?;

        let version_detail: serde_json::Value = self.client.get(version_url).send().await?.error_for_status()?.json().await?;

        let server_url = version_detail["downloads"]["server"]["url"]
            .as_str()
            .ok_or_else(|| AppError::UpstreamUnavailable {
                message: format!("vanilla version {version} has no server download"),
            })?;

        Ok(FetchPlan::DirectJar {
            url: server_url.to_string(),
        })
    }

    /// Metadata-only listing, grouped by release channel; used by the
    /// `versions(engine)` HTTP operation. Each family consults its own
    /// project API — Vanilla by full version manifest, Forge/Fabric/NeoForge
    /// by build listing for the "target game version" grouping spec.md
    /// calls for.
    pub async fn list_versions(&self, engine: EngineFamily) -> Result<Vec<(String, ReleaseChannel)>> {
        match engine {
            EngineFamily::Vanilla => self.list_vanilla_versions().await,
            EngineFamily::Forge => self.list_forge_versions().await,
            EngineFamily::Fabric => self.list_fabric_versions().await,
            EngineFamily::NeoForge => self.list_neoforge_versions().await,
            other => Err(AppError::InvalidRequest {
                message: format!("version listing is not implemented for {}", other.as_str()),
            }),
        }
    }

    async fn list_vanilla_versions(&self) -> Result<Vec<(String, ReleaseChannel)>> {
        let manifest: serde_json::Value = self
            .client
            .get("https://launchermeta.mojang.com/mc/game/version_manifest.json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let versions = manifest["versions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| {
                let id = v["id"].as_str()?.to_string();
                let channel = match v["type"].as_str() {
                    Some("release") => ReleaseChannel::Release,
                    Some("snapshot") => ReleaseChannel::Beta,
                    _ => ReleaseChannel::Alpha,
                };
                Some((id, channel))
            })
            .collect();
        Ok(versions)
    }

    /// `promotions_slim.json` keys are `"{gameVersion}-recommended"` /
    /// `"{gameVersion}-latest"`, values are the bare Forge version; joined
    /// into the same composite `"{gameVersion}-{forgeVersion}"` string
    /// `resolve_forge` expects back.
    async fn list_forge_versions(&self) -> Result<Vec<(String, ReleaseChannel)>> {
        let promotions: serde_json::Value = self
            .client
            .get("https://maven.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let promos = promotions["promos"].as_object().ok_or_else(|| AppError::UpstreamUnavailable {
            message: "forge promotions response missing promos object".to_string(),
        })?;
        let versions = promos
            .iter()
            .filter_map(|(key, value)| {
                let mc_version = key.rsplit_once('-')?.0;
                let forge_version = value.as_str()?;
                let channel = if key.ends_with("-recommended") { ReleaseChannel::Release } else { ReleaseChannel::Beta };
                Some((format!("{mc_version}-{forge_version}"), channel))
            })
            .collect();
        Ok(versions)
    }

    async fn list_fabric_versions(&self) -> Result<Vec<(String, ReleaseChannel)>> {
        let loaders: serde_json::Value = self
            .client
            .get("https://meta.fabricmc.net/v2/versions/loader")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let versions = loaders
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let version = entry["version"].as_str()?.to_string();
                let channel = if entry["stable"].as_bool().unwrap_or(false) {
                    ReleaseChannel::Release
                } else {
                    ReleaseChannel::Beta
                };
                Some((version, channel))
            })
            .collect();
        Ok(versions)
    }

    async fn list_neoforge_versions(&self) -> Result<Vec<(String, ReleaseChannel)>> {
        let listing: serde_json::Value = self
            .client
            .get("https://maven.neoforged.net/api/maven/versions/releases/net/neoforged/neoforge")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let versions = listing["versions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .map(|version| {
                let channel = if version.contains("beta") { ReleaseChannel::Beta } else { ReleaseChannel::Release };
                (version.to_string(), channel)
            })
            .collect();
        Ok(versions)
    }
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forge_splits_composite_version() {
        let resolver = VersionResolver::new();
        let plan = resolver.resolve(EngineFamily::Forge, "1.20.1-47.2.0").await.unwrap();
        match plan {
            FetchPlan::InstallerRun { url, argv } => {
                assert!(url.contains("1.20.1-47.2.0"));
                assert_eq!(argv, vec!["--installServer".to_string()]);
            }
            _ => panic!("expected InstallerRun"),
        }
    }

    #[tokio::test]
    async fn forge_rejects_malformed_version() {
        let resolver = VersionResolver::new();
        let err = resolver.resolve(EngineFamily::Forge, "nodash").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[tokio::test]
    async fn spigot_resolves_to_direct_mirror_jar() {
        let resolver = VersionResolver::new();
        let plan = resolver.resolve(EngineFamily::Spigot, "1.20.4").await.unwrap();
        assert!(matches!(plan, FetchPlan::DirectJar { .. }));
    }
}
