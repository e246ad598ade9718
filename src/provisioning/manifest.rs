//! Modpack manifest parsing. Grounded on
//! `hostd::modpack_installer::{ModpackManifest, CurseForgeManifest}`,
//! narrowed to the fields the orchestrator actually consumes.

use crate::error::{AppError, Result};
use crate::models::EngineFamily;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModpackManifest {
    pub name: String,
    pub version: String,
    pub overrides: Option<String>,
    pub minecraft: ManifestMinecraft,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestMinecraft {
    pub version: String,
    #[serde(rename = "modLoaders")]
    pub mod_loaders: Vec<ManifestModLoader>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestModLoader {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestFile {
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "fileID")]
    pub file_id: u64,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Result of classifying a manifest's primary modloader.
#[derive(Debug, Clone)]
pub struct ClassifiedLoader {
    pub engine: EngineFamily,
    /// The exact version string to store on the `ServerRecord`, per the
    /// engine family's version semantics.
    pub server_version: String,
}

impl ModpackManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| AppError::ManifestInvalid {
            message: format!("manifest.json did not parse: {e}"),
        })
    }

    pub fn overrides_folder(&self) -> &str {
        self.overrides.as_deref().unwrap_or("overrides")
    }

    /// Prefix-matches the primary `modLoaders[*].id` against known engine
    /// families (`forge-*` -> Forge, `fabric-*` -> Fabric, `neoforge-*` ->
    /// NeoForge), else falls back to Vanilla.
    pub fn classify_loader(&self) -> Result<ClassifiedLoader> {
        let mc_version = self.minecraft.version.clone();
        let primary = self
            .minecraft
            .mod_loaders
            .iter()
            .find(|l| l.primary)
            .or_else(|| self.minecraft.mod_loaders.first());

        let Some(primary) = primary else {
            return Ok(ClassifiedLoader {
                engine: EngineFamily::Vanilla,
                server_version: mc_version,
            });
        };

        if let Some(forge_version) = primary.id.strip_prefix("forge-") {
            return Ok(ClassifiedLoader {
                engine: EngineFamily::Forge,
                server_version: format!("{mc_version}-{forge_version}"),
            });
        }
        if let Some(fabric_version) = primary.id.strip_prefix("fabric-") {
            let version = if fabric_version.is_empty() { "0.15.11".to_string() } else { fabric_version.to_string() };
            return Ok(ClassifiedLoader {
                engine: EngineFamily::Fabric,
                server_version: version,
            });
        }
        if let Some(neo_version) = primary.id.strip_prefix("neoforge-") {
            return Ok(ClassifiedLoader {
                engine: EngineFamily::NeoForge,
                server_version: neo_version.to_string(),
            });
        }

        Ok(ClassifiedLoader {
            engine: EngineFamily::Vanilla,
            server_version: mc_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_json(loader_id: &str) -> Vec<u8> {
        format!(
            r#"{{
                "name": "pack1",
                "version": "1.0.0",
                "overrides": "overrides",
                "minecraft": {{
                    "version": "1.20.1",
                    "modLoaders": [{{"id": "{loader_id}", "primary": true}}]
                }},
                "files": [
                    {{"projectID": 1, "fileID": 10, "required": true}},
                    {{"projectID": 2, "fileID": 20}}
                ]
            }}"#
        )
        .into_bytes()
    }

    #[test]
    fn classifies_forge_with_composite_version() {
        let manifest = ModpackManifest::parse(&manifest_json("forge-47.2.0")).unwrap();
        let classified = manifest.classify_loader().unwrap();
        assert_eq!(classified.engine, EngineFamily::Forge);
        assert_eq!(classified.server_version, "1.20.1-47.2.0");
    }

    #[test]
    fn classifies_fabric_with_fallback_version() {
        let manifest = ModpackManifest::parse(&manifest_json("fabric-")).unwrap();
        let classified = manifest.classify_loader().unwrap();
        assert_eq!(classified.engine, EngineFamily::Fabric);
        assert_eq!(classified.server_version, "0.15.11");
    }

    #[test]
    fn unknown_loader_falls_back_to_vanilla() {
        let manifest = ModpackManifest::parse(&manifest_json("quilt-0.20.0")).unwrap();
        let classified = manifest.classify_loader().unwrap();
        assert_eq!(classified.engine, EngineFamily::Vanilla);
        assert_eq!(classified.server_version, "1.20.1");
    }

    #[test]
    fn missing_required_file_defaults_to_true() {
        let manifest = ModpackManifest::parse(&manifest_json("forge-47.2.0")).unwrap();
        assert!(manifest.files[1].required);
    }

    #[test]
    fn malformed_json_is_manifest_invalid() {
        let err = ModpackManifest::parse(b"not json").unwrap_err();
        assert_eq!(err.kind(), "ManifestInvalid");
    }
}
