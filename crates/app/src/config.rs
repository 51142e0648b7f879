use anyhow::Context;
use bandhub_core::{AssetId, CacheStatus, Identity, ReviewConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store file. Defaults to `<data dir>/bandhub/store.json`.
    #[serde(default)]
    pub store: Option<PathBuf>,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    /// Assets kept offline, by asset id.
    #[serde(default)]
    pub saved: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub uid: Option<String>,
    pub name: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bandhub").join("config.toml"))
    }

    pub fn default_store_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("bandhub").join("store.json"))
    }

    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Self::default(),
            },
        };

        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<()> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .context("no config directory")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Command line values win over the config file.
    pub fn identity(&self, uid: Option<String>, name: Option<String>) -> Identity {
        let uid = uid
            .or_else(|| self.identity.uid.clone())
            .unwrap_or_else(|| "local".to_string());
        let name = name
            .or_else(|| self.identity.name.clone())
            .unwrap_or_else(|| uid.clone());
        Identity::new(uid, name)
    }

    pub fn cache_status(&self) -> CacheStatus {
        let cache = CacheStatus::new();
        for (id, path) in &self.saved {
            cache.mark_saved(AssetId::from(id.as_str()), path.clone());
        }
        cache
    }
}
