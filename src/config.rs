use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::SortOption;
use crate::error::CurtainError;

pub const CONFIG_FILE: &str = "curtain-search.json";
pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub default_sort: Option<SortOption>,
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_root: Utf8PathBuf,
    pub max_workers: usize,
    pub default_sort: SortOption,
    pub collections: BTreeMap<String, Vec<String>>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CurtainError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CurtainError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CurtainError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CurtainError> {
        let data_root = match config.data_root {
            Some(root) => Utf8PathBuf::from(root),
            None => default_data_root()?,
        };
        let collections = config
            .collections
            .into_iter()
            .map(|(name, members)| {
                let members = members
                    .into_iter()
                    .map(|member| member.trim().to_string())
                    .filter(|member| !member.is_empty())
                    .collect();
                (name, members)
            })
            .collect();

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            data_root,
            max_workers: config.max_workers.unwrap_or(DEFAULT_MAX_WORKERS).max(1),
            default_sort: config.default_sort.unwrap_or_default(),
            collections,
        })
    }
}

pub fn default_data_root() -> Result<Utf8PathBuf, CurtainError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("curtain-search")).ok())
        .ok_or_else(|| CurtainError::Filesystem("unable to resolve data directory".to_string()))
}
