use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::convert::{BUNDLER_MODULE, CONVERTER_MODULE};

const CONFIG_FILE: &str = "config.json";
const ENV_CONFIG: &str = "LLMHUB_CONFIG";
const ENV_MODELS_DIR: &str = "LLMHUB_MODELS_DIR";
const ENV_ASSETS_DIR: &str = "LLMHUB_ASSETS_DIR";
const ENV_HUB_ENDPOINT: &str = "HF_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub models_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub asset_suffix: String,
    pub catalog_path: Option<PathBuf>,
    pub hub: HubSettings,
    pub converter: ConverterSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            assets_dir: PathBuf::from("app/src/main/assets/models"),
            asset_suffix: "task".into(),
            catalog_path: None,
            hub: HubSettings::default(),
            converter: ConverterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HubSettings {
    pub endpoint: String,
    pub cache_dir: Option<PathBuf>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".into(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConverterSettings {
    pub program: String,
    pub converter_module: String,
    pub bundler_module: String,
    /// Extra import path, for a MediaPipe checkout outside the interpreter's site-packages.
    pub python_path: Option<PathBuf>,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            converter_module: CONVERTER_MODULE.into(),
            bundler_module: BUNDLER_MODULE.into(),
            python_path: None,
            timeout_secs: 6 * 60 * 60,
            probe_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// `LLMHUB_CONFIG`, then `config.json` in the platform config dir, then defaults;
    /// environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var(ENV_CONFIG) {
            Ok(path) => Self::from_path(Path::new(&path))?,
            Err(_) => match resolve_config_path() {
                Some(path) if path.exists() => Self::from_path(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
        serde_json::from_slice(&bytes).context("config json could not be parsed")
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = lookup(ENV_MODELS_DIR) {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_ASSETS_DIR) {
            self.assets_dir = PathBuf::from(dir);
        }
        if let Some(endpoint) = lookup(ENV_HUB_ENDPOINT) {
            self.hub.endpoint = endpoint;
        }
    }

    /// A positional directory argument wins over the configured models directory.
    pub fn models_dir_or(&self, arg: Option<PathBuf>) -> PathBuf {
        arg.unwrap_or_else(|| self.models_dir.clone())
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "LlmHub", "LlmHub").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
