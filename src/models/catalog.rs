use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;
use crate::convert::Quantization;

const CATALOG_VERSION: u32 = 1;
const ENV_CATALOG: &str = "LLMHUB_CATALOG";
static EMBEDDED_CATALOG: &str = include_str!("../../catalog/gemma3.json");

static EMBEDDED: Lazy<Result<Catalog, String>> =
    Lazy::new(|| Catalog::from_json(EMBEDDED_CATALOG).map_err(|error| format!("{error:#}")));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Pre-built bundle served over plain HTTP.
    Url,
    /// Hub repository that has to be snapshotted and converted.
    Hub,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Url => "download",
            SourceKind::Hub => "conversion",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelSource {
    Url { uri: String },
    Hub { repo: String },
}

impl ModelSource {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            ModelSource::Url { .. } => SourceKind::Url,
            ModelSource::Hub { .. } => SourceKind::Hub,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            ModelSource::Url { uri } => uri,
            ModelSource::Hub { repo } => repo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: ModelSource,
    pub filename: String,
    #[serde(default)]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

impl CatalogEntry {
    #[must_use]
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.filename)
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    #[must_use]
    pub fn quantization(&self) -> Quantization {
        self.quantization.unwrap_or_default()
    }

    /// Hub page for the source, used when pointing people at license pages.
    pub fn license_page(&self) -> String {
        match &self.source {
            ModelSource::Hub { repo } => format!("https://huggingface.co/{repo}"),
            ModelSource::Url { uri } => uri
                .split("/resolve/")
                .next()
                .unwrap_or(uri.as_str())
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("model '{id}' not available for {kind}; available: {}", .available.join(", "))]
    NotFound {
        id: String,
        kind: &'static str,
        available: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    version: u32,
    models: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn embedded() -> Result<Self> {
        EMBEDDED
            .as_ref()
            .map(Clone::clone)
            .map_err(|error| anyhow!("embedded catalog is invalid: {error}"))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read catalog {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("load catalog {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: CatalogDocument =
            serde_json::from_str(text).context("catalog json could not be parsed")?;
        if document.version != CATALOG_VERSION {
            return Err(anyhow!(
                "unsupported catalog version {} (expected {})",
                document.version,
                CATALOG_VERSION
            ));
        }
        Self::from_entries(document.models)
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(anyhow!("catalog entry #{index} has an empty id"));
            }
            if entries[..index].iter().any(|other| other.id == entry.id) {
                return Err(anyhow!("duplicate catalog id '{}'", entry.id));
            }
            validate_filename(&entry.filename)
                .with_context(|| format!("catalog entry '{}'", entry.id))?;
        }
        Ok(Self { entries })
    }

    /// Resolution order: `LLMHUB_CATALOG`, the settings path, the embedded document.
    pub fn load(settings: &Settings) -> Result<Self> {
        if let Ok(path) = std::env::var(ENV_CATALOG) {
            tracing::debug!("loading catalog from {ENV_CATALOG}={path}");
            return Self::from_path(Path::new(&path));
        }
        if let Some(path) = &settings.catalog_path {
            tracing::debug!("loading catalog from settings: {}", path.display());
            return Self::from_path(path);
        }
        Self::embedded()
    }

    pub fn lookup(&self, id: &str, kind: SourceKind) -> Result<&CatalogEntry, LookupError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id && entry.kind() == kind)
            .ok_or_else(|| LookupError::NotFound {
                id: id.to_string(),
                kind: kind.label(),
                available: self.ids_of(kind),
            })
    }

    /// Any-kind lookup, for commands that act on local artifacts of either source.
    pub fn find(&self, id: &str) -> Result<&CatalogEntry, LookupError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| LookupError::NotFound {
                id: id.to_string(),
                kind: "verification",
                available: self.entries.iter().map(|entry| entry.id.clone()).collect(),
            })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entries_of(&self, kind: SourceKind) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind() == kind)
            .collect()
    }

    pub fn ids_of(&self, kind: SourceKind) -> Vec<String> {
        self.entries_of(kind)
            .into_iter()
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("filename is empty"));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(anyhow!("filename '{filename}' must be a plain file name"));
    }
    Ok(())
}
