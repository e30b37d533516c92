pub mod auth;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::Cache;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::HubSettings;

const TOKEN_VARS: [&str; 2] = ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];

/// Model hub operations the tooling relies on.
pub trait HubClient {
    /// Name of the principal behind the configured token, `None` when anonymous.
    fn whoami(&self) -> Result<Option<String>>;

    /// Fetches every file of `repo` and returns the local snapshot directory.
    fn snapshot(&self, repo: &str) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct Identity {
    name: String,
}

pub struct HfHub {
    endpoint: String,
    token: Option<String>,
    cache_dir: Option<PathBuf>,
    http: Client,
}

impl HfHub {
    pub fn from_settings(settings: &HubSettings) -> Result<Self> {
        let token = TOKEN_VARS
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .or_else(|| Cache::default().token());
        let http = Client::builder().build().context("create http client")?;
        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token,
            cache_dir: settings.cache_dir.clone(),
            http,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// File transfers go to the same endpoint as the identity lookup.
    fn api(&self) -> Result<Api> {
        let mut builder = ApiBuilder::new()
            .with_endpoint(self.endpoint.clone())
            .with_progress(true);
        if let Some(token) = &self.token {
            builder = builder.with_token(Some(token.clone()));
        }
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        builder.build().context("create hub api client")
    }
}

impl HubClient for HfHub {
    fn whoami(&self) -> Result<Option<String>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };
        let response = self
            .http
            .get(format!("{}/api/whoami-v2", self.endpoint))
            .bearer_auth(token)
            .send()
            .context("query hub identity")?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let identity: Identity = response
            .error_for_status()
            .context("hub identity request rejected")?
            .json()
            .context("parse hub identity")?;
        Ok(Some(identity.name))
    }

    fn snapshot(&self, repo_id: &str) -> Result<PathBuf> {
        let repo = self.api()?.model(repo_id.to_string());
        let info = repo
            .info()
            .with_context(|| format!("fetch file list for {repo_id}"))?;

        let mut root = None;
        for sibling in &info.siblings {
            tracing::info!("fetching {repo_id}/{}", sibling.rfilename);
            let path = repo
                .get(&sibling.rfilename)
                .with_context(|| format!("download {repo_id}/{}", sibling.rfilename))?;
            if root.is_none() {
                root = snapshot_root(&path, &sibling.rfilename);
            }
        }
        root.ok_or_else(|| anyhow!("repository {repo_id} has no files"))
    }
}

/// Strips the repository-relative `rfilename` off a fetched file's local path.
fn snapshot_root(local: &Path, rfilename: &str) -> Option<PathBuf> {
    let depth = Path::new(rfilename).components().count();
    let mut root = local;
    for _ in 0..depth {
        root = root.parent()?;
    }
    Some(root.to_path_buf())
}
