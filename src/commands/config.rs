use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WpaiError};
use crate::util::expand_tilde;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WpaiConfig {
    pub version: u32,
    /// Endpoint that accepts archive uploads and answers with a public URL.
    pub upload_endpoint: String,
    /// Endpoint that removes a project's stored archives.
    pub delete_endpoint: String,
    /// Origin used to build `/share/<projectId>` links.
    pub share_base_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub download_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_project: Option<String>,
}

impl Default for WpaiConfig {
    fn default() -> Self {
        Self {
            version: 1,
            upload_endpoint: "http://localhost:3000/api/upload".into(),
            delete_endpoint: "http://localhost:3000/api/delete-file".into(),
            share_base_url: "http://localhost:3000".into(),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            customer_id: None,
            download_dir: "~/Downloads".into(),
            last_active_project: None,
        }
    }
}

impl WpaiConfig {
    /// Download directory with `~` expanded.
    pub fn download_path(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.download_dir))
    }

    pub fn share_link(&self, project_id: &str) -> String {
        format!(
            "{}/share/{project_id}",
            self.share_base_url.trim_end_matches('/')
        )
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".wpai").join("config.json"))
}

/// Reads the config from the default location; missing or unreadable files yield `None`.
pub async fn load_config() -> Option<WpaiConfig> {
    load_config_from(&config_path()?).await
}

pub async fn load_config_from(path: &Path) -> Option<WpaiConfig> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Ignoring unreadable config at {}: {e}", path.display());
            None
        }
    }
}

pub async fn load_config_or_default() -> WpaiConfig {
    load_config().await.unwrap_or_default()
}

pub async fn save_config(config: &WpaiConfig) -> Result<()> {
    let path = config_path()
        .ok_or_else(|| WpaiError::Custom("Cannot find home directory".into()))?;
    save_config_to(&path, config).await
}

pub async fn save_config_to(path: &Path, config: &WpaiConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Records the project the user last worked on.
pub async fn save_last_active_project(path: &Path, slug: &str) -> Result<WpaiConfig> {
    let mut config = load_config_from(path).await.unwrap_or_default();
    config.last_active_project = Some(slug.to_string());
    save_config_to(path, &config).await?;
    Ok(config)
}
