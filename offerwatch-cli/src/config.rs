use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use offer_monitor::SessionStore;

/// Persisted monitor state: session cookies, the credentials that allow
/// re-login, and the push key. All fields are optional; an absent file
/// loads as the empty config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bark_key: Option<String>,
}

impl AppConfig {
    /// Resolve the config path: the explicit flag when given, otherwise
    /// `<config_dir>/offerwatch/config.json`.
    pub fn resolve_path(flag: Option<&Path>) -> PathBuf {
        if let Some(path) = flag {
            return path.to_owned();
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offerwatch")
            .join("config.json")
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, raw)
    }

    pub fn has_session(&self) -> bool {
        self.cookies.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Session store that rewrites the cookie field of the config file,
/// leaving the other fields as they are on disk.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn persist(&self, cookies: &str) -> io::Result<()> {
        let mut config = AppConfig::load(&self.path)?;
        config.cookies = Some(cookies.to_owned());
        config.save(&self.path)
    }
}
