// Client configuration
// Plain structs with defaults; `load` layers an optional file and PORTAL__* env vars on top.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    // None leaves the HTTP stack's own default in charge
    pub timeout_ms: Option<u64>,
    pub user_agent: String,
    pub locale: Option<String>,
    pub storage_path: Option<PathBuf>,
    pub feedback: FeedbackConfig,
    pub push: PushConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_ms: None,
            user_agent: format!("travel-portal/{}", env!("CARGO_PKG_VERSION")),
            locale: None,
            storage_path: None,
            feedback: FeedbackConfig::default(),
            push: PushConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub default_ttl_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5000,
        }
    }
}

// Third-party push delivery service
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct PushConfig {
    pub endpoint: String,
    pub app_id: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "********"))
            .finish()
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config/portal").required(false))
            .add_source(config::Environment::with_prefix("PORTAL").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    // Joins the API base with a request path, tolerating stray slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
