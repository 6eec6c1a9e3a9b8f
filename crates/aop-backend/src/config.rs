//! Backend connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::BackendError;

pub const ENV_URL: &str = "AOP_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "AOP_BACKEND_ANON_KEY";
pub const ENV_STORAGE_PATH: &str = "AOP_STORAGE_PATH";

/// Configuration for talking to the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project base URL (e.g., `https://xyz.example.co`).
    pub url: String,
    /// Public anonymous API key sent as `apikey` on every request.
    pub anon_key: String,
    /// Prefix of every locally stored key (`<prefix>.auth.token`).
    pub storage_key_prefix: String,
    /// JSON file holding persisted credentials. `None` keeps them in memory.
    pub storage_path: Option<PathBuf>,
    /// Per-request timeout for the HTTP client.
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321".into(),
            anon_key: String::new(),
            storage_key_prefix: "aop".into(),
            storage_path: default_storage_path(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// Read the configuration from the environment.
    ///
    /// `AOP_BACKEND_URL` and `AOP_BACKEND_ANON_KEY` are required;
    /// `AOP_STORAGE_PATH` overrides the default credential file.
    pub fn from_env() -> Result<Self, BackendError> {
        let url = non_empty_env(ENV_URL);
        let anon_key = non_empty_env(ENV_ANON_KEY);
        let (Some(url), Some(anon_key)) = (url, anon_key) else {
            return Err(BackendError::Config(format!(
                "missing backend credentials: set {ENV_URL} and {ENV_ANON_KEY}"
            )));
        };

        let mut config = Self {
            url,
            anon_key,
            ..Default::default()
        };
        if let Some(path) = non_empty_env(ENV_STORAGE_PATH) {
            config.storage_path = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_storage_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("aop").join("auth.json"))
}
