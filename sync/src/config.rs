//! Configuration management for the sync client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default Dropbox RPC endpoint.
pub const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2";

/// Default Dropbox content endpoint.
pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Default remote blob path.
pub const DEFAULT_REMOTE_PATH: &str = "/tareas.json";

/// Sync client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the file-backed local store
    pub data_dir: PathBuf,
    /// Path of the snapshot blob in the remote store
    pub remote_path: String,
    /// Base URL for metadata calls
    pub api_url: String,
    /// Base URL for download/upload calls
    pub content_url: String,
    /// Interval between background pulls
    pub poll_interval: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Bearer token handed over by the OAuth flow
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tasklane-data"),
            remote_path: DEFAULT_REMOTE_PATH.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            content_url: DEFAULT_CONTENT_URL.to_string(),
            poll_interval: Duration::from_secs(30),
            http_timeout: Duration::from_secs(30),
            access_token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup("TASKLANE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let remote_path = lookup("TASKLANE_REMOTE_PATH").unwrap_or(defaults.remote_path);
        if !remote_path.starts_with('/') {
            return Err(ConfigError::InvalidRemotePath(remote_path));
        }

        let api_url = lookup("TASKLANE_API_URL").unwrap_or(defaults.api_url);
        let content_url = lookup("TASKLANE_CONTENT_URL").unwrap_or(defaults.content_url);

        let poll_interval = seconds(&lookup, "TASKLANE_POLL_INTERVAL_SECS")?
            .unwrap_or(defaults.poll_interval);
        let http_timeout = seconds(&lookup, "TASKLANE_HTTP_TIMEOUT_SECS")?
            .unwrap_or(defaults.http_timeout);

        let access_token = lookup("TASKLANE_ACCESS_TOKEN").filter(|t| !t.trim().is_empty());

        Ok(Self {
            data_dir,
            remote_path,
            api_url: api_url.trim_end_matches('/').to_string(),
            content_url: content_url.trim_end_matches('/').to_string(),
            poll_interval,
            http_timeout,
            access_token,
        })
    }
}

fn seconds<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidSeconds(key)),
            Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        },
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {0} value, expected a positive number of seconds")]
    InvalidSeconds(&'static str),

    #[error("TASKLANE_REMOTE_PATH must be absolute: {0}")]
    InvalidRemotePath(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.remote_path, "/tareas.json");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TASKLANE_DATA_DIR", "/tmp/tl"),
            ("TASKLANE_API_URL", "http://127.0.0.1:9000/2/"),
            ("TASKLANE_POLL_INTERVAL_SECS", "5"),
            ("TASKLANE_ACCESS_TOKEN", "tok"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tl"));
        assert_eq!(config.api_url, "http://127.0.0.1:9000/2");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("TASKLANE_HTTP_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidSeconds("TASKLANE_HTTP_TIMEOUT_SECS"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TASKLANE_POLL_INTERVAL_SECS", "0")])),
            Err(ConfigError::InvalidSeconds(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TASKLANE_REMOTE_PATH", "tareas.json")])),
            Err(ConfigError::InvalidRemotePath(_))
        ));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let config = Config::from_lookup(lookup(&[("TASKLANE_ACCESS_TOKEN", "  ")])).unwrap();
        assert!(config.access_token.is_none());
    }
}
