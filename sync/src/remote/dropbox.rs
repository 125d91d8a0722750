use super::{RemoteMetadata, RemoteStore};
use crate::auth::bearer;
use crate::config::Config;
use crate::error::RemoteError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tasklane_engine::parse_timestamp;

const API_ARG: &str = "Dropbox-API-Arg";

/// Dropbox v2 HTTP API client.
#[derive(Debug, Clone)]
pub struct DropboxStore {
    client: reqwest::Client,
    api_url: String,
    content_url: String,
}

/// Subset of Dropbox `FileMetadata`.
#[derive(Debug, Deserialize)]
struct FileMetadata {
    path_display: Option<String>,
    server_modified: String,
    size: Option<u64>,
    rev: Option<String>,
}

impl FileMetadata {
    fn into_metadata(self, path: &str) -> Result<RemoteMetadata, RemoteError> {
        let modified_at = parse_timestamp(&self.server_modified).ok_or_else(|| {
            RemoteError::Decode(format!("bad server_modified: {}", self.server_modified))
        })?;
        Ok(RemoteMetadata {
            path: self.path_display.unwrap_or_else(|| path.to_string()),
            modified_at,
            size: self.size,
            rev: self.rev,
        })
    }
}

impl DropboxStore {
    pub fn new(
        api_url: impl Into<String>,
        content_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            content_url: content_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        Self::new(&config.api_url, &config.content_url, config.http_timeout)
    }
}

#[async_trait]
impl RemoteStore for DropboxStore {
    async fn get_metadata(&self, token: &str, path: &str) -> Result<RemoteMetadata, RemoteError> {
        tracing::debug!(path, "Fetching remote metadata");
        let response = self
            .client
            .post(format!("{}/files/get_metadata", self.api_url))
            .header(AUTHORIZATION, bearer(token))
            .json(&json!({ "path": path }))
            .send()
            .await?;

        let meta: FileMetadata = check(response, path).await?.json().await?;
        meta.into_metadata(path)
    }

    async fn download(&self, token: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!(path, "Downloading remote snapshot");
        let response = self
            .client
            .post(format!("{}/files/download", self.content_url))
            .header(AUTHORIZATION, bearer(token))
            .header(API_ARG, api_arg(&json!({ "path": path })))
            .send()
            .await?;

        let bytes = check(response, path).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        token: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<RemoteMetadata, RemoteError> {
        tracing::debug!(path, bytes = body.len(), "Uploading snapshot");
        let arg = json!({ "path": path, "mode": "overwrite", "mute": true });
        let response = self
            .client
            .post(format!("{}/files/upload", self.content_url))
            .header(AUTHORIZATION, bearer(token))
            .header(API_ARG, api_arg(&arg))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let meta: FileMetadata = check(response, path).await?.json().await?;
        meta.into_metadata(path)
    }
}

/// Map non-success statuses onto [`RemoteError`].
async fn check(response: reqwest::Response, path: &str) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 => RemoteError::Unauthorized,
        404 => RemoteError::NotFound(path.to_string()),
        // Dropbox reports a missing path as an endpoint error
        409 if body.contains("not_found") => RemoteError::NotFound(path.to_string()),
        409 => RemoteError::Conflict(path.to_string()),
        code => RemoteError::Status { status: code, body },
    })
}

/// JSON for the `Dropbox-API-Arg` header. Header values must be ASCII, so
/// everything else is escaped as `\uXXXX`.
fn api_arg(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_arg_escapes_non_ascii() {
        let arg = api_arg(&json!({ "path": "/tareas-ñ.json" }));
        assert_eq!(arg, r#"{"path":"/tareas-\u00f1.json"}"#);
        assert!(arg.is_ascii());

        let emoji = api_arg(&json!({ "path": "/🎉" }));
        assert_eq!(emoji, r#"{"path":"/\ud83c\udf89"}"#);
        let back: serde_json::Value = serde_json::from_str(&emoji).unwrap();
        assert_eq!(back["path"], "/🎉");
    }

    #[test]
    fn test_file_metadata_conversion() {
        let meta: FileMetadata = serde_json::from_value(json!({
            ".tag": "file",
            "name": "tareas.json",
            "path_display": "/tareas.json",
            "server_modified": "2024-03-01T09:00:00Z",
            "size": 42,
            "rev": "015f"
        }))
        .unwrap();

        let meta = meta.into_metadata("/tareas.json").unwrap();
        assert_eq!(meta.size, Some(42));
        assert_eq!(meta.rev.as_deref(), Some("015f"));
        assert_eq!(meta.modified_at.to_rfc3339(), "2024-03-01T09:00:00+00:00");
    }

    #[test]
    fn test_bad_server_modified_is_decode_error() {
        let meta = FileMetadata {
            path_display: None,
            server_modified: "yesterday".into(),
            size: None,
            rev: None,
        };
        assert!(matches!(
            meta.into_metadata("/x"),
            Err(RemoteError::Decode(_))
        ));
    }
}
