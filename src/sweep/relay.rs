//! Upload relay: hand one local artifact to the remote store.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use thiserror::Error;

use crate::fetch::{FetchError, Fetcher};

pub const DEFAULT_UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid header for {name}: {message}")]
    Header { name: String, message: String },

    #[error("Upload of {name} failed: {source}")]
    Upload { name: String, source: FetchError },
}

#[async_trait]
pub trait Relay: Send + Sync {
    /// Deliver the file at `path` under `name`. `Ok` means the remote side
    /// acknowledged it and the local copy may be deleted.
    async fn relay(&self, path: &Path, name: &str) -> Result<(), RelayError>;
}

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'a str,
}

/// Dropbox-style content upload: raw bytes in the body, target path in the
/// `Dropbox-API-Arg` header, existing remote files overwritten.
#[derive(Clone)]
pub struct DropboxRelay {
    fetcher: Fetcher,
    upload_url: String,
    destination: String,
    token: String,
}

impl fmt::Debug for DropboxRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropboxRelay")
            .field("upload_url", &self.upload_url)
            .field("destination", &self.destination)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DropboxRelay {
    pub fn new(
        fetcher: Fetcher,
        upload_url: impl Into<String>,
        destination: &str,
        token: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            upload_url: upload_url.into(),
            destination: destination.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Remote path for `name`: `{destination}/{name}`.
    pub fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.destination, name)
    }

    fn headers(&self, name: &str) -> Result<HeaderMap, RelayError> {
        let header_err = |e: &dyn fmt::Display| RelayError::Header {
            name: name.to_string(),
            message: e.to_string(),
        };
        let remote = self.remote_path(name);
        let arg = serde_json::to_string(&UploadArg {
            path: &remote,
            mode: "overwrite",
        })
        .map_err(|e| header_err(&e))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| header_err(&e))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        // HTTP header values must be visible ASCII; escape the rest the way
        // the upload API expects (\uXXXX inside the JSON string).
        headers.insert(
            "Dropbox-API-Arg",
            HeaderValue::from_str(&ascii_json(&arg)).map_err(|e| header_err(&e))?,
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        Ok(headers)
    }
}

/// Replace every non-ASCII char in already-encoded JSON with `\uXXXX`
/// escapes (surrogate pairs above the BMP).
fn ascii_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
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

#[async_trait]
impl Relay for DropboxRelay {
    async fn relay(&self, path: &Path, name: &str) -> Result<(), RelayError> {
        let body = tokio::fs::read(path).await.map_err(|source| RelayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let headers = self.headers(name)?;
        self.fetcher
            .post_bytes(&self.upload_url, &headers, &body)
            .await
            .map_err(|source| RelayError::Upload {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(bytes = body.len(), "Uploaded {}", self.remote_path(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay(url: &str, attempts: u32) -> DropboxRelay {
        let fetcher = Fetcher::new(
            RetryConfig {
                attempts,
                base_delay: Duration::ZERO,
            },
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .unwrap();
        DropboxRelay::new(fetcher, url, "/Magazines/", "s3cret")
    }

    #[test]
    fn test_debug_redacts_token() {
        let r = relay("http://localhost/upload", 1);
        let dbg = format!("{:?}", r);
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_remote_path_joins_destination() {
        let r = relay("http://localhost/upload", 1);
        assert_eq!(r.remote_path("a.pdf"), "/Magazines/a.pdf");
    }

    #[test]
    fn test_ascii_json_escapes_non_ascii() {
        assert_eq!(
            ascii_json("{\"path\":\"/Zo\u{eb}\"}"),
            r#"{"path":"/Zo\u00eb"}"#
        );
        assert_eq!(ascii_json("\u{1F600}"), r"\ud83d\ude00");
        assert_eq!(ascii_json(r#"{"mode":"overwrite"}"#), r#"{"mode":"overwrite"}"#);
    }

    /// Upload `name` with `contents` and return the `Dropbox-API-Arg` header
    /// and body the server saw.
    async fn upload_and_capture(name: &str, contents: &[u8]) -> (String, Vec<u8>) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/upload"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("upload.bin");
        std::fs::write(&file, contents).unwrap();

        relay(&format!("{}/2/files/upload", server.uri()), 1)
            .relay(&file, name)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let arg = requests[0]
            .headers
            .get("dropbox-api-arg")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        (arg, requests[0].body.clone())
    }

    #[tokio::test]
    async fn test_relay_sends_headers_and_body() {
        let (arg, body) = upload_and_capture("a.pdf", b"PDFDATA").await;
        assert_eq!(arg, r#"{"path":"/Magazines/a.pdf","mode":"overwrite"}"#);
        assert_eq!(body, b"PDFDATA");
    }

    #[tokio::test]
    async fn test_relay_escapes_non_ascii_name_in_arg_header() {
        let (arg, _) = upload_and_capture("Zo\u{eb} 1977-01.pdf", b"x").await;
        assert_eq!(
            arg,
            r#"{"path":"/Magazines/Zo\u00eb 1977-01.pdf","mode":"overwrite"}"#
        );
        let decoded: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(decoded["path"], "/Magazines/Zo\u{eb} 1977-01.pdf");
    }

    #[tokio::test]
    async fn test_relay_rejected_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"x").unwrap();

        let err = relay(&server.uri(), 3).relay(&file, "a.pdf").await.unwrap_err();
        assert!(matches!(err, RelayError::Upload { .. }));
    }

    #[tokio::test]
    async fn test_relay_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = relay("http://127.0.0.1:9/upload", 1)
            .relay(&dir.path().join("gone.pdf"), "gone.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Read { .. }));
    }
}
