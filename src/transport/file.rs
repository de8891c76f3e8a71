//! Local-filesystem transport.
//!
//! Serves `file://` URLs with synthesized HTTP-like status codes: 200 on
//! success, 404 when the file is missing, 500 on any other I/O fault.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::{Response, Transport};
use crate::error::ButlerError;

pub struct FileTransport;

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, url: &str) -> Result<Response, ButlerError> {
        let parsed = Url::parse(url).map_err(|e| ButlerError::UrlParse {
            url: url.to_string(),
            source: e,
        })?;
        let path = parsed
            .to_file_path()
            .map_err(|()| ButlerError::Transport {
                url: url.to_string(),
                status: 500,
                detail: "not a valid file path".to_string(),
            })?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Response::buffered(200, Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ButlerError::Transport {
                url: url.to_string(),
                status: 404,
                detail: format!("{}: {e}", path.display()),
            }),
            Err(e) => Err(ButlerError::Transport {
                url: url.to_string(),
                status: 500,
                detail: format!("{}: {e}", path.display()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_file_returns_200() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yml");
        std::fs::write(&path, b"key: value\n").unwrap();

        let url = format!("file://{}", path.display());
        let response = FileTransport.get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(&response.bytes().await.unwrap()[..], b"key: value\n");
    }

    #[tokio::test]
    async fn missing_file_maps_to_404() {
        let err = FileTransport
            .get("file:///definitely/not/here.yml")
            .await
            .unwrap_err();
        assert!(matches!(err, ButlerError::Transport { status: 404, .. }));
    }
}
