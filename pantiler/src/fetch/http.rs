//! Streaming HTTP downloads.
//!
//! Bodies are streamed into a `.part` sibling of the destination. Only once
//! the body has ended and the file has been flushed and synced is it renamed
//! into place, so an interrupted download never leaves a file that looks
//! like a valid cache entry.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::cache::{commit, partial_path};
use crate::error::{PantilerError, Result};

/// Async HTTP downloader.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    pub(crate) timeout: Option<Duration>,
}

impl HttpDownloader {
    /// Create a downloader without a request timeout.
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Create a downloader that gives up on requests after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!("pantiler/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PantilerError::HttpClient(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let partial = partial_path(dest);
        match self.stream_to(url, &partial).await {
            Ok(bytes) => {
                commit(&partial, dest).await?;
                debug!(url, path = %dest.display(), bytes, "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!(path = %partial.display(), error = %cleanup, "No partial file to remove");
                }
                Err(e)
            }
        }
    }

    /// Fetch `url` fully into memory.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| self.failure(url, &e))?;
        Ok(body.to_vec())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.failure(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PantilerError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }
        Ok(response)
    }

    async fn stream_to(&self, url: &str, partial: &Path) -> Result<u64> {
        let response = self.get(url).await?;

        let write_failed = |e| PantilerError::WriteFailed {
            path: partial.to_path_buf(),
            source: e,
        };
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(write_failed)?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.failure(url, &e))?;
            file.write_all(&chunk).await.map_err(write_failed)?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        Ok(downloaded)
    }

    fn failure(&self, url: &str, e: &reqwest::Error) -> PantilerError {
        if e.is_timeout() {
            warn!(url, timeout = ?self.timeout, "Request timed out");
        }
        PantilerError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve one canned response on a loopback port, returning the URL.
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/data.zip", addr)
    }

    #[test]
    fn test_http_downloader_default_has_no_timeout() {
        let downloader = HttpDownloader::new().unwrap();
        assert_eq!(downloader.timeout, None);
    }

    #[test]
    fn test_http_downloader_with_timeout() {
        let downloader = HttpDownloader::with_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(downloader.timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("data.zip");
        let downloader = HttpDownloader::with_timeout(Duration::from_secs(5)).unwrap();

        // Nothing listens on port 9 of the loopback interface
        let result = downloader.download("http://127.0.0.1:9/data.zip", &dest).await;

        assert!(matches!(result, Err(PantilerError::DownloadFailed { .. })));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_commits_streamed_body() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("data.zip");
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
        )
        .await;
        let downloader = HttpDownloader::with_timeout(Duration::from_secs(5)).unwrap();

        let bytes = downloader.download(&url, &dest).await.unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("data.zip");
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nonly ten b",
        )
        .await;
        let downloader = HttpDownloader::with_timeout(Duration::from_secs(5)).unwrap();

        let result = downloader.download(&url, &dest).await;

        assert!(matches!(result, Err(PantilerError::DownloadFailed { .. })));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_error_status_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("data.zip");
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let downloader = HttpDownloader::with_timeout(Duration::from_secs(5)).unwrap();

        let err = downloader.download(&url, &dest).await.unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
