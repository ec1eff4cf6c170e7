use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use url::Url;

use crate::domain::DomainError;
use crate::ports::{DownloadProgressFn, HttpClient};

/// reqwest-backed download client.
///
/// Streams into a `.download` temp file and renames atomically, so the
/// final path never holds a partial file.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, DomainError> {
        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(format!("Sotto/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Last path segment of a URL, used to name downloaded files.
    pub fn file_name_from_url(url: &str) -> Result<String, DomainError> {
        let parsed = Url::parse(url).map_err(|e| DomainError::Http(e.to_string()))?;
        parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .map(String::from)
            .ok_or_else(|| DomainError::Http(format!("URL has no file name: {}", url)))
    }
}

#[async_trait]
impl HttpClient for HttpDownloader {
    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        progress: Option<DownloadProgressFn>,
    ) -> Result<(), DomainError> {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(3600)) // 1 hour timeout for large downloads
            .send()
            .await
            .map_err(|e| DomainError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::Http(format!("HTTP {} for {}", status, url)));
        }

        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename atomically
        let temp_path = path.with_extension("download");

        let cleanup_temp = || {
            let temp = temp_path.clone();
            async move {
                let _ = tokio::fs::remove_file(&temp).await;
            }
        };

        let mut file = match tokio::fs::File::create(&temp_path).await {
            Ok(f) => f,
            Err(e) => {
                cleanup_temp().await;
                return Err(DomainError::Io(e.to_string()));
            }
        };

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    cleanup_temp().await;
                    return Err(DomainError::Http(e.to_string()));
                }
            };

            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                cleanup_temp().await;
                return Err(DomainError::Io(e.to_string()));
            }

            downloaded += chunk.len() as u64;

            if let Some(callback) = &progress {
                callback(downloaded, total_size);
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            cleanup_temp().await;
            return Err(DomainError::Io(e.to_string()));
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            cleanup_temp().await;
            return Err(DomainError::Io(e.to_string()));
        }

        info!(path = ?path, size = downloaded, "File downloaded successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        let name = HttpDownloader::file_name_from_url(
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
        )
        .unwrap();
        assert_eq!(name, "ggml-small.bin");
    }

    #[test]
    fn test_file_name_from_url_rejects_bare_host() {
        assert!(HttpDownloader::file_name_from_url("https://example.com/").is_err());
        assert!(HttpDownloader::file_name_from_url("not a url").is_err());
    }
}
