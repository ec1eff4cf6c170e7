use std::path::Path;

use async_trait::async_trait;

use crate::domain::DomainError;

/// Callback reporting `(bytes_downloaded, total_bytes)`; total is 0 when
/// the server does not announce a content length.
pub type DownloadProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// HTTP client port. All network traffic goes through this interface so
/// the adapters that need downloads stay testable offline.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Download a file to the given path.
    ///
    /// The file only appears at `path` after the download completed in
    /// full; partial downloads never land at the final location.
    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        progress: Option<DownloadProgressFn>,
    ) -> Result<(), DomainError>;
}
