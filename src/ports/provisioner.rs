use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{AccelInfo, DomainError, InstallProgress};

/// Callback invoked at each installation phase boundary.
pub type InstallProgressFn = Box<dyn Fn(InstallProgress) + Send + Sync>;

/// Port for provisioning the optional native acceleration runtime.
#[async_trait]
pub trait AccelProvisioner: Send + Sync {
    /// Best-effort hardware probe. Never fails; any probe error means
    /// "no accelerator". Side-effect free and cached after the first call.
    fn detect_accelerator(&self) -> bool;

    /// True only if the marker file exists AND every critical sub-library
    /// binary is present on disk. A marker without the binaries is treated
    /// as not installed, so partial installs self-heal on retry.
    fn is_bundle_installed(&self) -> bool;

    /// Download and install the runtime library bundle.
    ///
    /// Downloads into a scratch directory, relocates atomically, verifies,
    /// and only then writes the marker file. Aborts on the first download
    /// failure; the scratch directory is removed on every exit path, so a
    /// failed attempt retries cleanly.
    async fn install(&self, progress: Option<InstallProgressFn>) -> Result<(), DomainError>;

    /// Delete the entire bundle tree. Returns false when nothing existed.
    fn uninstall(&self) -> bool;

    /// Static download size estimate in bytes, informational only.
    fn estimated_download_bytes(&self) -> u64;

    /// Directory the bundle is installed into.
    fn bundle_dir(&self) -> PathBuf;

    /// Aggregate status for the `gpu/info` endpoint.
    fn info(&self) -> AccelInfo;
}
