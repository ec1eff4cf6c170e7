use serde::{Deserialize, Serialize};

/// Progress report emitted during bundle installation.
#[derive(Debug, Clone, Serialize)]
pub struct InstallProgress {
    /// Overall progress, 0-100.
    pub percent: u8,
    pub message: String,
}

impl InstallProgress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Accelerator and bundle status, as reported by the `gpu/info` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AccelInfo {
    /// Whether an NVIDIA accelerator was found by the hardware probe.
    pub gpu_available: bool,
    /// Whether the runtime library bundle is installed and structurally
    /// complete.
    pub bundle_installed: bool,
    pub bundle_dir: String,
    pub estimated_download_mb: u64,
}

/// Manifest of the runtime library bundle, embedded at build time.
#[derive(Debug, Clone, Deserialize)]
pub struct AccelManifest {
    pub version: u32,
    pub estimated_download_bytes: u64,
    pub packages: Vec<AccelPackage>,
}

/// One of the vendor runtime packages that make up the bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct AccelPackage {
    /// Sub-library name, doubles as the directory under `nvidia/`.
    pub name: String,
    /// Whether the bundle is unusable without this package.
    #[serde(default)]
    pub critical: bool,
    /// File-name prefix used by the structural install check.
    pub probe: String,
    pub files: Vec<PackageFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageFile {
    pub file: String,
    pub url: String,
}
