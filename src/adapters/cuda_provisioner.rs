use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::domain::{AccelInfo, AccelManifest, DomainError, InstallProgress};
use crate::ports::{AccelProvisioner, HttpClient, InstallProgressFn};

/// Embedded bundle manifest.
const MANIFEST_JSON: &str = include_str!("../../resources/accel_manifest.json");

static MANIFEST: Lazy<AccelManifest> =
    Lazy::new(|| serde_json::from_str(MANIFEST_JSON).expect("embedded accel manifest is valid JSON"));

/// Written only after a structural verification pass succeeds. The marker
/// is the sole source of truth for "installed", but it is never trusted
/// without re-checking the critical binaries.
const MARKER_FILE: &str = ".installed";
const VENDOR_DIR: &str = "nvidia";
const SCRATCH_DIR: &str = "scratch";

fn report(progress: &Option<InstallProgressFn>, percent: u8, message: impl Into<String>) {
    if let Some(callback) = progress {
        callback(InstallProgress::new(percent, message));
    }
}

/// Best-effort NVIDIA accelerator probe. Any failure means "no GPU".
fn probe_accelerator() -> bool {
    if std::env::var_os("CUDA_PATH").is_some() || std::env::var_os("CUDA_HOME").is_some() {
        return true;
    }

    if Path::new("/usr/local/cuda").exists() || Path::new("/proc/driver/nvidia").exists() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if Path::new("C:\\Windows\\System32\\nvcuda.dll").exists() {
            return true;
        }
    }

    match Command::new("nvidia-smi").arg("--list-gpus").output() {
        Ok(output) => output.status.success() && !output.stdout.is_empty(),
        Err(e) => {
            debug!(error = %e, "nvidia-smi probe failed");
            false
        }
    }
}

/// Downloads, verifies, and removes the CUDA runtime library bundle the
/// engine needs for GPU execution.
pub struct CudaProvisioner {
    bundle_dir: PathBuf,
    http: Arc<dyn HttpClient>,
    probe: OnceLock<bool>,
}

impl CudaProvisioner {
    pub fn new(bundle_dir: PathBuf, http: Arc<dyn HttpClient>) -> Self {
        Self {
            bundle_dir,
            http,
            probe: OnceLock::new(),
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.bundle_dir.join(MARKER_FILE)
    }

    fn vendor_dir(&self) -> PathBuf {
        self.bundle_dir.join(VENDOR_DIR)
    }

    fn scratch_dir(&self) -> PathBuf {
        self.bundle_dir.join(SCRATCH_DIR)
    }

    /// Structural check: every critical sub-library has at least one
    /// binary matching its file-name prefix.
    fn binaries_present(&self) -> bool {
        for package in MANIFEST.packages.iter().filter(|p| p.critical) {
            let bin_dir = self.vendor_dir().join(&package.name).join("bin");
            if !dir_has_prefixed_file(&bin_dir, &package.probe) {
                warn!(package = %package.name, "Missing critical library binaries");
                return false;
            }
        }
        true
    }

    async fn run_install(
        &self,
        scratch: &Path,
        progress: &Option<InstallProgressFn>,
    ) -> Result<(), DomainError> {
        let packages = &MANIFEST.packages;
        let total = packages.len();

        for (idx, package) in packages.iter().enumerate() {
            let percent = (10 + idx * 80 / total) as u8;
            report(progress, percent, format!("Downloading {}...", package.name));
            info!(package = %package.name, files = package.files.len(), "Downloading package");

            let bin_dir = scratch.join(VENDOR_DIR).join(&package.name).join("bin");
            for file in &package.files {
                let target = bin_dir.join(&file.file);
                self.http
                    .download_file(&file.url, &target, None)
                    .await
                    .map_err(|e| {
                        DomainError::Provisioning(format!(
                            "Failed to download {}: {}",
                            file.file, e
                        ))
                    })?;
            }
        }

        report(progress, 90, "Organizing libraries...");
        let staged = scratch.join(VENDOR_DIR);
        if !staged.exists() {
            return Err(DomainError::Provisioning(
                "download produced no library tree".to_string(),
            ));
        }

        // Remove-then-move, never merge into a previous partial install.
        let target = self.vendor_dir();
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staged, &target)?;
        info!(target = ?target, "Libraries moved into bundle directory");

        report(progress, 95, "Verifying installation...");
        if !self.binaries_present() {
            return Err(DomainError::Provisioning(
                "verification failed: critical libraries missing after install".to_string(),
            ));
        }

        // Marker only exists once the bundle verified complete.
        fs::write(self.marker_path(), b"")?;

        report(progress, 100, "Installation complete");
        info!("GPU runtime libraries installed and verified");
        Ok(())
    }
}

fn dir_has_prefixed_file(dir: &Path, prefix: &str) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.path().is_file() && entry.file_name().to_string_lossy().starts_with(prefix)
    })
}

#[async_trait]
impl AccelProvisioner for CudaProvisioner {
    fn detect_accelerator(&self) -> bool {
        *self.probe.get_or_init(|| {
            let present = probe_accelerator();
            info!(present, "Accelerator probe");
            present
        })
    }

    fn is_bundle_installed(&self) -> bool {
        if !self.marker_path().exists() {
            return false;
        }
        // A marker without the binaries means a corrupted or partial
        // install; report not-installed so a retry heals it.
        self.binaries_present()
    }

    async fn install(&self, progress: Option<InstallProgressFn>) -> Result<(), DomainError> {
        info!(bundle_dir = ?self.bundle_dir, "Installing GPU runtime libraries");
        report(&progress, 5, "Preparing installation...");

        let scratch = self.scratch_dir();
        fs::create_dir_all(&scratch)?;

        let result = self.run_install(&scratch, &progress).await;

        // Scratch is removed on success and failure alike so a failed
        // attempt retries cleanly.
        if scratch.exists() {
            if let Err(e) = fs::remove_dir_all(&scratch) {
                warn!(error = %e, "Failed to remove scratch directory");
            }
        }

        if let Err(ref e) = result {
            warn!(error = %e, "GPU library installation failed");
        }
        result
    }

    fn uninstall(&self) -> bool {
        if !self.bundle_dir.exists() {
            return false;
        }
        match fs::remove_dir_all(&self.bundle_dir) {
            Ok(()) => {
                info!("GPU runtime libraries removed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove GPU library bundle");
                false
            }
        }
    }

    fn estimated_download_bytes(&self) -> u64 {
        MANIFEST.estimated_download_bytes
    }

    fn bundle_dir(&self) -> PathBuf {
        self.bundle_dir.clone()
    }

    fn info(&self) -> AccelInfo {
        AccelInfo {
            gpu_available: self.detect_accelerator(),
            bundle_installed: self.is_bundle_installed(),
            bundle_dir: self.bundle_dir.to_string_lossy().to_string(),
            estimated_download_mb: MANIFEST.estimated_download_bytes / (1024 * 1024),
        }
    }
}
