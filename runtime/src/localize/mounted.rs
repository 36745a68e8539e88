use super::direct::create_exclusive;
use super::staging::StagingRecords;
use super::{upload_files, Localizer};
use crate::fsutil::{absolutize, ensure_dir, ensure_parent_dir};
use crate::layout::JobLayout;
use crate::{Result, ShepherdError};
use job_spec::{validate_download_source, Download, Upload};
use remote_store::RemoteStore;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Directory under the job root holding one mount point per bucket.
pub const MOUNTS_DIR_NAME: &str = "gcsfusemounts";
/// Scratch directory handed to the mount utility.
pub const MOUNT_SCRATCH_DIR_NAME: &str = "gcsfusemountstmp";

/// External programs used to mount and unmount buckets.
///
/// The mount program is invoked as
/// `<mount_program> <mount_args...> --temp-dir <scratch> <bucket> <mount dir>`
/// and the unmount program as `<unmount_program> <mount dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub mount_program: String,
    pub unmount_program: String,
    pub mount_args: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_program: "gcsfuse".to_string(),
            unmount_program: "umount".to_string(),
            mount_args: [
                "-o",
                "ro",
                "--stat-cache-ttl",
                "24h",
                "--type-cache-ttl",
                "24h",
                "--file-mode",
                "755",
                "--implicit-dirs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Mounts each referenced bucket read-only and stages inputs out of the mounts.
pub struct MountedTransfer {
    root: PathBuf,
    workdir: PathBuf,
    store: Arc<dyn RemoteStore>,
    config: MountConfig,
    mounts: Vec<PathBuf>,
    staged: StagingRecords,
}

impl MountedTransfer {
    /// Fails when the mount or scratch directories would sit inside the
    /// working directory, where the output selector would walk live mounts.
    pub fn new(
        layout: &JobLayout,
        store: Arc<dyn RemoteStore>,
        config: MountConfig,
    ) -> Result<Self> {
        let workdir = absolutize(layout.workdir())?;
        for name in [MOUNTS_DIR_NAME, MOUNT_SCRATCH_DIR_NAME] {
            let dir = absolutize(&layout.root().join(name))?;
            if dir.starts_with(&workdir) {
                return Err(ShepherdError::Unsupported {
                    message: format!(
                        "mounted transfer needs {} outside the working directory {}",
                        dir.display(),
                        workdir.display()
                    ),
                });
            }
        }
        Ok(Self {
            root: layout.root().to_path_buf(),
            workdir: layout.workdir().to_path_buf(),
            store,
            config,
            mounts: Vec::new(),
            staged: StagingRecords::new(layout.workdir()),
        })
    }

    fn mount_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(MOUNTS_DIR_NAME).join(bucket)
    }

    fn mount(&mut self, bucket: &str) -> Result<()> {
        let scratch = self.root.join(MOUNT_SCRATCH_DIR_NAME);
        let mount_dir = self.mount_dir(bucket);
        ensure_dir(&scratch)?;
        ensure_dir(&mount_dir)?;

        let program = &self.config.mount_program;
        info!(%bucket, mount_dir = %mount_dir.display(), "mounting bucket");
        let status = Command::new(program)
            .args(&self.config.mount_args)
            .arg("--temp-dir")
            .arg(&scratch)
            .arg(bucket)
            .arg(&mount_dir)
            .status()
            .map_err(|e| ShepherdError::Mount {
                message: format!("failed to run {program} for bucket {bucket}: {e}"),
            })?;
        if !status.success() {
            return Err(ShepherdError::Mount {
                message: format!("{program} failed for bucket {bucket} ({status})"),
            });
        }
        self.mounts.push(mount_dir);
        Ok(())
    }

    fn stage(&mut self, download: &Download) -> Result<()> {
        let source = validate_download_source(&download.source_url)?;
        let mounted = self.mount_dir(source.bucket()).join(source.key());
        let destination = self.workdir.join(&download.destination_path);
        ensure_parent_dir(&destination)?;

        if download.symlink_safe {
            link(&mounted, &destination)?;
            debug!(source = %source, destination = %download.destination_path, "linked input");
        } else {
            let mut reader = File::open(&mounted).map_err(|e| {
                ShepherdError::io(format!("failed to open {}", mounted.display()), e)
            })?;
            let mut file = create_exclusive(&destination, false)?;
            io::copy(&mut reader, &mut file).map_err(|e| {
                ShepherdError::io(
                    format!(
                        "failed to copy {} to {}",
                        mounted.display(),
                        destination.display()
                    ),
                    e,
                )
            })?;
            debug!(source = %source, destination = %download.destination_path, "copied input");
        }
        self.staged.record(&download.destination_path)
    }
}

impl fmt::Debug for MountedTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedTransfer")
            .field("root", &self.root)
            .field("workdir", &self.workdir)
            .field("config", &self.config)
            .field("mounts", &self.mounts)
            .finish_non_exhaustive()
    }
}

impl Localizer for MountedTransfer {
    fn prepare(&mut self, downloads: &[Download]) -> Result<()> {
        if let Some(download) = downloads.iter().find(|d| d.executable) {
            return Err(ShepherdError::Unsupported {
                message: format!(
                    "executable downloads are not supported by mounted transfer ({})",
                    download.source_url
                ),
            });
        }

        let mut buckets = BTreeSet::new();
        for download in downloads {
            let source = validate_download_source(&download.source_url)?;
            buckets.insert(source.bucket().to_string());
        }
        for bucket in &buckets {
            if let Err(err) = self.mount(bucket) {
                if let Err(clean_err) = self.clean() {
                    error!(error = %clean_err, "failed to release mounts after mount failure");
                }
                return Err(err);
            }
        }

        for download in downloads {
            self.stage(download)?;
        }
        Ok(())
    }

    fn upload(&self, uploads: &[Upload]) -> Result<()> {
        upload_files(&self.workdir, self.store.as_ref(), uploads)
    }

    fn was_localized(&self, relative_path: &str) -> bool {
        self.staged.was_localized(relative_path)
    }

    fn clean(&mut self) -> Result<()> {
        let program = &self.config.unmount_program;
        let mut failures = Vec::new();
        for mount_dir in self.mounts.drain(..) {
            info!(mount_dir = %mount_dir.display(), "unmounting bucket");
            let outcome = Command::new(program).arg(&mount_dir).status();
            let failure = match outcome {
                Ok(status) if status.success() => continue,
                Ok(status) => format!("{program} {} exited with {status}", mount_dir.display()),
                Err(e) => format!("failed to run {program} {}: {e}", mount_dir.display()),
            };
            warn!(mount_dir = %mount_dir.display(), error = %failure, "unmount failed");
            failures.push(failure);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShepherdError::Mount {
                message: failures.join("; "),
            })
        }
    }
}

#[cfg(unix)]
fn link(target: &Path, destination: &Path) -> Result<()> {
    let target = absolutize(target)?;
    let destination = absolutize(destination)?;
    let parent = destination.parent().unwrap_or(Path::new("/"));
    let relative = crate::fsutil::relative_path(parent, &target);
    std::os::unix::fs::symlink(&relative, &destination).map_err(|e| {
        ShepherdError::io(
            format!(
                "failed to link {} to {}",
                destination.display(),
                relative.display()
            ),
            e,
        )
    })
}

#[cfg(not(unix))]
fn link(_target: &Path, destination: &Path) -> Result<()> {
    Err(ShepherdError::Unsupported {
        message: format!(
            "symbolic links are not supported on this platform ({})",
            destination.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_store::MemoryStore;

    #[test]
    fn default_invocation_is_read_only() {
        let config = MountConfig::default();
        assert_eq!(config.mount_program, "gcsfuse");
        assert_eq!(config.unmount_program, "umount");
        assert_eq!(&config.mount_args[..2], ["-o", "ro"]);
        assert!(config.mount_args.contains(&"--implicit-dirs".to_string()));
    }

    #[test]
    fn executable_downloads_fail_before_mounting() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::under(dir.path());
        let config = MountConfig {
            mount_program: "/nonexistent/mount-program".to_string(),
            ..MountConfig::default()
        };
        let mut mounted = MountedTransfer::new(&layout, Arc::new(MemoryStore::new()), config).unwrap();

        let mut download = Download::new("gs://bucket/tool", "tool");
        download.executable = true;
        let err = mounted.prepare(&[download]).unwrap_err();
        assert!(matches!(err, ShepherdError::Unsupported { .. }), "{err}");
        assert!(!dir.path().join(MOUNTS_DIR_NAME).exists());
    }

    #[test]
    fn missing_mount_program_is_a_mount_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = JobLayout::under(dir.path());
        let config = MountConfig {
            mount_program: "/nonexistent/mount-program".to_string(),
            ..MountConfig::default()
        };
        let mut mounted = MountedTransfer::new(&layout, Arc::new(MemoryStore::new()), config).unwrap();

        let err = mounted
            .prepare(&[Download::new("gs://bucket/a", "a")])
            .unwrap_err();
        assert!(matches!(err, ShepherdError::Mount { .. }), "{err}");
        assert!(err.to_string().contains("bucket"));
        mounted.clean().unwrap();
    }

    #[test]
    fn mounts_inside_the_working_directory_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = MountedTransfer::new(
            &JobLayout::single(dir.path()),
            Arc::new(MemoryStore::new()),
            MountConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ShepherdError::Unsupported { .. }), "{err}");
        assert!(err.to_string().contains(MOUNTS_DIR_NAME));
    }
}
