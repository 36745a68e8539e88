use super::staging::StagingRecords;
use super::{upload_files, Localizer};
use crate::fsutil::ensure_parent_dir;
use crate::{Result, ShepherdError};
use job_spec::{Download, RemoteRef, Upload};
use remote_store::RemoteStore;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Downloads each input from the remote store into the working directory.
pub struct DirectTransfer {
    workdir: PathBuf,
    store: Arc<dyn RemoteStore>,
    staged: StagingRecords,
}

impl DirectTransfer {
    pub fn new(workdir: impl Into<PathBuf>, store: Arc<dyn RemoteStore>) -> Self {
        let workdir = workdir.into();
        Self {
            staged: StagingRecords::new(&workdir),
            workdir,
            store,
        }
    }

    fn fetch(&mut self, download: &Download) -> Result<()> {
        let source = RemoteRef::parse(&download.source_url)?;
        let destination = self.workdir.join(&download.destination_path);
        ensure_parent_dir(&destination)?;

        let mut reader = self.store.open_read(&source)?;
        let mut file = create_exclusive(&destination, download.executable)?;
        let bytes = io::copy(&mut reader, &mut file).map_err(|e| {
            ShepherdError::io(
                format!("failed to download {} to {}", source, destination.display()),
                e,
            )
        })?;
        drop(file);

        if download.executable {
            make_executable(&destination)?;
        }
        self.staged.record(&download.destination_path)?;
        debug!(source = %source, destination = %download.destination_path, bytes, "staged input");
        Ok(())
    }
}

impl fmt::Debug for DirectTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectTransfer")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl Localizer for DirectTransfer {
    fn prepare(&mut self, downloads: &[Download]) -> Result<()> {
        info!(count = downloads.len(), "downloading inputs");
        for download in downloads {
            self.fetch(download)?;
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
        Ok(())
    }
}

/// Opens `path` for writing, failing if anything already exists there.
pub(super) fn create_exclusive(path: &Path, executable: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(if executable { 0o777 } else { 0o666 });
    #[cfg(not(unix))]
    let _ = executable;
    options
        .open(path)
        .map_err(|e| ShepherdError::io(format!("failed to create {}", path.display()), e))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path)
        .map_err(|e| ShepherdError::io(format!("failed to stat {}", path.display()), e))?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
        .map_err(|e| ShepherdError::io(format!("failed to chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
