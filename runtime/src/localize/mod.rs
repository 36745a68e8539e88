//! Localization strategies: how remote inputs reach the working directory and
//! how selected outputs leave it.

use crate::layout::JobLayout;
use crate::{Result, ShepherdError};
use job_spec::{Download, Upload};
use remote_store::RemoteStore;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

mod direct;
mod mounted;
mod staging;

pub use direct::DirectTransfer;
pub use mounted::{MountConfig, MountedTransfer};

/// Capability set shared by every localization strategy.
///
/// Paths handed to `upload` and `was_localized` are relative to the job's
/// working directory.
pub trait Localizer {
    fn prepare(&mut self, downloads: &[Download]) -> Result<()>;

    fn upload(&self, uploads: &[Upload]) -> Result<()>;

    /// True when `relative_path` was staged by `prepare` and has not been
    /// modified since.
    fn was_localized(&self, relative_path: &str) -> bool;

    fn clean(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Direct,
    Mounted,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "download",
            StrategyKind::Mounted => "gcsfuse",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ShepherdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "download" | "direct" => Ok(StrategyKind::Direct),
            "gcsfuse" | "mounted" => Ok(StrategyKind::Mounted),
            other => Err(ShepherdError::Unsupported {
                message: format!(
                    "unknown localization strategy '{other}' (expected 'download' or 'gcsfuse')"
                ),
            }),
        }
    }
}

/// The strategy chosen for a job, fixed at configuration time.
#[derive(Debug)]
pub enum Strategy {
    Direct(DirectTransfer),
    Mounted(MountedTransfer),
}

impl Strategy {
    pub fn new(
        kind: StrategyKind,
        layout: &JobLayout,
        store: Arc<dyn RemoteStore>,
        mount: MountConfig,
    ) -> Result<Self> {
        Ok(match kind {
            StrategyKind::Direct => Strategy::Direct(DirectTransfer::new(layout.workdir(), store)),
            StrategyKind::Mounted => {
                Strategy::Mounted(MountedTransfer::new(layout, store, mount)?)
            }
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Direct(_) => StrategyKind::Direct,
            Strategy::Mounted(_) => StrategyKind::Mounted,
        }
    }

    fn as_localizer_mut(&mut self) -> &mut dyn Localizer {
        match self {
            Strategy::Direct(inner) => inner,
            Strategy::Mounted(inner) => inner,
        }
    }

    fn as_localizer(&self) -> &dyn Localizer {
        match self {
            Strategy::Direct(inner) => inner,
            Strategy::Mounted(inner) => inner,
        }
    }
}

impl Localizer for Strategy {
    fn prepare(&mut self, downloads: &[Download]) -> Result<()> {
        self.as_localizer_mut().prepare(downloads)
    }

    fn upload(&self, uploads: &[Upload]) -> Result<()> {
        self.as_localizer().upload(uploads)
    }

    fn was_localized(&self, relative_path: &str) -> bool {
        self.as_localizer().was_localized(relative_path)
    }

    fn clean(&mut self) -> Result<()> {
        self.as_localizer_mut().clean()
    }
}

/// Streams each local file to its destination, replacing any existing object.
pub(crate) fn upload_files(workdir: &Path, store: &dyn RemoteStore, uploads: &[Upload]) -> Result<()> {
    for upload in uploads {
        let local = workdir.join(&upload.source_path);
        let mut file = File::open(&local).map_err(|e| {
            ShepherdError::io(format!("failed to open output {}", local.display()), e)
        })?;
        let mut sink = store.open_write(&upload.destination)?;
        let bytes = io::copy(&mut file, &mut sink).map_err(|e| {
            ShepherdError::io(
                format!(
                    "failed to upload {} to {}",
                    local.display(),
                    upload.destination
                ),
                e,
            )
        })?;
        sink.finish()?;
        debug!(source = %upload.source_path, destination = %upload.destination, bytes, "uploaded output");
    }
    if !uploads.is_empty() {
        info!(count = uploads.len(), "uploads complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!("download".parse::<StrategyKind>().unwrap(), StrategyKind::Direct);
        assert_eq!("GCSFUSE".parse::<StrategyKind>().unwrap(), StrategyKind::Mounted);
        assert_eq!("mounted".parse::<StrategyKind>().unwrap(), StrategyKind::Mounted);
        let err = "rsync".parse::<StrategyKind>().unwrap_err();
        assert!(err.to_string().contains("rsync"));
        assert_eq!(StrategyKind::Mounted.to_string(), "gcsfuse");
    }
}
