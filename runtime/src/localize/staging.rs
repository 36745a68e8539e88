use crate::fsutil::{modified, normalize_relative};
use crate::{Result, ShepherdError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::warn;

/// Modification times of the files a strategy staged, keyed by their
/// normalized path relative to the working directory.
#[derive(Debug, Default)]
pub(crate) struct StagingRecords {
    workdir: PathBuf,
    recorded: HashMap<String, SystemTime>,
}

impl StagingRecords {
    pub(crate) fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            recorded: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, relative_path: &str) -> Result<()> {
        let path = self.workdir.join(relative_path);
        let mtime = modified(&path).map_err(|e| {
            ShepherdError::io(format!("failed to stat staged file {}", path.display()), e)
        })?;
        self.recorded.insert(normalize_relative(relative_path), mtime);
        Ok(())
    }

    pub(crate) fn was_localized(&self, relative_path: &str) -> bool {
        let key = normalize_relative(relative_path);
        let Some(recorded) = self.recorded.get(&key) else {
            return false;
        };
        let path = self.workdir.join(&key);
        match modified(&path) {
            Ok(current) => current == *recorded,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not stat staged file");
                false
            }
        }
    }
}
