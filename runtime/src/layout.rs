use std::path::{Path, PathBuf};

/// Name of the working directory created under a fresh job root.
pub const WORK_DIR_NAME: &str = "work";

/// Where a job lives on disk.
///
/// The root is the bind-mount boundary for containerized runs and holds
/// strategy bookkeeping such as bucket mounts; the working directory sits
/// somewhere under it and is where inputs land and outputs are collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    root: PathBuf,
    workdir: PathBuf,
}

impl JobLayout {
    pub fn new(root: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: workdir.into(),
        }
    }

    /// Root and working directory are the same directory.
    pub fn single(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            root: dir.clone(),
            workdir: dir,
        }
    }

    /// Working directory is `<root>/work`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let workdir = root.join(WORK_DIR_NAME);
        Self { root, workdir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}
