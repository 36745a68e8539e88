use crate::{ObjectSink, RemoteError, RemoteRef, RemoteStore};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Store backed by a local directory: `scheme://bucket/key` lives at
/// `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, reference: &RemoteRef) -> Result<PathBuf, RemoteError> {
        let rejected = |message: &str| RemoteError::Request {
            reference: reference.to_string(),
            message: message.to_string(),
        };

        if reference.key().is_empty() {
            return Err(rejected("reference has no object key"));
        }

        let mut path = self.root.join(reference.bucket());
        for component in Path::new(reference.key()).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(rejected("object key escapes the bucket directory"))
                }
            }
        }
        Ok(path)
    }
}

impl RemoteStore for FsStore {
    fn open_read(&self, reference: &RemoteRef) -> Result<Box<dyn Read + Send>, RemoteError> {
        let path = self.object_path(reference)?;
        debug!(path = %path.display(), "opening local object");
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(RemoteError::NotFound {
                reference: reference.to_string(),
            }),
            Err(err) => Err(RemoteError::io(reference, err)),
        }
    }

    fn open_write(&self, reference: &RemoteRef) -> Result<Box<dyn ObjectSink>, RemoteError> {
        let path = self.object_path(reference)?;
        let parent = path
            .parent()
            .ok_or_else(|| RemoteError::Request {
                reference: reference.to_string(),
                message: "object path has no parent directory".to_string(),
            })?
            .to_path_buf();
        fs::create_dir_all(&parent).map_err(|err| RemoteError::io(reference, err))?;
        let spool = NamedTempFile::new_in(&parent).map_err(|err| RemoteError::io(reference, err))?;
        Ok(Box::new(FsSink {
            reference: reference.clone(),
            target: path,
            spool,
        }))
    }
}

struct FsSink {
    reference: RemoteRef,
    target: PathBuf,
    spool: NamedTempFile,
}

impl Write for FsSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spool.flush()
    }
}

impl ObjectSink for FsSink {
    fn finish(self: Box<Self>) -> Result<(), RemoteError> {
        let FsSink {
            reference,
            target,
            mut spool,
        } = *self;
        spool
            .flush()
            .map_err(|err| RemoteError::io(&reference, err))?;
        spool
            .persist(&target)
            .map_err(|err| RemoteError::io(&reference, err.error))?;
        Ok(())
    }
}
