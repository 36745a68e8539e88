//! Remote blob stores addressed by `scheme://bucket/key` references.
//!
//! Every store exposes the same two operations: open an object for reading and
//! open a sink that replaces an object once [`ObjectSink::finish`] is called.

use std::io::{Read, Write};
use thiserror::Error;

pub mod fs;
pub mod gcs;
pub mod memory;
pub mod registry;

pub use fs::FsStore;
pub use gcs::GcsStore;
pub use job_spec::RemoteRef;
pub use memory::MemoryStore;
pub use registry::StoreRegistry;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote object {reference} not found")]
    NotFound { reference: String },

    #[error("request for {reference} failed: {message}")]
    Request { reference: String, message: String },

    #[error("I/O error on {reference}: {source}")]
    Io {
        reference: String,
        source: std::io::Error,
    },

    #[error("no remote store registered for scheme '{scheme}' (reference {reference})")]
    UnsupportedScheme { scheme: String, reference: String },

    #[error("remote store client error: {message}")]
    Client { message: String },
}

impl RemoteError {
    pub(crate) fn io(reference: &RemoteRef, source: std::io::Error) -> Self {
        RemoteError::Io {
            reference: reference.to_string(),
            source,
        }
    }
}

/// Destination of an object write. Nothing is visible remotely until `finish`
/// succeeds; dropping an unfinished sink discards what was written.
pub trait ObjectSink: Write + Send {
    fn finish(self: Box<Self>) -> Result<(), RemoteError>;
}

pub trait RemoteStore: Send + Sync {
    fn open_read(&self, reference: &RemoteRef) -> Result<Box<dyn Read + Send>, RemoteError>;

    fn open_write(&self, reference: &RemoteRef) -> Result<Box<dyn ObjectSink>, RemoteError>;
}
