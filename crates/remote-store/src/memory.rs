use crate::{ObjectSink, RemoteError, RemoteRef, RemoteStore};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process store keyed by the full reference string. Clones share objects.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn insert(&self, reference: &str, bytes: impl Into<Vec<u8>>) {
        self.objects().insert(reference.to_string(), bytes.into());
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects().get(reference).cloned()
    }

    /// Snapshot of every stored object as UTF-8 (lossy), keyed by reference.
    pub fn contents(&self) -> BTreeMap<String, String> {
        self.objects()
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
            .collect()
    }
}

impl RemoteStore for MemoryStore {
    fn open_read(&self, reference: &RemoteRef) -> Result<Box<dyn Read + Send>, RemoteError> {
        let bytes = self
            .get(&reference.to_string())
            .ok_or_else(|| RemoteError::NotFound {
                reference: reference.to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, reference: &RemoteRef) -> Result<Box<dyn ObjectSink>, RemoteError> {
        Ok(Box::new(MemorySink {
            store: self.clone(),
            reference: reference.to_string(),
            buffer: Vec::new(),
        }))
    }
}

struct MemorySink {
    store: MemoryStore,
    reference: String,
    buffer: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for MemorySink {
    fn finish(self: Box<Self>) -> Result<(), RemoteError> {
        let MemorySink {
            store,
            reference,
            buffer,
        } = *self;
        store.insert(&reference, buffer);
        Ok(())
    }
}
