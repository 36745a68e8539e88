use crate::{ObjectSink, RemoteError, RemoteRef, RemoteStore};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Routes each reference to the store registered for its scheme.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<dyn RemoteStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: &str, store: Arc<dyn RemoteStore>) {
        self.stores.insert(scheme.to_ascii_lowercase(), store);
    }

    pub fn with_store(mut self, scheme: &str, store: Arc<dyn RemoteStore>) -> Self {
        self.register(scheme, store);
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    fn resolve(&self, reference: &RemoteRef) -> Result<&Arc<dyn RemoteStore>, RemoteError> {
        self.stores
            .get(reference.scheme())
            .ok_or_else(|| RemoteError::UnsupportedScheme {
                scheme: reference.scheme().to_string(),
                reference: reference.to_string(),
            })
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("schemes", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RemoteStore for StoreRegistry {
    fn open_read(&self, reference: &RemoteRef) -> Result<Box<dyn Read + Send>, RemoteError> {
        self.resolve(reference)?.open_read(reference)
    }

    fn open_write(&self, reference: &RemoteRef) -> Result<Box<dyn ObjectSink>, RemoteError> {
        self.resolve(reference)?.open_write(reference)
    }
}
