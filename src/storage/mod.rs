mod sqlite_store;

pub use sqlite_store::SqliteStore;

use std::sync::{Arc, Mutex};

use crate::error::{GazetteError, Result};

/// Cloneable shared handle over the store, for the comment board and the
/// HTTP server. One-shot CLI commands open the store directly instead.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<SqliteStore>>,
}

impl StoreHandle {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run a closure against the locked store.
    pub fn with<T>(&self, f: impl FnOnce(&SqliteStore) -> Result<T>) -> Result<T> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| GazetteError::Storage("store lock poisoned".to_string()))?;
        f(&guard)
    }
}
