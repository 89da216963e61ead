use std::{collections::BTreeMap, sync::Mutex};

use serde_json::Value;
use vaultpatch_engine::Document;

use crate::location::Location;

/// The entire contents of one secret.
///
/// Values keep their JSON type, so that writing a document back never
/// changes keys we do not manage.
pub type RemoteDocument = Document<Value>;

/// Anything that went wrong talking to the store. The operation must be
/// aborted; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("vault returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("vault returned empty client token")]
    EmptyToken,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A store of whole documents, one per location.
///
/// There is no compare-and-swap: a write made by someone else between our
/// `fetch` and `store` of the same location is lost.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` means that nothing exists at the location.
    async fn fetch(&self, location: &Location) -> Result<Option<RemoteDocument>, StoreError>;

    /// Replace the whole document at the location.
    async fn store(&self, location: &Location, document: &RemoteDocument)
        -> Result<(), StoreError>;
}

/// An in-process store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    documents: BTreeMap<Location, RemoteDocument>,
    fail_fetch: bool,
    fail_store: bool,
    writes: usize,
    /// Applied to the stored document right after the next fetch returns,
    /// simulating another writer.
    interleaved_write: Option<(Location, String, Value)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, location: Location, document: RemoteDocument) {
        self.lock().documents.insert(location, document);
    }

    pub fn get(&self, location: &Location) -> Option<RemoteDocument> {
        self.lock().documents.get(location).cloned()
    }

    /// Number of successful `store` calls.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    pub fn set_fail_store(&self, fail: bool) {
        self.lock().fail_store = fail;
    }

    pub fn interleave_write_after_next_fetch(&self, location: Location, key: &str, value: Value) {
        self.lock().interleaved_write = Some((location, key.to_string(), value));
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, location: &Location) -> Result<Option<RemoteDocument>, StoreError> {
        let mut inner = self.lock();
        if inner.fail_fetch {
            return Err(StoreError::Unavailable(format!("cannot read {}", location)));
        }
        let result = inner.documents.get(location).cloned();
        if let Some((at, key, value)) = inner.interleaved_write.take() {
            inner.documents.entry(at).or_default().insert(key, value);
        }
        Ok(result)
    }

    async fn store(
        &self,
        location: &Location,
        document: &RemoteDocument,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_store {
            return Err(StoreError::Unavailable(format!("cannot write {}", location)));
        }
        inner.documents.insert(location.clone(), document.clone());
        inner.writes += 1;
        Ok(())
    }
}
