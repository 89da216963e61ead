//! The `kv_keys` resource manages individual keys within a Vault KV v2
//! secret. Only the declared keys are created, updated, or deleted; other keys
//! in the same secret are never touched.

pub mod location;
pub mod provider;
pub mod store;
pub mod vault_client;

pub use location::{Location, LocationParseError};
pub use provider::{KvKeysInProperties, KvKeysOutProperties, KvKeysProvider, KV_KEYS};
pub use store::{DocumentStore, MemoryStore, RemoteDocument, StoreError};
pub use vault_client::{VaultClient, VaultConfig};
