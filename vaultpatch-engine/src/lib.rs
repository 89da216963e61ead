//! The patch engine computes the full document to write back to a remote
//! key/value store when only a subset of its keys is managed.
//!
//! The remote store only supports full-document replacement, so every
//! mutation is expressed as "the desired full document". Keys that are not
//! managed are carried over untouched, including the JSON type of their
//! values.
//!
//! Everything in this crate is pure: no I/O, no shared state. The caller
//! (the reconciler) fetches the document right before calling in here, and
//! stores the result right after.
//!
//! ## Vocabulary
//!
//! - *document*: the entire key/value mapping at one remote location.
//! - *managed keys*: the keys this system is responsible for, either as
//!   declared for the current operation (the plan) or as recorded by the
//!   previous operation (the prior state).

pub mod diff;
pub mod lifecycle;
pub mod patch;

use std::collections::BTreeMap;

pub use diff::{key_names, keys_match, merge_keys, to_json_patch, KeyDiff};
pub use lifecycle::{on_create, on_delete, on_import, on_refresh, on_update, RefreshOutcome};
pub use patch::{
    adopt_document, compute_create_patch, compute_delete_patch, compute_update_patch,
    observe_managed, CreatePatch,
};

/// A key/value mapping, sorted by key.
///
/// Used both for whole remote documents and for sets of managed keys.
pub type Document<V> = BTreeMap<String, V>;

/// Managed keys with their declared (or recorded) string values.
pub type ManagedKeys = BTreeMap<String, String>;
