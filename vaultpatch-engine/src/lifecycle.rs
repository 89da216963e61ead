//! One entry point per lifecycle transition of a managed key set.
//!
//! `existing` is `None` when the remote location holds no document. An absent
//! document behaves exactly like an empty one.

use crate::{
    patch::{
        adopt_document, compute_create_patch, compute_delete_patch, compute_update_patch,
        observe_managed, CreatePatch,
    },
    Document,
};

/// What a refresh found at the remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<V> {
    /// The tracked keys that still exist, with their remote values.
    Observed(Document<V>),
    /// None of the tracked keys exist anymore. Whether this means the
    /// resource is gone is up to the caller.
    AllManagedKeysVanished,
}

impl<V> RefreshOutcome<V> {
    pub fn into_observed(self) -> Option<Document<V>> {
        match self {
            RefreshOutcome::Observed(keys) => Some(keys),
            RefreshOutcome::AllManagedKeysVanished => None,
        }
    }
}

fn or_empty<V: Clone>(existing: Option<&Document<V>>) -> Document<V> {
    existing.cloned().unwrap_or_default()
}

pub fn on_create<V: Clone + PartialEq>(
    existing: Option<&Document<V>>,
    planned: &Document<V>,
) -> CreatePatch<V> {
    compute_create_patch(&or_empty(existing), planned)
}

pub fn on_update<V: Clone, P>(
    existing: Option<&Document<V>>,
    prior: &Document<P>,
    planned: &Document<V>,
) -> Document<V> {
    compute_update_patch(&or_empty(existing), prior, planned)
}

pub fn on_delete<V: Clone, P>(
    existing: Option<&Document<V>>,
    tracked: &Document<P>,
) -> Document<V> {
    compute_delete_patch(&or_empty(existing), tracked)
}

pub fn on_refresh<V: Clone, P>(
    existing: Option<&Document<V>>,
    tracked: &Document<P>,
) -> RefreshOutcome<V> {
    let observed = observe_managed(&or_empty(existing), tracked);
    if observed.is_empty() {
        RefreshOutcome::AllManagedKeysVanished
    } else {
        RefreshOutcome::Observed(observed)
    }
}

pub fn on_import<V: Clone>(existing: Option<&Document<V>>) -> Document<V> {
    adopt_document(&or_empty(existing))
}
