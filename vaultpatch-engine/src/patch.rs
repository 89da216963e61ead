//! Patch computations, one per kind of change to the managed key set.
//!
//! Functions that only need to know *which* keys are managed take the
//! managed mapping with an arbitrary value type; its values are ignored.

use crate::{
    diff::{keys_match, merge_keys},
    Document,
};

/// The result of [`compute_create_patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePatch<V> {
    /// The full document that should be at the remote location.
    pub document: Document<V>,
    /// Whether `document` differs from the fetched document. When `false`,
    /// no write should be performed.
    pub changed: bool,
}

/// Insert or overwrite the planned keys, unless they are all in place already.
pub fn compute_create_patch<V: Clone + PartialEq>(
    existing: &Document<V>,
    planned: &Document<V>,
) -> CreatePatch<V> {
    if keys_match(existing, planned) {
        CreatePatch {
            document: existing.clone(),
            changed: false,
        }
    } else {
        CreatePatch {
            document: merge_keys(existing, planned),
            changed: true,
        }
    }
}

/// Move the managed key set from `prior` to `planned`.
///
/// Keys that were managed before but are no longer declared are deleted,
/// whatever value they currently hold remotely. The deletions happen before
/// the planned keys are applied, so a key present in both sets ends up with
/// its planned value.
pub fn compute_update_patch<V: Clone, P>(
    existing: &Document<V>,
    prior: &Document<P>,
    planned: &Document<V>,
) -> Document<V> {
    let mut working = existing.clone();
    for key in prior.keys() {
        if !planned.contains_key(key) {
            working.remove(key);
        }
    }
    merge_keys(&working, planned)
}

/// Remove every tracked key, leaving all other keys as they are.
pub fn compute_delete_patch<V: Clone, P>(
    existing: &Document<V>,
    tracked: &Document<P>,
) -> Document<V> {
    existing
        .iter()
        .filter(|(k, _)| !tracked.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// The tracked keys that still exist remotely, with their current remote
/// values. Keys deleted out-of-band are omitted.
pub fn observe_managed<V: Clone, P>(existing: &Document<V>, tracked: &Document<P>) -> Document<V> {
    tracked
        .keys()
        .filter_map(|k| existing.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

/// On import nothing is known about which keys are ours, so everything at the
/// location is adopted.
pub fn adopt_document<V: Clone>(existing: &Document<V>) -> Document<V> {
    existing.clone()
}
