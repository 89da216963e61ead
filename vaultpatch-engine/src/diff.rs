//! Equality and difference helpers over documents.

use std::{collections::BTreeSet, fmt};

use serde_json::Value;

use crate::Document;

/// Whether every planned key exists in `existing` with an equal value.
///
/// Keys in `existing` that are not planned do not matter.
pub fn keys_match<V: PartialEq>(existing: &Document<V>, planned: &Document<V>) -> bool {
    planned
        .iter()
        .all(|(k, v)| existing.get(k).is_some_and(|ev| ev == v))
}

/// `existing` with every pair of `overlay` inserted or overwritten.
pub fn merge_keys<V: Clone>(existing: &Document<V>, overlay: &Document<V>) -> Document<V> {
    let mut merged = existing.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// The key names of a mapping, comma separated, in sorted order.
///
/// Values are left out: this is what goes into log messages.
pub fn key_names<V>(map: &Document<V>) -> String {
    map.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Which keys a declaration change adds, changes and removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    pub added: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl KeyDiff {
    pub fn between<V: PartialEq>(prior: &Document<V>, planned: &Document<V>) -> KeyDiff {
        let mut diff = KeyDiff::default();
        for (k, v) in planned {
            match prior.get(k) {
                None => {
                    diff.added.insert(k.clone());
                }
                Some(pv) if pv != v => {
                    diff.changed.insert(k.clone());
                }
                Some(_) => {}
            }
        }
        diff.removed = prior
            .keys()
            .filter(|k| !planned.contains_key(*k))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for KeyDiff {
    /// `+added ~changed -removed`, space separated; `(no changes)` when empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no changes)");
        }
        let entries = self
            .added
            .iter()
            .map(|k| format!("+{}", k))
            .chain(self.changed.iter().map(|k| format!("~{}", k)))
            .chain(self.removed.iter().map(|k| format!("-{}", k)));
        write!(f, "{}", entries.collect::<Vec<_>>().join(" "))
    }
}

/// Express the change from `before` to `after` as field-level mutations.
///
/// A store that supports partial updates could apply these instead of
/// replacing the whole document.
pub fn to_json_patch<V: Clone + Into<Value>>(
    before: &Document<V>,
    after: &Document<V>,
) -> json_patch::Patch {
    json_patch::diff(&to_object(before), &to_object(after))
}

fn to_object<V: Clone + Into<Value>>(doc: &Document<V>) -> Value {
    Value::Object(
        doc.iter()
            .map(|(k, v)| (k.clone(), v.clone().into()))
            .collect(),
    )
}
