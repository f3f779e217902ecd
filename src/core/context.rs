//! Machine context and shallow merge semantics.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// Shared data carried by a machine and updated on every transition.
///
/// `merge` is a shallow merge: top-level keys present in `partial` replace
/// the existing ones, everything else is left untouched. Nested values are
/// replaced wholesale, never combined recursively.
///
/// # Example
///
/// ```rust
/// use micromachine::core::Context;
/// use serde_json::json;
///
/// let mut context = json!({ "a": 1, "nested": { "x": 1 } });
/// context.merge(json!({ "a": 2, "b": 3, "nested": { "y": 2 } }));
///
/// assert_eq!(context, json!({ "a": 2, "b": 3, "nested": { "y": 2 } }));
/// ```
pub trait Context: Clone + Debug + Send + Sync + 'static {
    /// Merge `partial` into `self`, later keys winning.
    fn merge(&mut self, partial: Self);
}

impl Context for Value {
    /// Objects merge key by key. Any other combination replaces the value.
    fn merge(&mut self, partial: Self) {
        match (self, partial) {
            (Value::Object(current), Value::Object(partial)) => current.merge(partial),
            (current, partial) => *current = partial,
        }
    }
}

impl Context for Map<String, Value> {
    fn merge(&mut self, partial: Self) {
        self.extend(partial);
    }
}

impl<K, V> Context for HashMap<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    fn merge(&mut self, partial: Self) {
        self.extend(partial);
    }
}

impl<K, V> Context for BTreeMap<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    fn merge(&mut self, partial: Self) {
        self.extend(partial);
    }
}

impl Context for () {
    fn merge(&mut self, _partial: Self) {}
}
