//! Generic set reconciliation between a mirrored collection and its source
//! of truth.
//!
//! Tags and metadata are both key/value sets mirrored from storage into the
//! catalog, so the associate/dissociate computation is written once and
//! parameterized by a key-extraction function.

use std::collections::HashSet;
use std::hash::Hash;

/// The result of diffing a mirrored collection against the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    /// Present in the desired state but missing from the mirror.
    pub to_add: Vec<T>,
    /// Present in the mirror but gone from the desired state.
    pub to_remove: Vec<T>,
}

impl<T> Diff<T> {
    /// Whether the mirror already matches the desired state.
    pub fn is_clean(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the additions and removals that make `current` match `desired`.
///
/// Entries are compared by the key `key_of` extracts; an entry whose key
/// appears on both sides is left alone. Extracting the full value makes the
/// comparison exact, which is what tag and metadata mirroring use.
pub fn diff<T, K, F>(current: &[T], desired: &[T], key_of: F) -> Diff<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let current_keys: HashSet<K> = current.iter().map(&key_of).collect();
    let desired_keys: HashSet<K> = desired.iter().map(&key_of).collect();

    let to_add = desired
        .iter()
        .filter(|entry| !current_keys.contains(&key_of(entry)))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|entry| !desired_keys.contains(&key_of(entry)))
        .cloned()
        .collect();

    Diff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coms_core::KvPair;

    #[test]
    fn equal_sets_are_clean() {
        let pairs = vec![KvPair::new("a", "1"), KvPair::new("b", "2")];
        let result = diff(&pairs, &pairs, Clone::clone);
        assert!(result.is_clean());
    }

    #[test]
    fn value_change_removes_and_adds() {
        let current = vec![KvPair::new("env", "staging")];
        let desired = vec![KvPair::new("env", "prod")];
        let result = diff(&current, &desired, Clone::clone);
        assert_eq!(result.to_add, vec![KvPair::new("env", "prod")]);
        assert_eq!(result.to_remove, vec![KvPair::new("env", "staging")]);
    }

    #[test]
    fn disjoint_sets_swap_entirely() {
        let current = vec![KvPair::new("a", "1")];
        let desired = vec![KvPair::new("b", "2"), KvPair::new("c", "3")];
        let result = diff(&current, &desired, Clone::clone);
        assert_eq!(result.to_add.len(), 2);
        assert_eq!(result.to_remove.len(), 1);
    }

    #[test]
    fn empty_desired_removes_everything() {
        let current = vec![KvPair::new("a", "1"), KvPair::new("b", "2")];
        let result = diff(&current, &[], Clone::clone);
        assert!(result.to_add.is_empty());
        assert_eq!(result.to_remove.len(), 2);
    }
}
