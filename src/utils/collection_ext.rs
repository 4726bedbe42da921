//! Collection helpers
//!
//! Small reusable pieces for merging provider results.

use std::collections::HashSet;
use std::hash::Hash;

/// Deduplicate by a derived key, keeping the first occurrence and the
/// original order. Earlier items win, which is exactly the contract of
/// priority-ordered provider merging.
#[inline]
pub fn unique_by_key<T, K, F>(items: Vec<T>, key_fn: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key_fn(item)))
        .collect()
}

/// Deduplicate plain values, keeping order
#[inline]
pub fn unique_ordered<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    unique_by_key(items, |item| item.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_by_key_keeps_first() {
        let items = vec![("a", 1), ("b", 2), ("a", 3)];
        let unique = unique_by_key(items, |(k, _)| *k);
        assert_eq!(unique, vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn unique_ordered_keeps_order() {
        assert_eq!(unique_ordered(vec![1, 2, 1, 3, 2]), vec![1, 2, 3]);
    }
}
