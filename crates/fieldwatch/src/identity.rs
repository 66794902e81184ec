#![forbid(unsafe_code)]

//! Insertion-ordered sets keyed by `Arc` pointer identity.
//!
//! Conditions, observers and validators are capability objects without a
//! meaningful notion of equality. Adding the same instance twice is a no-op;
//! two distinct instances that happen to behave identically are independent
//! members.

use std::fmt;
use std::sync::Arc;

/// A set of shared values compared by address, not by value.
pub struct IdentitySet<T: ?Sized> {
    items: Vec<Arc<T>>,
}

impl<T: ?Sized> IdentitySet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert `item`. Returns `false` if this exact instance is already a member.
    pub fn insert(&mut self, item: Arc<T>) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove the member that shares `item`'s allocation.
    ///
    /// `item` may be typed more concretely than the set (e.g. an
    /// `Arc<Validator<str>>` against a set of `dyn Validation`).
    pub fn remove<U: ?Sized>(&mut self, item: &Arc<U>) -> bool {
        let before = self.items.len();
        self.items.retain(|member| !same_allocation(member, item));
        self.items.len() != before
    }

    /// Returns `true` if `item` is a member.
    #[must_use]
    pub fn contains<U: ?Sized>(&self, item: &Arc<U>) -> bool {
        self.items.iter().any(|member| same_allocation(member, item))
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    /// Cheap immutable copy of the current membership.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Arc<T>]> {
        self.items.iter().cloned().collect()
    }
}

fn same_allocation<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl<T: ?Sized> Default for IdentitySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for IdentitySet<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for IdentitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySet")
            .field("len", &self.items.len())
            .finish()
    }
}

impl<'a, T: ?Sized> IntoIterator for &'a IdentitySet<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn same_instance_collapses() {
        let mut set: IdentitySet<dyn Named> = IdentitySet::new();
        let a: Arc<dyn Named> = Arc::new(Fixed("a"));
        assert!(set.insert(Arc::clone(&a)));
        assert!(!set.insert(Arc::clone(&a)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equal_but_distinct_instances_are_independent() {
        let mut set: IdentitySet<dyn Named> = IdentitySet::new();
        assert!(set.insert(Arc::new(Fixed("same"))));
        assert!(set.insert(Arc::new(Fixed("same"))));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_by_concrete_handle() {
        let mut set: IdentitySet<dyn Named> = IdentitySet::new();
        let concrete = Arc::new(Fixed("x"));
        let other = Arc::new(Fixed("y"));
        set.insert(concrete.clone());
        set.insert(other.clone());

        assert!(set.contains(&concrete));
        assert!(set.remove(&concrete));
        assert!(!set.remove(&concrete));
        assert!(!set.contains(&concrete));
        assert!(set.contains(&other));
        assert_eq!(set.iter().map(|n| n.name()).collect::<Vec<_>>(), ["y"]);
    }

    #[test]
    fn snapshot_is_detached_from_later_inserts() {
        let mut set: IdentitySet<dyn Named> = IdentitySet::new();
        set.insert(Arc::new(Fixed("a")));
        let snap = set.snapshot();
        set.insert(Arc::new(Fixed("b")));
        assert_eq!(snap.len(), 1);
        assert_eq!(set.len(), 2);
    }
}
