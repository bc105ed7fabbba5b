//! Frozen result lists.
//!
//! Lookups hand out shared, immutable slices. Cloning a [`Frozen`] is a
//! reference-count bump, and two lookups of the same index entry return the
//! same allocation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// An immutable, shared list.
pub struct Frozen<T>(Arc<[T]>);

impl<T> Frozen<T> {
    /// Returns an empty list.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Freezes a vector.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self(Arc::from(items))
    }

    /// Returns the elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Returns true if both lists share one allocation.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: Clone> Frozen<T> {
    /// Concatenates several lists into a new frozen list.
    #[must_use]
    pub fn concat<'a, I>(lists: I) -> Self
    where
        I: IntoIterator<Item = &'a Frozen<T>>,
        T: 'a,
    {
        let mut items = Vec::new();
        for list in lists {
            items.extend_from_slice(list);
        }
        Self::new(items)
    }
}

impl<T> Clone for Frozen<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for Frozen<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for Frozen<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Frozen<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for Frozen<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl<T: Eq> Eq for Frozen<T> {}

impl<T: Hash> Hash for Frozen<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> From<Vec<T>> for Frozen<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> FromIterator<T> for Frozen<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a Frozen<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
