//! Ordered collection with non-mutating transforms.
//!
//! Every operation leaves the receiver untouched and either returns a new
//! collection or borrows into the existing one. `extend` also returns a new
//! collection, which keeps it safe to use inside a cell transform.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Apply `f` to every element. Same length, same order.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: FnMut(&T) -> T,
    {
        Self {
            items: self.items.iter().map(f).collect(),
        }
    }

    /// Keep the elements satisfying `p`, in order.
    pub fn filter<P>(&self, mut p: P) -> Self
    where
        T: Clone,
        P: FnMut(&T) -> bool,
    {
        Self {
            items: self.items.iter().filter(|item| p(*item)).cloned().collect(),
        }
    }

    /// The first element satisfying `p`.
    pub fn select<P>(&self, mut p: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().find(|item| p(*item))
    }

    /// Every element satisfying `p`, in order. Empty if none match.
    pub fn select_many<P>(&self, mut p: P) -> Vec<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().filter(|item| p(*item)).collect()
    }

    /// This collection's elements followed by `other`'s. Duplicates are kept.
    pub fn extend(&self, other: &Collection<T>) -> Self
    where
        T: Clone,
    {
        let mut items = Vec::with_capacity(self.items.len() + other.items.len());
        items.extend_from_slice(&self.items);
        items.extend_from_slice(&other.items);
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
