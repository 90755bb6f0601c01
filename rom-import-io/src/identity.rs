//! Stable-identity handles.
//!
//! `Module` and `Song` are compared for map/set membership by *construction
//! identity*, not by field equality -- two modules with byte-identical
//! `raw_bytes` are still distinct modules (spec.md §9). `Id<T>` is a small,
//! `Copy`, phantom-typed wrapper around the raw counter value handed out by
//! `#[derive(Identity)]`; it implements `Hash`/`Eq`/`Ord` itself so it can be
//! used directly as a `HashMap`/`BTreeMap` key without requiring `T: Hash`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A construction-order identity handle for `T`.
pub struct Id<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Build an `Id` from a raw counter value. Used only by the
    /// `#[derive(Identity)]` macro's generated code.
    pub fn from_raw(raw: u64) -> Self {
        Self { raw, _marker: PhantomData }
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

/// Implemented by `#[derive(Identity)]`. Call `T::next_id()` exactly once per
/// instance, at construction time, and store the result on the instance.
pub trait Identity: Sized {
    fn next_id() -> Id<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    #[test]
    fn ids_with_same_raw_are_equal() {
        let a: Id<Dummy> = Id::from_raw(5);
        let b: Id<Dummy> = Id::from_raw(5);
        assert_eq!(a, b);
    }

    #[test]
    fn ids_are_usable_as_hashmap_keys() {
        use std::collections::HashMap;
        let mut map: HashMap<Id<Dummy>, &str> = HashMap::new();
        map.insert(Id::from_raw(1), "one");
        map.insert(Id::from_raw(2), "two");
        assert_eq!(map.get(&Id::from_raw(1)), Some(&"one"));
    }
}
