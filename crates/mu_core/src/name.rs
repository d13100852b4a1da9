//! Interned identifiers.

use crate::hash_table::{HashTable, HashTraits};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An interned identifier. Names from the same `NameTable` compare by
/// pointer.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_arc(&self) -> &Arc<str> {
        &self.0
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct NameTraits;

// Fixed keys so a name hashes the same in every table.
fn hash_str(s: &str) -> u64 {
    ahash::RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
    .hash_one(s)
}

impl HashTraits<Arc<str>> for NameTraits {
    fn hash(item: &Arc<str>) -> u64 {
        hash_str(item)
    }

    fn equals(a: &Arc<str>, b: &Arc<str>) -> bool {
        a == b
    }
}

#[derive(Default)]
pub struct NameTable {
    names: HashTable<Arc<str>, NameTraits>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(found) = self.lookup(s) {
            return found;
        }
        Name(self.names.insert(Arc::from(s)).clone())
    }

    /// The interned name for `s`, without adding it.
    pub fn lookup(&self, s: &str) -> Option<Name> {
        self.names
            .find_by(hash_str(s), |e| &**e == s)
            .map(|e| Name(e.clone()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_storage() {
        let mut t = NameTable::new();
        let a = t.intern("area");
        let b = t.intern("area");
        assert!(Arc::ptr_eq(a.as_arc(), b.as_arc()));
        assert_eq!(t.len(), 1);
        assert_eq!(t.lookup("missing"), None);
    }
}
