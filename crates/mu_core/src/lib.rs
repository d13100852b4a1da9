//! Core types for the Mu runtime.
//!
//! This crate holds the pieces that do not depend on the symbol table or the
//! evaluator:
//! - `Value` - tagged storage cell moved between nodes, stacks and the heap
//! - `MachineRep` - machine representation (size, alignment, register class)
//! - `ObjectId` / `SymbolId` / `ObjRef` / `Location` - arena handles
//! - `HashTable` - prime-sized chained table used for caches and interning
//! - `Name` / `NameTable` - interned identifiers

pub mod handle;
pub mod hash_table;
pub mod machine_rep;
pub mod name;
pub mod value;

pub use handle::{Location, ObjRef, ObjectId, SymbolId};
pub use hash_table::{HashTable, HashTraits};
pub use machine_rep::MachineRep;
pub use name::{Name, NameTable};
pub use value::Value;

/// Hash map used throughout the runtime.
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
/// Hash set used throughout the runtime.
pub type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;
