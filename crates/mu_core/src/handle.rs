//! Arena handles.

use std::fmt;

/// Index of a managed object in a process heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a symbol in a context's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pointer to a class instance viewed as one of its sub-objects.
///
/// `base` is the slot offset of the viewed sub-object inside the instance.
/// Views of the primary lineage share base 0; secondary bases of a multiply
/// inherited class live at the offsets recorded when the class froze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub id: ObjectId,
    pub base: u32,
}

impl ObjRef {
    pub fn new(id: ObjectId) -> Self {
        Self { id, base: 0 }
    }

    pub fn with_base(self, base: u32) -> Self {
        Self { id: self.id, base }
    }
}

/// The target of a reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Absolute index into the owning thread's value stack.
    Stack(u32),
    /// Index into the process globals.
    Global(u32),
    /// Absolute slot of a class instance.
    Field { obj: ObjectId, slot: u32 },
}
