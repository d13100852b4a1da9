//! Contexts: the symbol state shared by every process created over them.
//!
//! A context owns one symbol table. Registration, building and resolution
//! take its write lock; evaluation takes short read locks.

use crate::assembler;
use crate::ast::{AstBuilder, AstUnit};
use crate::builtins;
use crate::errors::{RegistrationError, ResolveError};
use crate::node::Node;
use crate::registration::{self, ClassDecl, Decl, InterfaceDecl, parse_type};
use crate::symbols::{Primitives, Storage, SymbolTable};
use mu_core::SymbolId;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

pub struct Context {
    name: String,
    table: RwLock<SymbolTable>,
}

impl Context {
    /// A context with the builtin functions installed.
    pub fn new(name: &str) -> Arc<Self> {
        let mut table = SymbolTable::new();
        if let Err(e) = builtins::install(&mut table) {
            log::error!("builtin registration failed: {e}");
        }
        log::debug!("context {} created with {} symbols", name, table.len());
        Arc::new(Self {
            name: name.to_string(),
            table: RwLock::new(table),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SymbolTable> {
        self.table.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SymbolTable> {
        self.table.write()
    }

    pub fn root(&self) -> SymbolId {
        self.read().root()
    }

    pub fn prims(&self) -> Primitives {
        *self.read().prims()
    }

    // --- registration ----------------------------------------------------

    /// Declares `decls` in `scope`, in order. Stops at the first failure;
    /// symbols declared before it stay.
    pub fn add_symbols(
        &self,
        scope: SymbolId,
        decls: impl IntoIterator<Item = Decl>,
    ) -> Result<Vec<SymbolId>, RegistrationError> {
        let mut table = self.write();
        decls
            .into_iter()
            .map(|d| registration::declare(&mut table, scope, d))
            .collect()
    }

    /// The module `name` in `scope`, created if missing.
    pub fn add_module(&self, scope: SymbolId, name: &str) -> Result<SymbolId, RegistrationError> {
        self.write().add_module(scope, name)
    }

    /// Declares and freezes a class.
    pub fn declare_class(&self, scope: SymbolId, decl: ClassDecl) -> Result<SymbolId, RegistrationError> {
        registration::declare_class(&mut self.write(), scope, decl)
    }

    pub fn declare_interface(
        &self,
        scope: SymbolId,
        decl: InterfaceDecl,
    ) -> Result<SymbolId, RegistrationError> {
        registration::declare_interface(&mut self.write(), scope, decl)
    }

    /// Computes the layout of a class. Freezing twice is a no-op.
    pub fn freeze(&self, class: SymbolId) -> Result<(), RegistrationError> {
        self.write().freeze(class)
    }

    // --- lookup ----------------------------------------------------------

    /// Resolves a type name from the root module.
    pub fn lookup_type(&self, text: &str) -> Result<SymbolId, RegistrationError> {
        let mut table = self.write();
        let root = table.root();
        parse_type(&mut table, root, text)
    }

    pub fn list_type(&self, element: SymbolId) -> SymbolId {
        self.write().list_type(element)
    }

    pub fn reference_type(&self, target: SymbolId) -> SymbolId {
        self.write().reference_type(target)
    }

    /// A symbol by dotted path from the root.
    pub fn find(&self, path: &str) -> Option<SymbolId> {
        self.read().find_qualified(path)
    }

    pub fn qualified_name(&self, symbol: SymbolId) -> String {
        self.read().qualified_name(symbol)
    }

    /// Slot of a global variable.
    pub fn global_index(&self, symbol: SymbolId) -> Option<u32> {
        match self.read().variable(symbol)?.storage {
            Storage::Global(index) => Some(index),
            _ => None,
        }
    }

    // --- building and resolution -----------------------------------------

    /// A builder for a new unit in the root module. Holds the write lock
    /// until the builder is finished.
    pub fn builder(&self) -> AstBuilder<'_> {
        let table = self.write();
        let root = table.root();
        AstBuilder::new(table, root)
    }

    /// A builder for a new unit in `module`.
    pub fn builder_in(&self, module: SymbolId) -> AstBuilder<'_> {
        AstBuilder::new(self.write(), module)
    }

    /// Resolves a unit. On success every function body of the unit is
    /// installed and the tree of its top-level statements is returned; on
    /// failure nothing is installed and the functions, classes and globals
    /// the unit declared in its module are removed again.
    pub fn assemble(&self, unit: AstUnit) -> Result<Node, ResolveError> {
        assembler::assemble(&mut self.write(), &unit)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("name", &self.name).finish()
    }
}
