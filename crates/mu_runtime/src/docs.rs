//! Symbol documentation side table.

use crate::symbols::SymbolTable;
use mu_core::{FastHashMap, FastHashSet, SymbolId};
use std::sync::Arc;

/// Supplies documentation for a module the first time any of its symbols
/// is looked up.
pub trait DocumentationLoader: Send {
    fn load(&self, table: &SymbolTable, module: SymbolId, docs: &mut DocSink<'_>);
}

/// Write access handed to a loader.
pub struct DocSink<'a> {
    entries: &'a mut FastHashMap<SymbolId, Arc<str>>,
}

impl DocSink<'_> {
    pub fn add(&mut self, symbol: SymbolId, doc: impl Into<Arc<str>>) {
        self.entries.insert(symbol, doc.into());
    }
}

#[derive(Default)]
pub struct Documentation {
    entries: FastHashMap<SymbolId, Arc<str>>,
    loaded: FastHashSet<SymbolId>,
    loader: Option<Box<dyn DocumentationLoader>>,
}

impl Documentation {
    pub fn set_loader(&mut self, loader: Box<dyn DocumentationLoader>) {
        self.loader = Some(loader);
        self.loaded.clear();
    }

    pub fn add(&mut self, symbol: SymbolId, doc: Arc<str>) {
        self.entries.insert(symbol, doc);
    }

    pub fn lookup(&mut self, table: &SymbolTable, symbol: SymbolId) -> Option<Arc<str>> {
        let module = if symbol == table.root() {
            symbol
        } else {
            table.module_of(symbol)
        };
        if self.loaded.insert(module) {
            if let Some(loader) = &self.loader {
                log::debug!("loading documentation for module {}", table.qualified_name(module));
                let mut sink = DocSink {
                    entries: &mut self.entries,
                };
                loader.load(table, module, &mut sink);
            }
        }
        self.entries.get(&symbol).cloned()
    }
}
