//! Functions every context starts with: arithmetic, comparisons, numeric
//! conversions, lists, vectors, strings and `print`.

mod collection;
mod common;
mod conversion;
mod numeric;
mod system;
mod vector;

use crate::errors::RegistrationError;
use crate::registration::{FunctionDecl, declare_function, parse_type};
use crate::symbols::SymbolTable;

/// Declarations of one builtin group, by scope.
pub(crate) trait BuiltinProvider {
    /// Free functions, declared in the builtins module.
    fn functions(&self) -> Vec<FunctionDecl>;

    /// Conversions as `(target type, decl)`; declared as `cast` members of
    /// the target type.
    fn casts(&self) -> Vec<(&'static str, FunctionDecl)> {
        Vec::new()
    }
}

fn providers() -> [&'static dyn BuiltinProvider; 6] {
    [
        &numeric::Numeric,
        &conversion::Conversions,
        &collection::Lists,
        &vector::Vectors,
        &collection::Strings,
        &system::System,
    ]
}

/// Declares every builtin in `table`.
pub fn install(table: &mut SymbolTable) -> Result<(), RegistrationError> {
    let root = table.root();
    let module = table.builtins();
    let mut count = 0;
    for provider in providers() {
        for decl in provider.functions() {
            declare_function(table, module, decl, None)?;
            count += 1;
        }
        for (target, decl) in provider.casts() {
            let scope = parse_type(table, root, target)?;
            declare_function(table, scope, decl, None)?;
            count += 1;
        }
    }
    log::debug!("installed {} builtin functions", count);
    Ok(())
}
