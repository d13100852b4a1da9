//! Depth-first tree rewriting.

use crate::ast::Ast;
use crate::node::Node;
use mu_syntax::Diagnostic;

/// Turns unresolved trees into resolved ones, children before parents.
///
/// `before_child` runs before child `index` is resolved, with the children
/// already resolved, so a parent can declare what the next child sees (a
/// loop variable, a handler variable, a lambda frame).
pub trait NodePatch {
    fn before_child(&mut self, _ast: &Ast, _index: usize, _done: &[Node]) -> Result<(), Diagnostic> {
        Ok(())
    }

    fn resolve(&mut self, ast: &Ast, children: Vec<Node>) -> Result<Node, Diagnostic>;
}

/// Resolves `ast` bottom-up. The first diagnostic aborts the walk.
pub fn walk<P: NodePatch + ?Sized>(patch: &mut P, ast: &Ast) -> Result<Node, Diagnostic> {
    let mut children = Vec::with_capacity(ast.args.len());
    for (index, child) in ast.args.iter().enumerate() {
        patch.before_child(ast, index, &children)?;
        children.push(walk(patch, child)?);
    }
    patch.resolve(ast, children)
}
