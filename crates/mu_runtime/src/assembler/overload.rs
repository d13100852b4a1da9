//! Overload selection and argument conversion.
//!
//! Each argument scores against its parameter: an exact type scores 3, a
//! match through inheritance, list covariance or a type variable scores 2
//! and an implicit cast scores 1. A candidate's score is the sum; the best
//! unique score wins.

use super::{NodeAssembler, Resolved};
use crate::eval::object;
use crate::node::Node;
use crate::symbols::{FunctionAttrs, FunctionBody};
use crate::types::{Bindings, TypeKind};
use mu_core::{SymbolId, Value};
use mu_syntax::DiagnosticKind;

const EXACT: u32 = 3;
const MATCH: u32 = 2;
const CAST: u32 = 1;

/// The winning candidate with its arguments converted, in source order.
pub(super) struct Chosen {
    pub function: SymbolId,
    pub args: Vec<Node>,
    pub result: SymbolId,
    /// Arguments were matched against the parameters in reverse order.
    pub swapped: bool,
}

struct Candidate {
    function: SymbolId,
    score: u32,
    bindings: Bindings,
    swapped: bool,
}

impl NodeAssembler<'_> {
    fn conversion_score(&self, param: SymbolId, arg: SymbolId, bindings: &mut Bindings) -> Option<u32> {
        let table = &*self.table;
        if table.is_reference(param) {
            return (param == arg).then_some(EXACT);
        }
        let arg = table.dereferenced(arg);
        if param == arg {
            return Some(EXACT);
        }
        if table.match_type(param, arg, bindings) {
            return self.list_compatible(param, arg).then_some(MATCH);
        }
        self.implicit_cast(arg, param).map(|_| CAST)
    }

    fn score(&self, params: &[SymbolId], args: &[SymbolId]) -> Option<(u32, Bindings)> {
        let mut bindings = Bindings::default();
        let mut total = 0;
        for (&p, &a) in params.iter().zip(args) {
            total += self.conversion_score(p, a, &mut bindings)?;
        }
        Some((total, bindings))
    }

    /// Whether a value of `from` can be converted to `to` without an
    /// explicit cast.
    pub(super) fn coercible(&self, from: SymbolId, to: SymbolId) -> bool {
        self.conversion_score(to, from, &mut Bindings::default())
            .is_some()
    }

    /// A list of `arg` elements can be viewed as a list of `param` elements
    /// only when no element pointer needs adjusting.
    fn list_compatible(&self, param: SymbolId, arg: SymbolId) -> bool {
        let table = &*self.table;
        match (table.type_kind(param), table.type_kind(arg)) {
            (Some(TypeKind::List(pe)), Some(TypeKind::List(ae))) => self.element_compatible(*pe, *ae),
            _ => true,
        }
    }

    fn element_compatible(&self, param: SymbolId, arg: SymbolId) -> bool {
        let table = &*self.table;
        match (table.type_kind(param), table.type_kind(arg)) {
            (Some(TypeKind::Class(_)), Some(TypeKind::Class(_))) => table.substitutable(arg, param),
            (Some(TypeKind::List(pe)), Some(TypeKind::List(ae))) => self.element_compatible(*pe, *ae),
            _ => true,
        }
    }

    fn find_cast(&self, from: SymbolId, to: SymbolId, explicit: bool) -> Option<SymbolId> {
        let name = self.table.lookup_name("cast")?;
        self.table
            .members(to, &name)
            .iter()
            .copied()
            .find(|&f| {
                self.table.function(f).is_some_and(|info| {
                    let allowed = info.attrs.contains(FunctionAttrs::IMPLICIT_CAST)
                        || (explicit && info.attrs.contains(FunctionAttrs::CAST));
                    allowed && info.params.as_slice() == [from]
                })
            })
    }

    pub(super) fn implicit_cast(&self, from: SymbolId, to: SymbolId) -> Option<SymbolId> {
        self.find_cast(from, to, false)
    }

    pub(super) fn explicit_cast(&self, from: SymbolId, to: SymbolId) -> Option<SymbolId> {
        self.find_cast(from, to, true)
    }

    /// Converts `node` to `target`: dereferences, upcasts and implicit
    /// casts as needed.
    pub(super) fn coerce(&mut self, node: Node, target: SymbolId) -> Resolved {
        if node.ty == target {
            return Ok(node);
        }
        let cannot = |this: &Self, from: SymbolId| {
            this.error(DiagnosticKind::CannotAssign {
                from: this.table.type_name(from),
                to: this.table.type_name(target),
            })
        };
        if self.table.is_reference(target) {
            return Err(cannot(self, node.ty));
        }
        let mut node = self.rvalue(node)?;
        let from = node.ty;
        if from == target {
            return Ok(node);
        }
        let mut bindings = Bindings::default();
        if self.table.match_type(target, from, &mut bindings) {
            let both_classes = matches!(
                (self.table.type_kind(target), self.table.type_kind(from)),
                (Some(TypeKind::Class(_)), Some(TypeKind::Class(_)))
            );
            if both_classes {
                let offset = self
                    .table
                    .offset_of(from, target)
                    .ok_or_else(|| cannot(self, from))?;
                return Ok(self.upcast(node, target, offset));
            }
            if !self.list_compatible(target, from) {
                return Err(cannot(self, from));
            }
            if !self.table.contains_type_variable(target) {
                node.ty = target;
            }
            return Ok(node);
        }
        match self.implicit_cast(from, target) {
            Some(cast) => self.call_node(cast, vec![node], target, false),
            None => Err(cannot(self, from)),
        }
    }

    /// Views a class pointer as its ancestor `target`, `offset` slots in.
    pub(super) fn upcast(&self, mut node: Node, target: SymbolId, offset: u32) -> Node {
        if offset == 0 {
            node.ty = target;
            return node;
        }
        Node::new(object::upcast, target, vec![node]).with_data(Value::Int(offset as i32))
    }

    pub(super) fn signature(&self, function: SymbolId) -> String {
        let table = &*self.table;
        let Some(info) = table.function(function) else {
            return table.qualified_name(function);
        };
        let params: Vec<String> = info
            .explicit_params()
            .iter()
            .map(|&p| table.type_name(p))
            .collect();
        format!(
            "{}({}) -> {}",
            table.qualified_name(function),
            params.join(", "),
            table.type_name(info.result)
        )
    }

    /// Picks the best of `candidates` for `args` and converts the arguments
    /// to its parameter types.
    pub(super) fn choose(&mut self, name: &str, candidates: &[SymbolId], args: Vec<Node>) -> Resolved<Chosen> {
        let arg_types: Vec<SymbolId> = args.iter().map(|a| a.ty).collect();
        let mut arities: Vec<usize> = Vec::new();
        let mut best: Vec<Candidate> = Vec::new();
        for &function in candidates {
            let Some(info) = self.table.function(function) else {
                continue;
            };
            let params = info.explicit_params();
            if params.len() != arg_types.len() {
                arities.push(params.len());
                continue;
            }
            let direct = self.score(params, &arg_types);
            let reversed = if info.attrs.contains(FunctionAttrs::COMMUTATIVE) && params.len() == 2 {
                self.score(params, &[arg_types[1], arg_types[0]])
            } else {
                None
            };
            let (score, bindings, swapped) = match (direct, reversed) {
                (Some(d), Some(r)) if r.0 > d.0 => (r.0, r.1, true),
                (Some(d), _) => (d.0, d.1, false),
                (None, Some(r)) => (r.0, r.1, true),
                (None, None) => {
                    arities.push(params.len());
                    continue;
                }
            };
            let candidate = Candidate {
                function,
                score,
                bindings,
                swapped,
            };
            match best.first().map(|b| b.score) {
                Some(top) if top > score => {}
                Some(top) if top == score => best.push(candidate),
                _ => best = vec![candidate],
            }
        }

        if best.len() > 1 {
            return Err(self.error(DiagnosticKind::AmbiguousOverload {
                name: name.to_string(),
                candidates: best.iter().map(|c| self.signature(c.function)).collect(),
            }));
        }
        let Some(winner) = best.pop() else {
            if !arities.contains(&arg_types.len()) {
                arities.sort_unstable();
                arities.dedup();
                return Err(self.error(DiagnosticKind::ArityMismatch {
                    name: name.to_string(),
                    expected: arities,
                    actual: arg_types.len(),
                }));
            }
            return Err(self.error(DiagnosticKind::NoMatchingOverload {
                name: name.to_string(),
                args: arg_types.iter().map(|&t| self.table.type_name(t)).collect(),
            }));
        };

        let (params, result) = match self.table.function(winner.function) {
            Some(info) => (info.explicit_params().to_vec(), info.result),
            None => return Err(self.error(DiagnosticKind::NotCallable(name.to_string()))),
        };
        let result = self.table.substitute(result, &winner.bindings);
        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let param_index = if winner.swapped { params.len() - 1 - i } else { i };
            let param = self.table.substitute(params[param_index], &winner.bindings);
            converted.push(self.coerce(arg, param)?);
        }
        log::trace!(
            "{} resolved to {} (score {}{})",
            name,
            self.signature(winner.function),
            winner.score,
            if winner.swapped { ", swapped" } else { "" }
        );
        Ok(Chosen {
            function: winner.function,
            args: converted,
            result,
            swapped: winner.swapped,
        })
    }

    /// Call node for `function` with already converted arguments.
    pub(super) fn call_node(
        &mut self,
        function: SymbolId,
        mut args: Vec<Node>,
        result: SymbolId,
        swapped: bool,
    ) -> Resolved {
        let body = self.table.function(function).map(|f| f.body.clone());
        let node = match body {
            Some(FunctionBody::Native(native)) => {
                Node::new(crate::eval::call::call_native, result, args).with_native(native)
            }
            Some(FunctionBody::Inline(func)) => {
                // Inline bodies read their arguments positionally.
                if swapped {
                    args.swap(0, 1);
                }
                return Ok(Node::new(func, result, args).with_symbol(function));
            }
            Some(_) => Node::new(crate::eval::call::call_function, result, args),
            None => {
                let name = self.table.qualified_name(function);
                return Err(self.error(DiagnosticKind::NotCallable(name)));
            }
        };
        let node = node.with_symbol(function);
        Ok(if swapped { node.with_data(Value::Bool(true)) } else { node })
    }
}
