//! Resolution of unresolved trees into evaluable nodes.
//!
//! The assembler walks each tree of an `AstUnit` bottom-up, looks names up
//! in the scope recorded on every `Ast`, picks overloads and inserts the
//! conversions they need. Stack variables get frame slots as they are
//! declared. The first error abandons the whole unit: no function body of
//! the unit is installed and no root is produced.

mod overload;
mod patch;

pub use patch::{NodePatch, walk};

use crate::ast::{Ast, AstKind, AstUnit, Literal};
use crate::errors::{RegistrationError, ResolveError};
use crate::eval::{CatchMode, RepFuncs, call, control, object, rep_funcs};
use crate::node::Node;
use crate::registration::parse_type;
use crate::symbols::{
    FunctionAttrs, FunctionBody, FunctionCode, Overloads, Storage, SymbolKind, SymbolTable, VariableInfo,
};
use crate::types::TypeKind;
use mu_core::{SymbolId, Value};
use mu_syntax::{Diagnostic, DiagnosticKind, DiagnosticsFormatter, SourcePos, find_best_match};
use std::sync::Arc;

pub(crate) type Resolved<T = Node> = Result<T, Diagnostic>;

struct Capture {
    variable: SymbolId,
    slot: u32,
}

/// Per-function resolution state.
struct FrameContext {
    frame: u32,
    /// `None` for the top-level statements of a unit.
    function: Option<SymbolId>,
    lambda: bool,
    result: SymbolId,
    next_slot: u32,
    loop_depth: u32,
    captures: Vec<Capture>,
}

impl FrameContext {
    fn new(frame: u32, function: Option<SymbolId>, lambda: bool, result: SymbolId, params: u32) -> Self {
        Self {
            frame,
            function,
            lambda,
            result,
            next_slot: params,
            loop_depth: 0,
            captures: Vec::new(),
        }
    }
}

/// What a name lookup found, by the kind of its first symbol.
enum Found {
    Nothing,
    Variable(SymbolId, VariableInfo),
    Functions,
    Class(SymbolId),
    Type(SymbolId),
    Other,
}

pub struct NodeAssembler<'t> {
    table: &'t mut SymbolTable,
    frames: Vec<FrameContext>,
    bodies: Vec<(SymbolId, FunctionCode)>,
    pos: SourcePos,
    warnings: Vec<Diagnostic>,
}

/// Resolves `unit` against `table`, installing its function bodies and
/// returning the tree of its top-level statements.
pub fn assemble(table: &mut SymbolTable, unit: &AstUnit) -> Result<Node, ResolveError> {
    NodeAssembler::new(table).assemble(unit)
}

impl<'t> NodeAssembler<'t> {
    pub fn new(table: &'t mut SymbolTable) -> Self {
        Self {
            table,
            frames: Vec::new(),
            bodies: Vec::new(),
            pos: SourcePos::default(),
            warnings: Vec::new(),
        }
    }

    pub fn assemble(mut self, unit: &AstUnit) -> Result<Node, ResolveError> {
        for (function, ast) in &unit.functions {
            if let Err(d) = self.function_body(*function, ast) {
                return Err(self.fail(unit, d));
            }
        }
        let root = match self.top_level(unit.frame, &unit.top) {
            Ok(root) => root,
            Err(d) => return Err(self.fail(unit, d)),
        };
        let installed = self.bodies.len();
        for (function, code) in self.bodies.drain(..) {
            if let Some(info) = self.table.function_mut(function) {
                info.body = FunctionBody::Code(Arc::new(code));
            }
        }
        log::debug!(
            "assembled unit: {} function bodies, {} top-level statements",
            installed,
            unit.top.len()
        );
        Ok(root)
    }

    /// Takes back what the unit declared and reports `error` first.
    fn fail(mut self, unit: &AstUnit, error: Diagnostic) -> ResolveError {
        log::debug!("resolution failed: {}", error.message);
        self.table.retract(&unit.declared);
        let mut diagnostics = self.warnings;
        diagnostics.insert(0, error);
        ResolveError { diagnostics }
    }

    fn function_body(&mut self, function: SymbolId, ast: &Ast) -> Resolved<()> {
        let Some(info) = self.table.function(function) else {
            let name = self.table.qualified_name(function);
            return Err(self.error(DiagnosticKind::NotCallable(name)));
        };
        let context = FrameContext::new(
            info.frame,
            Some(function),
            false,
            info.result,
            info.params.len() as u32,
        );
        self.frames.push(context);
        let body = walk(self, ast);
        let context = self.pop_frame()?;
        let code = self.finish_function(body?, context)?;
        self.bodies.push((function, code));
        Ok(())
    }

    fn top_level(&mut self, frame: u32, top: &[Ast]) -> Resolved {
        let void = self.table.prims().void;
        self.frames.push(FrameContext::new(frame, None, false, void, 0));
        let mut statements = Vec::with_capacity(top.len() + 1);
        for ast in top {
            statements.push(walk(self, ast)?);
        }
        // The frame is gone once the block ends, so a trailing reference is
        // loaded inside it.
        if let Some(last) = statements.pop() {
            statements.push(self.rvalue(last)?);
        }
        let context = self.pop_frame()?;
        let ty = statements.last().map_or(void, |s| s.ty);
        statements.insert(0, self.const_int(context.next_slot as i32)?);
        Ok(Node::new(control::fixed_frame_block, ty, statements))
    }

    fn finish_function(&mut self, body: Node, context: FrameContext) -> Resolved<FunctionCode> {
        let result = context.result;
        let void = self.table.prims().void;
        let root = if result != void && body.ty != result && self.coercible(body.ty, result) {
            self.coerce(body, result)?
        } else {
            body
        };
        Ok(FunctionCode {
            root,
            frame_size: context.next_slot,
            capture_slots: context.captures.iter().map(|c| c.slot).collect(),
            result_rep: self.table.rep(result),
        })
    }

    // --- helpers ---------------------------------------------------------

    pub(crate) fn error(&self, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic::error_kind(kind, Some(self.pos.clone()))
    }

    fn registration_error(&self, error: RegistrationError) -> Diagnostic {
        match error {
            RegistrationError::UnknownType(name) => self.error(DiagnosticKind::UnknownType(name)),
            other => self.error(DiagnosticKind::Raw(other.to_string())),
        }
    }

    fn frame_mut(&mut self) -> Resolved<&mut FrameContext> {
        let pos = self.pos.clone();
        self.frames.last_mut().ok_or_else(|| {
            Diagnostic::error_kind(DiagnosticKind::Raw("no open frame".into()), Some(pos))
        })
    }

    fn pop_frame(&mut self) -> Resolved<FrameContext> {
        self.frames
            .pop()
            .ok_or_else(|| self.error(DiagnosticKind::Raw("no open frame".into())))
    }

    fn funcs(&self, ty: SymbolId) -> Resolved<&'static RepFuncs> {
        let rep = self.table.rep(ty);
        rep_funcs(rep).ok_or_else(|| {
            self.error(DiagnosticKind::UnsupportedRepresentation(rep.name().to_string()))
        })
    }

    fn type_name(&self, ty: SymbolId) -> String {
        self.table.type_name(ty)
    }

    fn parse_type(&mut self, scope: SymbolId, text: &str) -> Resolved<SymbolId> {
        parse_type(self.table, scope, text).map_err(|e| self.registration_error(e))
    }

    fn const_int(&self, value: i32) -> Resolved {
        let int = self.table.prims().int;
        Ok(Node::new(self.funcs(int)?.constant, int, Vec::new()).with_data(Value::Int(value)))
    }

    fn classify(&self, found: &[SymbolId]) -> Found {
        let Some(&first) = found.first() else {
            return Found::Nothing;
        };
        match &self.table.get(first).kind {
            SymbolKind::Variable(v) => Found::Variable(first, v.clone()),
            SymbolKind::Function(_) => Found::Functions,
            SymbolKind::Type(t) if matches!(t.kind, TypeKind::Class(_)) => Found::Class(first),
            SymbolKind::Type(_) => Found::Type(first),
            _ => Found::Other,
        }
    }

    /// Adds a "did you mean" hint naming the closest visible symbol.
    fn unresolved(&self, scope: SymbolId, name: &str, kind: DiagnosticKind) -> Diagnostic {
        let mut visible = Vec::new();
        let mut cur = Some(scope);
        while let Some(s) = cur {
            let sym = self.table.get(s);
            visible.extend(sym.member_names().map(|n| n.as_str()));
            cur = sym.scope;
        }
        let builtins = self.table.get(self.table.builtins());
        visible.extend(builtins.member_names().map(|n| n.as_str()));
        let diagnostic = self.error(kind);
        match find_best_match(name, visible.into_iter()) {
            Some(best) => {
                diagnostic.with_help(DiagnosticsFormatter::format(&DiagnosticKind::DidYouMean(best.to_string())))
            }
            None => diagnostic,
        }
    }

    /// Loads the value a reference-typed node points at; other nodes pass
    /// through. Direct variable references fold into a single load.
    fn rvalue(&self, node: Node) -> Resolved {
        let Some(TypeKind::Reference(target)) = self.table.type_kind(node.ty) else {
            return Ok(node);
        };
        let target = *target;
        let funcs = self.funcs(target)?;
        let storage = node
            .symbol
            .and_then(|s| self.table.variable(s))
            .map(|v| v.storage);
        let func = match storage {
            Some(Storage::Stack(_) | Storage::Parameter(_)) => funcs.dereference_stack,
            Some(Storage::Global(_)) => funcs.dereference_global,
            Some(Storage::Member(_)) => funcs.dereference_member,
            None => return Ok(Node::new(funcs.dereference, target, vec![node])),
        };
        let Node {
            args, data, symbol, ..
        } = node;
        let mut load = Node::new(func, target, args);
        load.data = data;
        load.symbol = symbol;
        Ok(load)
    }

    // --- variables -------------------------------------------------------

    fn declare_local(&mut self, scope: SymbolId, name: &str, ty: SymbolId) -> Resolved<(SymbolId, u32)> {
        if ty == self.table.prims().void {
            return Err(self.error(DiagnosticKind::CannotInferType(format!("\"{}\"", name))));
        }
        let context = self.frame_mut()?;
        let slot = context.next_slot;
        context.next_slot += 1;
        let frame = context.frame;
        let interned = self.table.intern(name);
        let variable = self
            .table
            .add(
                scope,
                interned,
                SymbolKind::Variable(VariableInfo {
                    ty,
                    storage: Storage::Stack(slot),
                    frame: Some(frame),
                }),
            )
            .map_err(|e| self.registration_error(e))?;
        Ok((variable, slot))
    }

    /// A stack variable declared directly in `scope`.
    fn local_named(&self, scope: SymbolId, name: &str) -> Resolved<(SymbolId, VariableInfo, u32)> {
        let found = self
            .table
            .lookup_name(name)
            .and_then(|n| self.table.members(scope, &n).first().copied());
        let Some(variable) = found else {
            return Err(self.error(DiagnosticKind::UnresolvedReference(name.to_string())));
        };
        match self.table.variable(variable) {
            Some(info) => match info.storage {
                Storage::Stack(slot) => Ok((variable, info.clone(), slot)),
                _ => Err(self.error(DiagnosticKind::UnresolvedReference(name.to_string()))),
            },
            None => Err(self.error(DiagnosticKind::UnresolvedReference(name.to_string()))),
        }
    }

    /// Slot of a stack variable as seen from the frame at `index`,
    /// capturing it into every lambda frame between its owner and `index`.
    fn capture_slot(&mut self, index: usize, variable: SymbolId, frame: u32, own: u32) -> Resolved<u32> {
        let context = &self.frames[index];
        if context.frame == frame {
            return Ok(own);
        }
        if let Some(c) = context.captures.iter().find(|c| c.variable == variable) {
            return Ok(c.slot);
        }
        if !context.lambda || index == 0 {
            let name = self.table.name(variable).to_string();
            return Err(self.error(DiagnosticKind::Raw(format!(
                "\"{}\" belongs to an enclosing function and only lambdas can capture it",
                name
            ))));
        }
        self.capture_slot(index - 1, variable, frame, own)?;
        let context = &mut self.frames[index];
        let slot = context.next_slot;
        context.next_slot += 1;
        context.captures.push(Capture { variable, slot });
        log::trace!("captured {} into slot {}", variable, slot);
        Ok(slot)
    }

    fn variable_reference(&mut self, scope: SymbolId, variable: SymbolId, info: &VariableInfo) -> Resolved {
        let ty = self.table.reference_type(info.ty);
        let funcs = self.funcs(info.ty)?;
        match info.storage {
            Storage::Stack(own) | Storage::Parameter(own) => {
                let Some(frame) = info.frame else {
                    return Err(self.error(DiagnosticKind::Raw("stack variable without a frame".into())));
                };
                if self.frames.is_empty() {
                    return Err(self.error(DiagnosticKind::Raw("no open frame".into())));
                }
                let top = self.frames.len() - 1;
                let slot = self.capture_slot(top, variable, frame, own)?;
                Ok(Node::new(funcs.reference_stack, ty, Vec::new())
                    .with_data(Value::Int(slot as i32))
                    .with_symbol(variable))
            }
            Storage::Global(index) => Ok(Node::new(funcs.reference_global, ty, Vec::new())
                .with_data(Value::Int(index as i32))
                .with_symbol(variable)),
            Storage::Member(_) => {
                let name = self.table.name(variable).to_string();
                let this = self.this_value(scope, &name)?;
                self.field_reference(this, variable, info.ty)
            }
        }
    }

    /// `this` inside a method body.
    fn this_value(&mut self, scope: SymbolId, member: &str) -> Resolved {
        let found = match self.table.lookup_name("this") {
            Some(name) => self.table.lookup(scope, &name),
            None => Default::default(),
        };
        match self.classify(&found) {
            Found::Variable(variable, info) => {
                let reference = self.variable_reference(scope, variable, &info)?;
                self.rvalue(reference)
            }
            _ => Err(self.error(DiagnosticKind::Raw(format!(
                "member \"{}\" used outside a method",
                member
            )))),
        }
    }

    /// `T&` to `field` of the class instance `object`.
    fn field_reference(&mut self, object: Node, field: SymbolId, field_ty: SymbolId) -> Resolved {
        let Some(slot) = self.table.field_slot(object.ty, field) else {
            return Err(self.error(DiagnosticKind::UnresolvedMember {
                member: self.table.name(field).to_string(),
                ty: self.type_name(object.ty),
            }));
        };
        let ty = self.table.reference_type(field_ty);
        Ok(Node::new(self.funcs(field_ty)?.reference_member, ty, vec![object])
            .with_data(Value::Int(slot as i32))
            .with_symbol(field))
    }

    // --- expressions -----------------------------------------------------

    fn constant(&self, literal: &Literal) -> Resolved {
        let p = *self.table.prims();
        let (ty, value) = match literal {
            Literal::Nil => (p.nil, Value::Nil),
            Literal::Bool(b) => (p.bool, Value::Bool(*b)),
            Literal::Char(c) => (p.char, Value::Char(*c)),
            Literal::Int(i) => (p.int, Value::Int(*i)),
            Literal::Int64(i) => (p.int64, Value::Int64(*i)),
            Literal::Float(f) => (p.float, Value::Float(*f)),
            Literal::Double(d) => (p.double, Value::Double(*d)),
            Literal::Str(s) => {
                return Ok(Node::new(object::string_literal, p.string, Vec::new()).with_text(s.clone()));
            }
        };
        Ok(Node::new(self.funcs(ty)?.constant, ty, Vec::new()).with_data(value))
    }

    fn reference(&mut self, scope: SymbolId, name: &str) -> Resolved {
        let found = self.table.lookup_path(scope, name);
        match self.classify(&found) {
            Found::Variable(variable, info) => self.variable_reference(scope, variable, &info),
            Found::Functions => self.function_value(name, &found),
            Found::Class(_) | Found::Type(_) => Err(self.error(DiagnosticKind::Raw(format!(
                "\"{}\" is a type, not a value",
                name
            )))),
            Found::Nothing | Found::Other => {
                Err(self.unresolved(scope, name, DiagnosticKind::UnresolvedReference(name.to_string())))
            }
        }
    }

    fn function_value(&mut self, name: &str, found: &[SymbolId]) -> Resolved {
        if found.len() > 1 {
            return Err(self.error(DiagnosticKind::AmbiguousOverload {
                name: name.to_string(),
                candidates: found.iter().map(|&f| self.signature(f)).collect(),
            }));
        }
        let function = found[0];
        let Some(info) = self.table.function(function) else {
            return Err(self.error(DiagnosticKind::NotCallable(name.to_string())));
        };
        if info.is_method() {
            return Err(self.error(DiagnosticKind::Raw(format!(
                "method \"{}\" cannot be used as a value",
                name
            ))));
        }
        let (result, params) = (info.result, info.params.clone());
        let ty = self.table.function_type(result, &params);
        Ok(Node::new(call::make_closure, ty, Vec::new()).with_symbol(function))
    }

    /// Functions a call of `name` may pick. Plain names gather overloads
    /// from every enclosing scope; dotted names resolve to one scope.
    fn call_candidates(&self, scope: SymbolId, name: &str) -> Overloads {
        if name.contains('.') {
            return self
                .table
                .lookup_path(scope, name)
                .into_iter()
                .filter(|&f| self.table.function(f).is_some())
                .collect();
        }
        match self.table.lookup_name(name) {
            Some(interned) => self.table.lookup_functions(scope, &interned),
            None => Overloads::new(),
        }
    }

    fn is_function_typed(&self, ty: SymbolId) -> bool {
        let ty = self.table.dereferenced(ty);
        matches!(self.table.type_kind(ty), Some(TypeKind::Function { .. }))
    }

    fn call(&mut self, scope: SymbolId, name: &str, args: Vec<Node>) -> Resolved {
        let found = self.table.lookup_path(scope, name);
        match self.classify(&found) {
            Found::Variable(variable, info) if self.is_function_typed(info.ty) => {
                let callee = self.variable_reference(scope, variable, &info)?;
                return self.apply(callee, args);
            }
            Found::Class(class) => return self.new_instance(class, args),
            Found::Type(ty) => {
                let mut args = args;
                return match (args.pop(), args.is_empty()) {
                    (Some(value), true) => self.cast(ty, value),
                    (value, _) => Err(self.error(DiagnosticKind::ArityMismatch {
                        name: name.to_string(),
                        expected: vec![1],
                        actual: args.len() + usize::from(value.is_some()),
                    })),
                };
            }
            Found::Variable(_, info) => {
                // A value that is not a function hides nothing in call position.
                if self.call_candidates(scope, name).is_empty() {
                    return Err(self.error(DiagnosticKind::NotCallable(self.type_name(info.ty))));
                }
            }
            Found::Nothing | Found::Other | Found::Functions => {}
        }
        let found = self.call_candidates(scope, name);
        if found.is_empty() {
            return Err(self.unresolved(
                scope,
                name,
                DiagnosticKind::UnresolvedFunctionCall(name.to_string()),
            ));
        }
        self.call_functions(scope, name, &found, args)
    }

    fn call_functions(&mut self, scope: SymbolId, name: &str, found: &[SymbolId], args: Vec<Node>) -> Resolved {
        let is_method = found
            .iter()
            .any(|&f| self.table.function(f).is_some_and(|i| i.is_method()));
        if is_method {
            let this = self.this_value(scope, name)?;
            return self.member_call(scope, this, name, args);
        }
        let chosen = self.choose(name, found, args)?;
        self.call_node(chosen.function, chosen.args, chosen.result, chosen.swapped)
    }

    fn member_call(&mut self, scope: SymbolId, receiver: Node, name: &str, args: Vec<Node>) -> Resolved {
        let receiver = self.rvalue(receiver)?;
        match self.table.type_kind(receiver.ty) {
            Some(TypeKind::Class(_)) => self.class_call(receiver, name, args),
            Some(TypeKind::Interface(_)) => self.interface_call(receiver, name, args),
            _ => {
                if self.table.lookup_path(scope, name).is_empty() {
                    return Err(self.error(DiagnosticKind::UnresolvedMember {
                        member: name.to_string(),
                        ty: self.type_name(receiver.ty),
                    }));
                }
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(receiver);
                all.extend(args);
                self.call(scope, name, all)
            }
        }
    }

    fn class_call(&mut self, receiver: Node, name: &str, args: Vec<Node>) -> Resolved {
        let class = receiver.ty;
        let unresolved = |this: &Self| {
            this.error(DiagnosticKind::UnresolvedMember {
                member: name.to_string(),
                ty: this.type_name(class),
            })
        };
        let Some(interned) = self.table.lookup_name(name) else {
            return Err(unresolved(self));
        };
        let methods: Vec<(SymbolId, SymbolId)> = self
            .table
            .methods_named(class, &interned)
            .into_iter()
            .filter(|&(m, declaring)| {
                self.table.name(declaring) != self.table.name(m)
                    && self.table.function(m).is_some_and(|f| {
                        f.is_method() && !f.attrs.contains(FunctionAttrs::CONSTRUCTOR)
                    })
            })
            .collect();
        if methods.is_empty() {
            // A field holding a function value.
            if let Some((field, _)) = self.table.field_named(class, &interned) {
                let field_ty = self.table.variable(field).map(|v| v.ty);
                if let Some(field_ty) = field_ty {
                    let callee = self.field_reference(receiver, field, field_ty)?;
                    return self.apply(callee, args);
                }
            }
            return Err(unresolved(self));
        }
        let candidates: Vec<SymbolId> = methods.iter().map(|m| m.0).collect();
        let chosen = self.choose(name, &candidates, args)?;
        let declaring = methods
            .iter()
            .find(|m| m.0 == chosen.function)
            .map_or(class, |m| m.1);
        let Some(offset) = self.table.offset_of(class, declaring) else {
            return Err(unresolved(self));
        };
        let receiver = self.upcast(receiver, declaring, offset);
        let mut all = Vec::with_capacity(chosen.args.len() + 1);
        all.push(receiver);
        all.extend(chosen.args);
        let method_index = self.table.function(chosen.function).and_then(|f| f.method_index);
        match method_index {
            Some(index) => Ok(Node::new(call::call_virtual, chosen.result, all)
                .with_data(Value::Int(index as i32))
                .with_symbol(chosen.function)),
            None => self.call_node(chosen.function, all, chosen.result, false),
        }
    }

    fn interface_call(&mut self, receiver: Node, name: &str, args: Vec<Node>) -> Resolved {
        let iface = receiver.ty;
        let methods: Vec<SymbolId> = self
            .table
            .interface(iface)
            .map(|i| {
                i.methods
                    .iter()
                    .copied()
                    .filter(|&m| self.table.name(m).as_str() == name)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if methods.is_empty() {
            return Err(self.error(DiagnosticKind::UnresolvedMember {
                member: name.to_string(),
                ty: self.type_name(iface),
            }));
        }
        let chosen = self.choose(name, &methods, args)?;
        let position = self
            .table
            .interface(iface)
            .and_then(|i| i.methods.iter().position(|&m| m == chosen.function))
            .unwrap_or_default();
        let mut all = Vec::with_capacity(chosen.args.len() + 1);
        all.push(receiver);
        all.extend(chosen.args);
        Ok(Node::new(call::call_interface, chosen.result, all)
            .with_symbol(iface)
            .with_data(Value::Int(position as i32)))
    }

    fn member_reference(&mut self, scope: SymbolId, receiver: Node, name: &str) -> Resolved {
        let receiver = self.rvalue(receiver)?;
        let class = receiver.ty;
        if self.table.class(class).is_some() {
            let field = self
                .table
                .lookup_name(name)
                .and_then(|n| self.table.field_named(class, &n));
            if let Some((field, _)) = field {
                let field_ty = self.table.variable(field).map(|v| v.ty);
                if let Some(field_ty) = field_ty {
                    return self.field_reference(receiver, field, field_ty);
                }
            }
            return Err(self.error(DiagnosticKind::UnresolvedMember {
                member: name.to_string(),
                ty: self.type_name(class),
            }));
        }
        // `xs.size` reads as `size(xs)`.
        if self.table.lookup_path(scope, name).is_empty() {
            return Err(self.error(DiagnosticKind::UnresolvedMember {
                member: name.to_string(),
                ty: self.type_name(class),
            }));
        }
        self.call(scope, name, vec![receiver])
    }

    fn apply(&mut self, callee: Node, args: Vec<Node>) -> Resolved {
        let callee = self.rvalue(callee)?;
        let (result, params) = match self.table.type_kind(callee.ty) {
            Some(TypeKind::Function { result, params }) => (*result, params.clone()),
            _ => return Err(self.error(DiagnosticKind::NotCallable(self.type_name(callee.ty)))),
        };
        if params.len() != args.len() {
            return Err(self.error(DiagnosticKind::ArityMismatch {
                name: self.type_name(callee.ty),
                expected: vec![params.len()],
                actual: args.len(),
            }));
        }
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(callee);
        for (arg, &param) in args.into_iter().zip(params.iter()) {
            all.push(self.coerce(arg, param)?);
        }
        Ok(Node::new(call::apply, result, all))
    }

    /// A function of the open parameters of `callee`, the others fixed to
    /// `bound` in order.
    fn partial(&mut self, callee: Node, holes: &[bool], bound: Vec<Node>) -> Resolved {
        let callee = self.rvalue(callee)?;
        let (result, params) = match self.table.type_kind(callee.ty) {
            Some(TypeKind::Function { result, params }) => (*result, params.clone()),
            _ => return Err(self.error(DiagnosticKind::NotCallable(self.type_name(callee.ty)))),
        };
        if params.len() != holes.len() {
            return Err(self.error(DiagnosticKind::ArityMismatch {
                name: self.type_name(callee.ty),
                expected: vec![params.len()],
                actual: holes.len(),
            }));
        }
        if holes.len() > 31 {
            return Err(self.error(DiagnosticKind::Raw(format!(
                "partial application of {} parameters; at most 31 are supported",
                holes.len()
            ))));
        }
        let mut mask = 0u32;
        let mut open = Vec::new();
        let mut all = Vec::with_capacity(bound.len() + 1);
        all.push(callee);
        let mut bound = bound.into_iter();
        for (i, (&hole, &param)) in holes.iter().zip(params.iter()).enumerate() {
            if hole {
                mask |= 1 << i;
                open.push(param);
                continue;
            }
            let Some(arg) = bound.next() else {
                return Err(self.error(DiagnosticKind::Raw(
                    "partial application is missing an argument".into(),
                )));
            };
            all.push(self.coerce(arg, param)?);
        }
        let ty = self.table.function_type(result, &open);
        Ok(Node::new(call::partial_apply, ty, all).with_data(Value::Int(mask as i32)))
    }

    fn assign(&mut self, target: Node, value: Node) -> Resolved {
        let Some(TypeKind::Reference(ty)) = self.table.type_kind(target.ty) else {
            return Err(self.error(DiagnosticKind::NotAReference(self.type_name(target.ty))));
        };
        let ty = *ty;
        if !self.coercible(value.ty, ty) {
            return Err(self.error(DiagnosticKind::CannotAssign {
                from: self.type_name(value.ty),
                to: self.type_name(ty),
            }));
        }
        let value = self.coerce(value, ty)?;
        Ok(Node::new(self.funcs(ty)?.assign, ty, vec![target, value]))
    }

    fn cast(&mut self, target: SymbolId, value: Node) -> Resolved {
        let value = self.rvalue(value)?;
        let from = value.ty;
        if from == target {
            return Ok(value);
        }
        if self.coercible(from, target) {
            return self.coerce(value, target);
        }
        let source_is_pointer = matches!(
            self.table.type_kind(from),
            Some(TypeKind::Class(_) | TypeKind::Interface(_))
        );
        if source_is_pointer && self.table.class(target).is_some() {
            return Ok(Node::new(object::dynamic_cast, target, vec![value]).with_symbol(target));
        }
        match self.explicit_cast(from, target) {
            Some(cast) => self.call_node(cast, vec![value], target, false),
            None => Err(self.error(DiagnosticKind::CannotCast {
                from: self.type_name(from),
                to: self.type_name(target),
            })),
        }
    }

    fn list(&mut self, elements: Vec<Node>) -> Resolved {
        let nil = self.table.prims().nil;
        if elements.is_empty() {
            return Ok(Node::new(self.funcs(nil)?.constant, nil, Vec::new()).with_data(Value::Nil));
        }
        let mut loaded = Vec::with_capacity(elements.len());
        for e in elements {
            loaded.push(self.rvalue(e)?);
        }
        let mut element = loaded[0].ty;
        for e in &loaded[1..] {
            if self.coercible(e.ty, element) {
                continue;
            }
            if self.coercible(element, e.ty) {
                element = e.ty;
                continue;
            }
            return Err(self.error(DiagnosticKind::CannotInferType(format!(
                "a list of {} and {}",
                self.type_name(element),
                self.type_name(e.ty)
            ))));
        }
        let mut converted = Vec::with_capacity(loaded.len());
        for e in loaded {
            converted.push(self.coerce(e, element)?);
        }
        let ty = self.table.list_type(element);
        Ok(Node::new(object::list_constructor, ty, converted))
    }

    fn collection_element(&self, collection: &Node) -> Resolved<SymbolId> {
        let ty = self.table.dereferenced(collection.ty);
        self.table
            .list_element(ty)
            .ok_or_else(|| self.error(DiagnosticKind::NotACollection(self.type_name(ty))))
    }

    // --- statements ------------------------------------------------------

    fn stack_declaration(
        &mut self,
        scope: SymbolId,
        name: &str,
        declared: Option<&str>,
        init: Option<Node>,
    ) -> Resolved {
        let p = *self.table.prims();
        let ty = match (declared, &init) {
            (Some(text), _) => self.parse_type(scope, text)?,
            (None, Some(value)) => {
                let ty = self.table.dereferenced(value.ty);
                if ty == p.nil || ty == p.void {
                    return Err(self.error(DiagnosticKind::CannotInferType(format!("\"{}\"", name))));
                }
                ty
            }
            (None, None) => {
                return Err(self.error(DiagnosticKind::CannotInferType(format!("\"{}\"", name))));
            }
        };
        let funcs = self.funcs(ty)?;
        let value = match init {
            Some(value) => {
                if !self.coercible(value.ty, ty) {
                    return Err(self.error(DiagnosticKind::CannotAssign {
                        from: self.type_name(value.ty),
                        to: self.type_name(ty),
                    }));
                }
                self.coerce(value, ty)?
            }
            None => Node::new(funcs.constant, ty, Vec::new()).with_data(funcs.rep.zero()),
        };
        let (variable, slot) = self.declare_local(scope, name, ty)?;
        let reference = self.table.reference_type(ty);
        let target = Node::new(funcs.reference_stack, reference, Vec::new())
            .with_data(Value::Int(slot as i32))
            .with_symbol(variable);
        Ok(Node::new(funcs.assign, ty, vec![target, value]))
    }

    fn condition(&mut self, cond: Node) -> Resolved {
        let bool_ty = self.table.prims().bool;
        if !self.coercible(cond.ty, bool_ty) {
            return Err(self.error(DiagnosticKind::ConditionNotBool(self.type_name(cond.ty))));
        }
        self.coerce(cond, bool_ty)
    }

    fn if_else(&mut self, children: Vec<Node>) -> Resolved {
        let void = self.table.prims().void;
        let mut children = children.into_iter();
        let (Some(cond), Some(then)) = (children.next(), children.next()) else {
            return Err(self.error(DiagnosticKind::Raw("if without a branch".into())));
        };
        let cond = self.condition(cond)?;
        let otherwise = children.next();
        let ty = match &otherwise {
            Some(o) if o.ty == then.ty => then.ty,
            _ => void,
        };
        let mut args = vec![cond, then];
        args.extend(otherwise);
        Ok(Node::new(control::if_else, ty, args))
    }

    fn end_loop(&mut self) -> Resolved<()> {
        let context = self.frame_mut()?;
        context.loop_depth = context.loop_depth.saturating_sub(1);
        Ok(())
    }

    fn ret(&mut self, value: Option<Node>) -> Resolved {
        let void = self.table.prims().void;
        let Some(context) = self.frames.last() else {
            return Err(self.error(DiagnosticKind::ReturnOutsideFunction));
        };
        if context.function.is_none() {
            return Err(self.error(DiagnosticKind::ReturnOutsideFunction));
        }
        let result = context.result;
        let mismatch = |this: &Self, actual: SymbolId| {
            this.error(DiagnosticKind::ReturnTypeMismatch {
                expected: this.type_name(result),
                actual: this.type_name(actual),
            })
        };
        match value {
            None if result == void => Ok(Node::new(control::return_void, void, Vec::new())),
            None => Err(mismatch(self, void)),
            Some(value) if result == void => Ok(Node::new(
                control::block,
                void,
                vec![value, Node::new(control::return_void, void, Vec::new())],
            )),
            Some(value) => {
                if !self.coercible(value.ty, result) {
                    return Err(mismatch(self, value.ty));
                }
                let value = self.coerce(value, result)?;
                Ok(Node::new(self.funcs(result)?.function_return, void, vec![value]))
            }
        }
    }

    fn loop_exit(&mut self, keyword: &'static str, func: crate::node::NodeFunc) -> Resolved {
        let void = self.table.prims().void;
        let inside = self.frames.last().is_some_and(|c| c.loop_depth > 0);
        if !inside {
            return Err(self.error(DiagnosticKind::ControlFlowOutsideLoop(keyword)));
        }
        Ok(Node::new(func, void, Vec::new()))
    }

    fn new_instance(&mut self, class: SymbolId, args: Vec<Node>) -> Resolved {
        if self.table.class(class).is_none() {
            return Err(self.error(DiagnosticKind::NotAClass(self.type_name(class))));
        }
        self.table
            .freeze(class)
            .map_err(|e| self.registration_error(e))?;
        let name = self.table.name(class).clone();
        let constructors: Vec<SymbolId> = self
            .table
            .members(class, &name)
            .iter()
            .copied()
            .filter(|&f| self.table.function(f).is_some())
            .collect();
        if constructors.is_empty() {
            if !args.is_empty() {
                return Err(self.error(DiagnosticKind::ArityMismatch {
                    name: name.to_string(),
                    expected: vec![0],
                    actual: args.len(),
                }));
            }
            return Ok(Node::new(object::new_instance, class, Vec::new()).with_symbol(class));
        }
        let chosen = self.choose(name.as_str(), &constructors, args)?;
        Ok(Node::new(object::new_instance, class, chosen.args)
            .with_symbol(class)
            .with_data(Value::Symbol(chosen.function)))
    }

    fn try_catch(&mut self, ast: &Ast, var: Option<&(String, String)>, body: Node, handler: Node) -> Resolved {
        let p = *self.table.prims();
        let (mode, ty, slot) = match var {
            None => (CatchMode::All, None, -1),
            Some((name, _)) => {
                let scope = ast.args.get(1).map_or(ast.scope.symbol, |h| h.scope.symbol);
                let (_, info, slot) = self.local_named(scope, name)?;
                let mode = if info.ty == p.string {
                    CatchMode::Message
                } else {
                    CatchMode::Typed
                };
                (mode, Some(info.ty), slot as i32)
            }
        };
        let handler_ty = handler.ty;
        let mut handler = Node::new(control::handler, handler_ty, vec![self.const_int(slot)?, handler])
            .with_data(Value::Int(mode.encode()));
        handler.symbol = ty;
        Ok(Node::new(control::try_catch, p.void, vec![body, handler]))
    }

    fn open_lambda(&mut self, function: SymbolId) -> Resolved<()> {
        let Some(info) = self.table.function(function) else {
            let name = self.table.qualified_name(function);
            return Err(self.error(DiagnosticKind::NotCallable(name)));
        };
        let context = FrameContext::new(
            info.frame,
            Some(function),
            true,
            info.result,
            info.params.len() as u32,
        );
        self.frames.push(context);
        Ok(())
    }

    fn close_lambda(&mut self, scope: SymbolId, function: SymbolId, body: Node) -> Resolved {
        let context = self.pop_frame()?;
        let captured: Vec<SymbolId> = context.captures.iter().map(|c| c.variable).collect();
        let code = self.finish_function(body, context)?;
        self.bodies.push((function, code));

        // The closure loads its captured values in the enclosing frame.
        let mut loads = Vec::with_capacity(captured.len());
        for variable in captured {
            let Some(info) = self.table.variable(variable).cloned() else {
                continue;
            };
            let reference = self.variable_reference(scope, variable, &info)?;
            loads.push(self.rvalue(reference)?);
        }
        let (result, params) = match self.table.function(function) {
            Some(info) => (info.result, info.params.clone()),
            None => return Err(self.error(DiagnosticKind::NotCallable(String::new()))),
        };
        let ty = self.table.function_type(result, &params);
        Ok(Node::new(call::make_closure, ty, loads).with_symbol(function))
    }
}

fn two(children: Vec<Node>) -> Option<(Node, Node)> {
    let mut it = children.into_iter();
    Some((it.next()?, it.next()?))
}

impl NodePatch for NodeAssembler<'_> {
    fn before_child(&mut self, ast: &Ast, index: usize, done: &[Node]) -> Resolved<()> {
        self.pos = ast.pos.clone();
        match (&ast.kind, index) {
            (AstKind::While, 1) => self.frame_mut()?.loop_depth += 1,
            (AstKind::ForEach(var), 1) => {
                let Some(collection) = done.first() else {
                    return Err(self.error(DiagnosticKind::Raw("for_each without a collection".into())));
                };
                let element = self.collection_element(collection)?;
                let scope = ast.args[1].scope.symbol;
                self.declare_local(scope, var, element)?;
                self.frame_mut()?.loop_depth += 1;
            }
            (AstKind::Try(Some((name, ty))), 1) => {
                let ty = self.parse_type(ast.scope.symbol, ty)?;
                let scope = ast.args[1].scope.symbol;
                self.declare_local(scope, name, ty)?;
            }
            (AstKind::Lambda(function), 0) => self.open_lambda(*function)?,
            _ => {}
        }
        Ok(())
    }

    fn resolve(&mut self, ast: &Ast, children: Vec<Node>) -> Resolved {
        self.pos = ast.pos.clone();
        let scope = ast.scope.symbol;
        let malformed = |this: &Self| {
            this.error(DiagnosticKind::Raw(format!("malformed {:?} node", ast.kind)))
        };
        let void = self.table.prims().void;
        match &ast.kind {
            AstKind::Constant(literal) => self.constant(literal),
            AstKind::Reference(name) => self.reference(scope, name),
            AstKind::Call(name) => self.call(scope, name, children),
            AstKind::Index => self.call(scope, "[]", children),
            AstKind::MemberCall(name) => {
                let mut children = children.into_iter();
                let Some(receiver) = children.next() else {
                    return Err(malformed(self));
                };
                self.member_call(scope, receiver, name, children.collect())
            }
            AstKind::MemberReference(name) => {
                let Some(receiver) = children.into_iter().next() else {
                    return Err(malformed(self));
                };
                self.member_reference(scope, receiver, name)
            }
            AstKind::Apply => {
                let mut children = children.into_iter();
                let Some(callee) = children.next() else {
                    return Err(malformed(self));
                };
                self.apply(callee, children.collect())
            }
            AstKind::Partial(holes) => {
                let mut children = children.into_iter();
                let Some(callee) = children.next() else {
                    return Err(malformed(self));
                };
                self.partial(callee, holes, children.collect())
            }
            AstKind::Assign => {
                let (target, value) = two(children).ok_or_else(|| malformed(self))?;
                self.assign(target, value)
            }
            AstKind::Cast(ty) => {
                let target = self.parse_type(scope, ty)?;
                let value = children.into_iter().next().ok_or_else(|| malformed(self))?;
                self.cast(target, value)
            }
            AstKind::Dereference => {
                let value = children.into_iter().next().ok_or_else(|| malformed(self))?;
                if !self.table.is_reference(value.ty) {
                    return Err(self.error(DiagnosticKind::NotAReference(self.type_name(value.ty))));
                }
                self.rvalue(value)
            }
            AstKind::ListConstructor => self.list(children),
            AstKind::ForEach(var) => {
                self.end_loop()?;
                let (collection, body) = two(children).ok_or_else(|| malformed(self))?;
                let (_, _, slot) = self.local_named(ast.args[1].scope.symbol, var)?;
                let collection = self.rvalue(collection)?;
                Ok(Node::new(control::for_each_list, void, vec![collection, body])
                    .with_data(Value::Int(slot as i32)))
            }
            AstKind::StackDeclaration { name, ty } => {
                self.stack_declaration(scope, name, ty.as_deref(), children.into_iter().next())
            }
            AstKind::Block => {
                let ty = children.last().map_or(void, |c| c.ty);
                Ok(Node::new(control::block, ty, children))
            }
            AstKind::If => self.if_else(children),
            AstKind::While => {
                self.end_loop()?;
                let (cond, body) = two(children).ok_or_else(|| malformed(self))?;
                let cond = self.condition(cond)?;
                Ok(Node::new(control::while_loop, void, vec![cond, body]))
            }
            AstKind::Return => self.ret(children.into_iter().next()),
            AstKind::Break => self.loop_exit("break", control::break_loop),
            AstKind::Continue => self.loop_exit("continue", control::continue_loop),
            AstKind::New(class) => {
                let class = self.parse_type(scope, class)?;
                self.new_instance(class, children)
            }
            AstKind::Throw => {
                let value = children.into_iter().next().ok_or_else(|| malformed(self))?;
                let value = self.rvalue(value)?;
                Ok(Node::new(control::throw, void, vec![value]))
            }
            AstKind::Try(var) => {
                let (body, handler) = two(children).ok_or_else(|| malformed(self))?;
                self.try_catch(ast, var.as_ref(), body, handler)
            }
            AstKind::Lambda(function) => {
                let body = children.into_iter().next().ok_or_else(|| malformed(self))?;
                self.close_lambda(scope, *function, body)
            }
        }
    }
}
