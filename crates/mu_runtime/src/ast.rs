//! Unresolved syntax trees and the builder an external parser uses to
//! produce them.
//!
//! Every `Ast` records the lexical scope it was built in and its source
//! position. Names inside it stay textual until the unit is assembled.

use crate::errors::RegistrationError;
use crate::registration::parse_type;
use crate::symbols::{
    FunctionAttrs, FunctionBody, FunctionInfo, Storage, SymbolKind, SymbolTable, VariableInfo,
};
use mu_core::SymbolId;
use mu_syntax::SourcePos;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

/// The lexical context an `Ast` was built in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeState {
    /// Innermost scope symbol: a module, block scope, function or class.
    pub symbol: SymbolId,
    /// Frame owning stack variables declared in this scope.
    pub frame: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Char(char),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AstKind {
    Constant(Literal),
    /// A possibly dotted name.
    Reference(String),
    /// Free-function call; `args` are the call arguments.
    Call(String),
    /// `args[0]` is the receiver.
    MemberCall(String),
    /// `args[0]` is the receiver.
    MemberReference(String),
    /// Call of a function value: `args[0]` is the callee.
    Apply,
    /// `args[0] = args[1]`.
    Assign,
    Cast(String),
    Dereference,
    ListConstructor,
    /// `args[0]` is the collection, `args[1]` the body. The loop variable is
    /// declared in the body's scope.
    ForEach(String),
    /// Optional initializer in `args[0]`. Without a type the variable takes
    /// the initializer's type.
    StackDeclaration { name: String, ty: Option<String> },
    Block,
    /// `args` are condition, then-branch and optional else-branch.
    If,
    While,
    /// Optional value in `args[0]`.
    Return,
    Break,
    Continue,
    New(String),
    Throw,
    /// `args[0]` is the guarded body, `args[1]` the handler. A handler
    /// variable `(name, type)` is declared in the handler's scope.
    Try(Option<(String, String)>),
    /// A lambda whose body is `args[0]`.
    Lambda(SymbolId),
    /// `args[0][args[1]]`.
    Index,
    /// Partial application of the function value in `args[0]`. Entry `i`
    /// is true where parameter `i` is left open; the fixed arguments follow
    /// the callee in `args`.
    Partial(Vec<bool>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ast {
    pub kind: AstKind,
    pub args: Vec<Ast>,
    pub scope: ScopeState,
    pub pos: SourcePos,
}

impl Ast {
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            AstKind::Reference(n)
            | AstKind::Call(n)
            | AstKind::MemberCall(n)
            | AstKind::MemberReference(n)
            | AstKind::ForEach(n)
            | AstKind::New(n) => Some(n),
            AstKind::StackDeclaration { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Everything one builder session produced.
#[derive(Debug, Default)]
pub struct AstUnit {
    /// Bodies of named functions and methods declared by the builder.
    pub functions: Vec<(SymbolId, Ast)>,
    /// Top-level statements, evaluated in order.
    pub top: Vec<Ast>,
    /// Frame of the top-level statements.
    pub frame: u32,
    /// Functions, classes and globals the unit added to its module, taken
    /// back if the unit fails to resolve.
    pub declared: Vec<SymbolId>,
}

struct OpenFunction {
    function: SymbolId,
    scope_depth: usize,
}

/// Builds unresolved trees against a context's symbol table.
///
/// The builder holds the table's write lock for its whole life: functions,
/// lambdas and classes it declares become visible to the unit immediately.
/// Do not evaluate on the same context while a builder is alive. A builder
/// dropped without `finish` takes its module-level declarations back.
pub struct AstBuilder<'a> {
    table: RwLockWriteGuard<'a, SymbolTable>,
    module: SymbolId,
    scopes: Vec<ScopeState>,
    pos: SourcePos,
    functions: Vec<(SymbolId, Ast)>,
    open: Vec<OpenFunction>,
    classes: Vec<SymbolId>,
    declared: Vec<SymbolId>,
    frame: u32,
}

impl<'a> AstBuilder<'a> {
    pub(crate) fn new(mut table: RwLockWriteGuard<'a, SymbolTable>, module: SymbolId) -> Self {
        let frame = table.new_frame();
        let unit_scope = table.add_scope(module);
        Self {
            table,
            module,
            scopes: vec![ScopeState {
                symbol: unit_scope,
                frame,
            }],
            pos: SourcePos::default(),
            functions: Vec::new(),
            open: Vec::new(),
            classes: Vec::new(),
            declared: Vec::new(),
            frame,
        }
    }

    pub fn table(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    /// Sets the position recorded on nodes built from now on.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.pos.line = line;
        self.pos.column = column;
        self
    }

    pub fn in_file(&mut self, file: &str) -> &mut Self {
        self.pos.file = Some(Arc::from(file));
        self
    }

    pub fn scope(&self) -> ScopeState {
        self.scopes.last().copied().unwrap_or(ScopeState {
            symbol: self.table.root(),
            frame: self.frame,
        })
    }

    /// Opens a block scope nested in the current one.
    pub fn push_scope(&mut self) -> ScopeState {
        let outer = self.scope();
        let symbol = self.table.add_scope(outer.symbol);
        let state = ScopeState {
            symbol,
            frame: outer.frame,
        };
        self.scopes.push(state);
        state
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Where named functions and classes go: the module at the top level of
    /// the unit, so later units see them, else the current scope.
    fn declaration_scope(&self) -> SymbolId {
        if self.scopes.len() <= 1 {
            self.module
        } else {
            self.scope().symbol
        }
    }

    fn node(&self, kind: AstKind, args: Vec<Ast>) -> Ast {
        Ast {
            kind,
            args,
            scope: self.scope(),
            pos: self.pos.clone(),
        }
    }

    // --- expressions -------------------------------------------------------

    pub fn literal(&self, literal: Literal) -> Ast {
        self.node(AstKind::Constant(literal), Vec::new())
    }

    pub fn int(&self, value: i32) -> Ast {
        self.literal(Literal::Int(value))
    }

    pub fn float(&self, value: f32) -> Ast {
        self.literal(Literal::Float(value))
    }

    pub fn bool(&self, value: bool) -> Ast {
        self.literal(Literal::Bool(value))
    }

    pub fn nil(&self) -> Ast {
        self.literal(Literal::Nil)
    }

    pub fn string(&self, text: &str) -> Ast {
        self.literal(Literal::Str(Arc::from(text)))
    }

    pub fn reference(&self, name: &str) -> Ast {
        self.node(AstKind::Reference(name.to_string()), Vec::new())
    }

    pub fn call(&self, name: &str, args: Vec<Ast>) -> Ast {
        self.node(AstKind::Call(name.to_string()), args)
    }

    pub fn member_call(&self, receiver: Ast, name: &str, args: Vec<Ast>) -> Ast {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(receiver);
        all.extend(args);
        self.node(AstKind::MemberCall(name.to_string()), all)
    }

    pub fn member(&self, receiver: Ast, name: &str) -> Ast {
        self.node(AstKind::MemberReference(name.to_string()), vec![receiver])
    }

    pub fn apply(&self, callee: Ast, args: Vec<Ast>) -> Ast {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(callee);
        all.extend(args);
        self.node(AstKind::Apply, all)
    }

    /// Fixes the `Some` arguments of `callee`, yielding a function of the
    /// `None` ones.
    pub fn partial(&self, callee: Ast, args: Vec<Option<Ast>>) -> Ast {
        let holes = args.iter().map(Option::is_none).collect();
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(callee);
        all.extend(args.into_iter().flatten());
        self.node(AstKind::Partial(holes), all)
    }

    pub fn assign(&self, target: Ast, value: Ast) -> Ast {
        self.node(AstKind::Assign, vec![target, value])
    }

    pub fn cast(&self, ty: &str, value: Ast) -> Ast {
        self.node(AstKind::Cast(ty.to_string()), vec![value])
    }

    pub fn dereference(&self, value: Ast) -> Ast {
        self.node(AstKind::Dereference, vec![value])
    }

    pub fn list(&self, elements: Vec<Ast>) -> Ast {
        self.node(AstKind::ListConstructor, elements)
    }

    pub fn index(&self, collection: Ast, index: Ast) -> Ast {
        self.node(AstKind::Index, vec![collection, index])
    }

    pub fn new_object(&self, class: &str, args: Vec<Ast>) -> Ast {
        self.node(AstKind::New(class.to_string()), args)
    }

    // --- statements --------------------------------------------------------

    pub fn declare(&self, name: &str, ty: Option<&str>, init: Option<Ast>) -> Ast {
        self.node(
            AstKind::StackDeclaration {
                name: name.to_string(),
                ty: ty.map(str::to_string),
            },
            init.into_iter().collect(),
        )
    }

    pub fn block(&self, statements: Vec<Ast>) -> Ast {
        self.node(AstKind::Block, statements)
    }

    pub fn if_else(&self, cond: Ast, then: Ast, otherwise: Option<Ast>) -> Ast {
        let mut args = vec![cond, then];
        args.extend(otherwise);
        self.node(AstKind::If, args)
    }

    pub fn while_loop(&self, cond: Ast, body: Ast) -> Ast {
        self.node(AstKind::While, vec![cond, body])
    }

    /// `body` should be built inside its own scope (`push_scope`), which
    /// receives the loop variable.
    pub fn for_each(&self, var: &str, collection: Ast, body: Ast) -> Ast {
        self.node(AstKind::ForEach(var.to_string()), vec![collection, body])
    }

    pub fn ret(&self, value: Option<Ast>) -> Ast {
        self.node(AstKind::Return, value.into_iter().collect())
    }

    pub fn brk(&self) -> Ast {
        self.node(AstKind::Break, Vec::new())
    }

    pub fn cont(&self) -> Ast {
        self.node(AstKind::Continue, Vec::new())
    }

    pub fn throw(&self, value: Ast) -> Ast {
        self.node(AstKind::Throw, vec![value])
    }

    /// A guarded body. With `var = Some((name, type))` the handler should be
    /// built inside its own scope, which receives the variable.
    pub fn try_catch(&self, body: Ast, var: Option<(&str, &str)>, handler: Ast) -> Ast {
        let var = var.map(|(n, t)| (n.to_string(), t.to_string()));
        self.node(AstKind::Try(var), vec![body, handler])
    }

    // --- declarations ------------------------------------------------------

    fn declare_params(
        &mut self,
        function: SymbolId,
        frame: u32,
        names: &[&str],
        types: &[SymbolId],
    ) -> Result<(), RegistrationError> {
        for (i, (name, &ty)) in names.iter().zip(types).enumerate() {
            let name = self.table.intern(name);
            self.table.add(
                function,
                name,
                SymbolKind::Variable(VariableInfo {
                    ty,
                    storage: Storage::Parameter(i as u32),
                    frame: Some(frame),
                }),
            )?;
        }
        Ok(())
    }

    fn open_function(
        &mut self,
        scope: SymbolId,
        name: &str,
        result: &str,
        params: &[(&str, &str)],
        this: Option<SymbolId>,
        attrs: FunctionAttrs,
    ) -> Result<SymbolId, RegistrationError> {
        let lookup_scope = self.scope().symbol;
        let result = parse_type(&mut self.table, lookup_scope, result)?;
        let mut names = Vec::with_capacity(params.len() + 1);
        let mut types = Vec::with_capacity(params.len() + 1);
        if let Some(class) = this {
            names.push("this");
            types.push(class);
        }
        for (n, t) in params {
            names.push(*n);
            types.push(parse_type(&mut self.table, lookup_scope, t)?);
        }
        let mut attrs = attrs;
        if let Some(class) = this {
            attrs = attrs | FunctionAttrs::METHOD;
            if self.table.name(class).as_str() == name {
                attrs = attrs | FunctionAttrs::CONSTRUCTOR;
            }
        }
        let frame = self.table.new_frame();
        let fname = self.table.intern(name);
        let function = self.table.add(
            scope,
            fname,
            SymbolKind::Function(FunctionInfo {
                result,
                params: types.clone(),
                attrs,
                body: FunctionBody::Pending,
                method_index: None,
                frame,
            }),
        )?;
        self.declare_params(function, frame, &names, &types)?;
        self.open.push(OpenFunction {
            function,
            scope_depth: self.scopes.len(),
        });
        self.scopes.push(ScopeState {
            symbol: function,
            frame,
        });
        Ok(function)
    }

    fn close_function(&mut self) -> Option<SymbolId> {
        let open = self.open.pop()?;
        self.scopes.truncate(open.scope_depth);
        Some(open.function)
    }

    /// Declares a named function in the current scope; the body built next
    /// is passed to `end_function`.
    pub fn begin_function(
        &mut self,
        name: &str,
        result: &str,
        params: &[(&str, &str)],
    ) -> Result<SymbolId, RegistrationError> {
        let scope = self.declaration_scope();
        let function =
            self.open_function(scope, name, result, params, None, FunctionAttrs::NONE)?;
        if scope == self.module {
            self.declared.push(function);
        }
        Ok(function)
    }

    pub fn end_function(&mut self, body: Ast) -> Option<SymbolId> {
        let function = self.close_function()?;
        self.functions.push((function, body));
        Some(function)
    }

    pub fn begin_lambda(
        &mut self,
        result: &str,
        params: &[(&str, &str)],
    ) -> Result<SymbolId, RegistrationError> {
        let scope = self.scope().symbol;
        self.open_function(scope, "", result, params, None, FunctionAttrs::LAMBDA)
    }

    /// Closes the innermost lambda and returns the expression creating it.
    pub fn end_lambda(&mut self, body: Ast) -> Option<Ast> {
        let function = self.close_function()?;
        Some(self.node(AstKind::Lambda(function), vec![body]))
    }

    pub fn begin_class(&mut self, name: &str, supers: &[&str]) -> Result<SymbolId, RegistrationError> {
        let lookup_scope = self.scope().symbol;
        let mut resolved = Vec::with_capacity(supers.len());
        for s in supers {
            resolved.push(parse_type(&mut self.table, lookup_scope, s)?);
        }
        let scope = self.declaration_scope();
        let class = self.table.add_class(scope, name, resolved)?;
        if scope == self.module {
            self.declared.push(class);
        }
        let frame = self.scope().frame;
        self.classes.push(class);
        self.scopes.push(ScopeState {
            symbol: class,
            frame,
        });
        Ok(class)
    }

    pub fn field(&mut self, name: &str, ty: &str) -> Result<SymbolId, RegistrationError> {
        let class = self
            .classes
            .last()
            .copied()
            .ok_or_else(|| RegistrationError::NotAClass(name.to_string()))?;
        crate::registration::add_field(&mut self.table, class, name, ty)
    }

    /// Declares a method of the innermost open class; finish it with
    /// `end_function`.
    pub fn begin_method(
        &mut self,
        name: &str,
        result: &str,
        params: &[(&str, &str)],
    ) -> Result<SymbolId, RegistrationError> {
        let class = self
            .classes
            .last()
            .copied()
            .ok_or_else(|| RegistrationError::NotAClass(name.to_string()))?;
        self.open_function(class, name, result, params, Some(class), FunctionAttrs::METHOD)
    }

    /// Freezes the innermost open class.
    pub fn end_class(&mut self) -> Result<SymbolId, RegistrationError> {
        let class = self
            .classes
            .pop()
            .ok_or_else(|| RegistrationError::NotAClass(String::new()))?;
        if let Some(i) = self.scopes.iter().rposition(|s| s.symbol == class) {
            self.scopes.truncate(i);
        }
        self.table.freeze(class)?;
        Ok(class)
    }

    pub fn global(&mut self, name: &str, ty: &str) -> Result<SymbolId, RegistrationError> {
        let current = self.scope().symbol;
        let scope = self.table.module_of(current);
        let ty = parse_type(&mut self.table, current, ty)?;
        let global = self.table.add_global(scope, name, ty)?;
        self.declared.push(global);
        Ok(global)
    }

    pub fn finish(mut self, top: Vec<Ast>) -> AstUnit {
        if !self.open.is_empty() || !self.classes.is_empty() {
            log::warn!(
                "builder finished with {} open functions and {} open classes",
                self.open.len(),
                self.classes.len()
            );
        }
        AstUnit {
            functions: std::mem::take(&mut self.functions),
            top,
            frame: self.frame,
            declared: std::mem::take(&mut self.declared),
        }
    }
}

impl Drop for AstBuilder<'_> {
    fn drop(&mut self) {
        if !self.declared.is_empty() {
            log::debug!(
                "builder dropped unfinished; retracting {} declarations",
                self.declared.len()
            );
            self.table.retract(&self.declared);
        }
    }
}
