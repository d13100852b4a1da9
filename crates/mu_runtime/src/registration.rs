//! Declarations through which host code extends the type system.
//!
//! Types are named with a small syntax: `int`, `[int]` (list), `int&`
//! (reference), `'a` (type variable), `vector float[3]`, `(int;float,bool)`
//! (function returning `int`) and dotted qualified names.

use crate::errors::{InternalError, RegistrationError};
use crate::node::{EvalResult, NodeFunc};
use crate::symbols::{
    FunctionAttrs, FunctionBody, FunctionInfo, NativeFunc, Storage, SymbolKind, SymbolTable,
    VariableInfo,
};
use crate::thread::Thread;
use mu_core::{SymbolId, Value};

#[derive(Clone)]
pub enum DeclBody {
    Native(NativeFunc),
    Inline(NodeFunc),
    Abstract,
}

#[derive(Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub result: String,
    pub params: Vec<String>,
    pub attrs: FunctionAttrs,
    pub body: DeclBody,
}

impl FunctionDecl {
    pub fn native(name: &str, func: NativeFunc, result: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            result: result.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            attrs: FunctionAttrs::NONE,
            body: DeclBody::Native(func),
        }
    }

    /// A function whose call nodes evaluate through `func` directly, with
    /// unevaluated arguments.
    pub fn inline(name: &str, func: NodeFunc, result: &str, params: &[&str]) -> Self {
        Self {
            body: DeclBody::Inline(func),
            ..Self::native(name, placeholder_native, result, params)
        }
    }

    /// A member function; `this` is added as the first parameter.
    pub fn method(name: &str, func: NativeFunc, result: &str, params: &[&str]) -> Self {
        Self::native(name, func, result, params).with_attrs(FunctionAttrs::METHOD)
    }

    pub fn abstract_method(name: &str, result: &str, params: &[&str]) -> Self {
        Self {
            body: DeclBody::Abstract,
            ..Self::native(name, placeholder_native, result, params)
        }
        .with_attrs(FunctionAttrs::METHOD | FunctionAttrs::ABSTRACT)
    }

    pub fn with_attrs(mut self, attrs: FunctionAttrs) -> Self {
        self.attrs = self.attrs | attrs;
        self
    }
}

fn placeholder_native(_: &mut Thread, _: &[Value]) -> EvalResult {
    Err(InternalError::MissingBody(String::new()).into())
}

#[derive(Clone, Default)]
pub struct ClassDecl {
    pub name: String,
    pub supers: Vec<String>,
    pub fields: Vec<(String, String)>,
    pub methods: Vec<FunctionDecl>,
}

impl ClassDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, super_class: &str) -> Self {
        self.supers.push(super_class.to_string());
        self
    }

    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push((name.to_string(), ty.to_string()));
        self
    }

    pub fn method(mut self, decl: FunctionDecl) -> Self {
        self.methods.push(decl.with_attrs(FunctionAttrs::METHOD));
        self
    }
}

#[derive(Clone, Default)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<FunctionDecl>,
}

impl InterfaceDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, name: &str, result: &str, params: &[&str]) -> Self {
        self.methods
            .push(FunctionDecl::abstract_method(name, result, params));
        self
    }
}

#[derive(Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Global { name: String, ty: String },
    Module(String),
    Class(ClassDecl),
    Interface(InterfaceDecl),
}

impl From<FunctionDecl> for Decl {
    fn from(d: FunctionDecl) -> Self {
        Decl::Function(d)
    }
}

impl From<ClassDecl> for Decl {
    fn from(d: ClassDecl) -> Self {
        Decl::Class(d)
    }
}

impl From<InterfaceDecl> for Decl {
    fn from(d: InterfaceDecl) -> Self {
        Decl::Interface(d)
    }
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Resolves a type name as seen from `scope`.
pub fn parse_type(
    table: &mut SymbolTable,
    scope: SymbolId,
    text: &str,
) -> Result<SymbolId, RegistrationError> {
    let text = text.trim();
    let invalid = || RegistrationError::InvalidTypeName(text.to_string());
    if text.is_empty() {
        return Err(invalid());
    }
    if let Some(inner) = text.strip_suffix('&') {
        let target = parse_type(table, scope, inner)?;
        return Ok(table.reference_type(target));
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let element = parse_type(table, scope, inner)?;
        return Ok(table.list_type(element));
    }
    if let Some(var) = text.strip_prefix('\'') {
        if !is_identifier(var) {
            return Err(invalid());
        }
        return Ok(table.type_variable(var));
    }
    if let Some(rest) = text.strip_prefix("vector ") {
        let (element, width) = rest.split_once('[').ok_or_else(invalid)?;
        let width: u32 = width
            .strip_suffix(']')
            .and_then(|w| w.trim().parse().ok())
            .ok_or_else(invalid)?;
        let element = parse_type(table, scope, element)?;
        if element != table.prims().float {
            return Err(RegistrationError::UnknownType(text.to_string()));
        }
        return table
            .vector_type(width)
            .ok_or_else(|| RegistrationError::UnknownType(text.to_string()));
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        let parts = split_top_level(inner, ';');
        let [result, params] = parts.as_slice() else {
            return Err(invalid());
        };
        let result = parse_type(table, scope, result)?;
        let mut param_types = Vec::new();
        if !params.trim().is_empty() {
            for p in split_top_level(params, ',') {
                param_types.push(parse_type(table, scope, p)?);
            }
        }
        return Ok(table.function_type(result, &param_types));
    }
    if !text.split('.').all(is_identifier) {
        return Err(invalid());
    }
    table
        .lookup_path(scope, text)
        .into_iter()
        .find(|&s| table.get(s).is_type())
        .ok_or_else(|| RegistrationError::UnknownType(text.to_string()))
}

/// Declares a function in `scope`. Methods get `this` (of type `class`)
/// prepended to their parameters.
pub fn declare_function(
    table: &mut SymbolTable,
    scope: SymbolId,
    decl: FunctionDecl,
    class: Option<SymbolId>,
) -> Result<SymbolId, RegistrationError> {
    let result = parse_type(table, scope, &decl.result)?;
    let mut params = Vec::with_capacity(decl.params.len() + 1);
    let mut attrs = decl.attrs;
    if let Some(class) = class {
        params.push(class);
        attrs = attrs | FunctionAttrs::METHOD;
        if table.name(class).as_str() == decl.name {
            attrs = attrs | FunctionAttrs::CONSTRUCTOR;
        }
    }
    for p in &decl.params {
        params.push(parse_type(table, scope, p)?);
    }
    let body = match decl.body {
        DeclBody::Native(f) => FunctionBody::Native(f),
        DeclBody::Inline(f) => FunctionBody::Inline(f),
        DeclBody::Abstract => FunctionBody::Abstract,
    };
    let frame = table.new_frame();
    let name = table.intern(&decl.name);
    table.add(
        scope,
        name,
        SymbolKind::Function(FunctionInfo {
            result,
            params,
            attrs,
            body,
            method_index: None,
            frame,
        }),
    )
}

/// Declares and freezes a class.
pub fn declare_class(
    table: &mut SymbolTable,
    scope: SymbolId,
    decl: ClassDecl,
) -> Result<SymbolId, RegistrationError> {
    let mut supers = Vec::with_capacity(decl.supers.len());
    for s in &decl.supers {
        supers.push(parse_type(table, scope, s)?);
    }
    let class = table.add_class(scope, &decl.name, supers)?;
    for (name, ty) in &decl.fields {
        add_field(table, class, name, ty)?;
    }
    for m in decl.methods {
        declare_function(table, class, m, Some(class))?;
    }
    table.freeze(class)?;
    Ok(class)
}

pub fn add_field(
    table: &mut SymbolTable,
    class: SymbolId,
    name: &str,
    ty: &str,
) -> Result<SymbolId, RegistrationError> {
    let ty = parse_type(table, class, ty)?;
    let name = table.intern(name);
    table.add(
        class,
        name,
        SymbolKind::Variable(VariableInfo {
            ty,
            storage: Storage::Member(None),
            frame: None,
        }),
    )
}

pub fn declare_interface(
    table: &mut SymbolTable,
    scope: SymbolId,
    decl: InterfaceDecl,
) -> Result<SymbolId, RegistrationError> {
    let iface = table.add_interface(scope, &decl.name)?;
    for m in decl.methods {
        declare_function(table, iface, m, Some(iface))?;
    }
    Ok(iface)
}

pub fn declare(
    table: &mut SymbolTable,
    scope: SymbolId,
    decl: Decl,
) -> Result<SymbolId, RegistrationError> {
    match decl {
        Decl::Function(f) => {
            let owner = (table.class(scope).is_some() || table.interface(scope).is_some())
                .then_some(scope);
            declare_function(table, scope, f, owner)
        }
        Decl::Global { name, ty } => {
            let ty = parse_type(table, scope, &ty)?;
            table.add_global(scope, &name, ty)
        }
        Decl::Module(name) => table.add_module(scope, &name),
        Decl::Class(c) => declare_class(table, scope, c),
        Decl::Interface(i) => declare_interface(table, scope, i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structural_type_names() {
        let mut t = SymbolTable::new();
        let root = t.root();
        let p = *t.prims();
        assert_eq!(parse_type(&mut t, root, "int"), Ok(p.int));
        let list = parse_type(&mut t, root, "[int]").unwrap();
        assert_eq!(t.list_element(list), Some(p.int));
        let nested = parse_type(&mut t, root, "[[float]]").unwrap();
        assert_eq!(t.type_name(nested), "[[float]]");
        let r = parse_type(&mut t, root, "int&").unwrap();
        assert_eq!(t.dereferenced(r), p.int);
        assert_eq!(parse_type(&mut t, root, "vector float[3]"), Ok(p.vec3));
        let f = parse_type(&mut t, root, "(int;float,[int])").unwrap();
        assert_eq!(t.type_name(f), "(int;float,[int])");
        let generic = parse_type(&mut t, root, "['a]").unwrap();
        assert!(t.contains_type_variable(generic));
    }

    #[test]
    fn rejects_unknown_and_malformed_names() {
        let mut t = SymbolTable::new();
        let root = t.root();
        assert!(matches!(
            parse_type(&mut t, root, "widget"),
            Err(RegistrationError::UnknownType(_))
        ));
        assert!(matches!(
            parse_type(&mut t, root, "vector int[3]"),
            Err(RegistrationError::UnknownType(_))
        ));
        assert!(matches!(
            parse_type(&mut t, root, "in t"),
            Err(RegistrationError::InvalidTypeName(_))
        ));
    }
}
