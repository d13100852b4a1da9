//! Symbols and the per-context symbol table.
//!
//! Every named entity (module, type, function, variable) is an entry in one
//! arena addressed by `SymbolId`. Scopes keep their members in declaration
//! order; a name maps to an overload chain so functions can share it.
//! Builtins live in their own module, searched after every user scope.
//! Arena entries are never removed; a unit that fails to resolve only
//! unlinks its declarations from their scopes.

mod function;

pub use function::{FunctionAttrs, FunctionBody, FunctionCode, FunctionInfo, NativeFunc};

use crate::errors::RegistrationError;
use crate::types::{ClassInfo, InterfaceInfo, TypeInfo, TypeKind};
use indexmap::IndexMap;
use mu_core::{FastHashMap, MachineRep, Name, NameTable, SymbolId, Value};
use smallvec::SmallVec;

pub type Overloads = SmallVec<[SymbolId; 1]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// Local of a function frame, addressed from the frame base.
    Stack(u32),
    /// Argument `i` of a function frame.
    Parameter(u32),
    Global(u32),
    /// Field of a class. The slot relative to the declaring class's
    /// sub-object is known once the class is frozen.
    Member(Option<u32>),
}

#[derive(Clone, Debug)]
pub struct VariableInfo {
    pub ty: SymbolId,
    pub storage: Storage,
    /// Frame that owns a stack or parameter variable.
    pub frame: Option<u32>,
}

pub enum SymbolKind {
    Module,
    /// Anonymous block scope.
    Scope,
    Type(TypeInfo),
    Function(FunctionInfo),
    Variable(VariableInfo),
}

pub struct Symbol {
    pub name: Name,
    pub scope: Option<SymbolId>,
    pub kind: SymbolKind,
    members: IndexMap<Name, Overloads, ahash::RandomState>,
}

impl Symbol {
    fn new(name: Name, scope: Option<SymbolId>, kind: SymbolKind) -> Self {
        Self {
            name,
            scope,
            kind,
            members: IndexMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub fn members(&self, name: &Name) -> &[SymbolId] {
        self.members.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn member_names(&self) -> impl Iterator<Item = &Name> {
        self.members.keys()
    }

    pub fn all_members(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.members.values().flat_map(|v| v.iter().copied())
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, SymbolKind::Type(_))
    }
}

/// Ids of the built-in types, filled when the table is created.
#[derive(Clone, Copy, Debug)]
pub struct Primitives {
    pub void: SymbolId,
    pub nil: SymbolId,
    pub bool: SymbolId,
    pub byte: SymbolId,
    pub char: SymbolId,
    pub short: SymbolId,
    pub int: SymbolId,
    pub int64: SymbolId,
    pub float: SymbolId,
    pub double: SymbolId,
    pub string: SymbolId,
    pub vec2: SymbolId,
    pub vec3: SymbolId,
    pub vec4: SymbolId,
}

pub struct SymbolTable {
    names: NameTable,
    symbols: Vec<Symbol>,
    root: SymbolId,
    builtins: SymbolId,
    prims: Primitives,
    list_types: FastHashMap<SymbolId, SymbolId>,
    reference_types: FastHashMap<SymbolId, SymbolId>,
    function_types: FastHashMap<SmallVec<[SymbolId; 4]>, SymbolId>,
    type_variables: FastHashMap<Name, SymbolId>,
    global_zeros: Vec<Value>,
    next_frame: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut names = NameTable::new();
        let root_name = names.intern("");
        let placeholder = SymbolId(0);
        let mut table = Self {
            names,
            symbols: vec![Symbol::new(root_name, None, SymbolKind::Module)],
            root: SymbolId(0),
            builtins: SymbolId(0),
            prims: Primitives {
                void: placeholder,
                nil: placeholder,
                bool: placeholder,
                byte: placeholder,
                char: placeholder,
                short: placeholder,
                int: placeholder,
                int64: placeholder,
                float: placeholder,
                double: placeholder,
                string: placeholder,
                vec2: placeholder,
                vec3: placeholder,
                vec4: placeholder,
            },
            list_types: FastHashMap::default(),
            reference_types: FastHashMap::default(),
            function_types: FastHashMap::default(),
            type_variables: FastHashMap::default(),
            global_zeros: Vec::new(),
            next_frame: 0,
        };
        let scalar = |t: &mut Self, name: &str, rep: MachineRep, kind: TypeKind| {
            t.add_type(t.root, name, TypeInfo { rep, kind })
        };
        let void = scalar(&mut table, "void", MachineRep::Void, TypeKind::Void);
        let nil = scalar(&mut table, "nil", MachineRep::Pointer, TypeKind::Nil);
        let bool = scalar(&mut table, "bool", MachineRep::Bool, TypeKind::Primitive);
        let byte = scalar(&mut table, "byte", MachineRep::Byte, TypeKind::Primitive);
        let char = scalar(&mut table, "char", MachineRep::Char, TypeKind::Primitive);
        let short = scalar(&mut table, "short", MachineRep::Short, TypeKind::Primitive);
        let int = scalar(&mut table, "int", MachineRep::Int, TypeKind::Primitive);
        let int64 = scalar(&mut table, "int64", MachineRep::Int64, TypeKind::Primitive);
        let float = scalar(&mut table, "float", MachineRep::Float, TypeKind::Primitive);
        let double = scalar(&mut table, "double", MachineRep::Double, TypeKind::Primitive);
        let string = scalar(&mut table, "string", MachineRep::Pointer, TypeKind::String);
        let vector = |t: &mut Self, width: u32, rep: MachineRep| {
            let name = format!("vector float[{width}]");
            t.add_anonymous_type(
                &name,
                TypeInfo {
                    rep,
                    kind: TypeKind::Vector {
                        element: float,
                        width,
                    },
                },
            )
        };
        let vec2 = vector(&mut table, 2, MachineRep::Vec2f);
        let vec3 = vector(&mut table, 3, MachineRep::Vec3f);
        let vec4 = vector(&mut table, 4, MachineRep::Vec4f);
        table.prims = Primitives {
            void,
            nil,
            bool,
            byte,
            char,
            short,
            int,
            int64,
            float,
            double,
            string,
            vec2,
            vec3,
            vec4,
        };
        let builtins = table.names.intern("builtins");
        let module = table.push(Symbol::new(builtins.clone(), Some(table.root), SymbolKind::Module));
        table.symbols[table.root.index()]
            .members
            .entry(builtins)
            .or_default()
            .push(module);
        table.builtins = module;
        table
    }

    fn add_type(&mut self, scope: SymbolId, name: &str, info: TypeInfo) -> SymbolId {
        let name = self.names.intern(name);
        let id = self.push(Symbol::new(name.clone(), Some(scope), SymbolKind::Type(info)));
        self.symbols[scope.index()]
            .members
            .entry(name)
            .or_default()
            .push(id);
        id
    }

    /// Adds a structural type that is not visible by name in any scope.
    fn add_anonymous_type(&mut self, name: &str, info: TypeInfo) -> SymbolId {
        let name = self.names.intern(name);
        self.push(Symbol::new(name, Some(self.root), SymbolKind::Type(info)))
    }

    fn push(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    #[inline]
    pub fn root(&self) -> SymbolId {
        self.root
    }

    /// Module holding the builtin functions.
    #[inline]
    pub fn builtins(&self) -> SymbolId {
        self.builtins
    }

    #[inline]
    pub fn prims(&self) -> &Primitives {
        &self.prims
    }

    pub fn intern(&mut self, s: &str) -> Name {
        self.names.intern(s)
    }

    pub fn lookup_name(&self, s: &str) -> Option<Name> {
        self.names.lookup(s)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[inline]
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn name(&self, id: SymbolId) -> &Name {
        &self.get(id).name
    }

    pub fn members(&self, scope: SymbolId, name: &Name) -> &[SymbolId] {
        self.get(scope).members(name)
    }

    /// Declares `name` in `scope`. Functions may share a name when their
    /// parameter types differ; anything else must be unique within its
    /// scope. Adding to a frozen class fails.
    pub fn add(
        &mut self,
        scope: SymbolId,
        name: Name,
        kind: SymbolKind,
    ) -> Result<SymbolId, RegistrationError> {
        if let Some(class) = self.class(scope) {
            if class.is_frozen() {
                return Err(RegistrationError::ClassFrozen(self.qualified_name(scope)));
            }
        }
        let is_function = matches!(kind, SymbolKind::Function(_));
        let is_variable = matches!(kind, SymbolKind::Variable(_));
        let existing = self.members(scope, &name);
        if !existing.is_empty() && !(is_function && existing.iter().all(|&e| self.get(e).is_function()))
        {
            return Err(RegistrationError::Duplicate(name.to_string()));
        }
        if let SymbolKind::Function(f) = &kind {
            let same_signature = existing
                .iter()
                .any(|&e| self.function(e).is_some_and(|g| g.params == f.params));
            if same_signature {
                return Err(RegistrationError::Duplicate(name.to_string()));
            }
        }
        let id = self.push(Symbol::new(name.clone(), Some(scope), kind));
        self.symbols[scope.index()]
            .members
            .entry(name)
            .or_default()
            .push(id);
        match &mut self.symbols[scope.index()].kind {
            SymbolKind::Type(TypeInfo {
                kind: TypeKind::Class(class),
                ..
            }) => {
                if is_variable {
                    class.fields.push(id);
                } else if is_function {
                    class.methods.push(id);
                }
            }
            SymbolKind::Type(TypeInfo {
                kind: TypeKind::Interface(iface),
                ..
            }) => {
                if is_function {
                    iface.methods.push(id);
                }
            }
            _ => {}
        }
        if self.class(scope).is_some() {
            self.invalidate_conformance(scope);
        } else if self.interface(scope).is_some() {
            for sym in &self.symbols {
                if let SymbolKind::Type(TypeInfo {
                    kind: TypeKind::Class(class),
                    ..
                }) = &sym.kind
                {
                    class.clear_conformance();
                }
            }
        }
        Ok(id)
    }

    pub fn add_module(&mut self, scope: SymbolId, name: &str) -> Result<SymbolId, RegistrationError> {
        let name = self.intern(name);
        if let Some(&existing) = self.members(scope, &name).first() {
            if matches!(self.get(existing).kind, SymbolKind::Module) {
                return Ok(existing);
            }
        }
        self.add(scope, name, SymbolKind::Module)
    }

    /// Creates an anonymous block scope nested in `parent`.
    pub fn add_scope(&mut self, parent: SymbolId) -> SymbolId {
        let name = self.names.intern("");
        self.push(Symbol::new(name, Some(parent), SymbolKind::Scope))
    }

    pub fn add_class(
        &mut self,
        scope: SymbolId,
        name: &str,
        supers: Vec<SymbolId>,
    ) -> Result<SymbolId, RegistrationError> {
        for &s in &supers {
            if self.class(s).is_none() {
                return Err(RegistrationError::NotAClass(self.type_name(s)));
            }
        }
        let name = self.intern(name);
        let info = TypeInfo {
            rep: MachineRep::Pointer,
            kind: TypeKind::Class(Box::new(ClassInfo::new(supers.clone()))),
        };
        let id = self.add(scope, name, SymbolKind::Type(info))?;
        for s in supers {
            if let Some(parent) = self.class_mut(s) {
                parent.children.push(id);
            }
        }
        Ok(id)
    }

    pub fn add_interface(&mut self, scope: SymbolId, name: &str) -> Result<SymbolId, RegistrationError> {
        let name = self.intern(name);
        let info = TypeInfo {
            rep: MachineRep::Pointer,
            kind: TypeKind::Interface(InterfaceInfo::default()),
        };
        self.add(scope, name, SymbolKind::Type(info))
    }

    pub fn add_global(
        &mut self,
        scope: SymbolId,
        name: &str,
        ty: SymbolId,
    ) -> Result<SymbolId, RegistrationError> {
        let index = self.global_zeros.len() as u32;
        let name = self.intern(name);
        let id = self.add(
            scope,
            name,
            SymbolKind::Variable(VariableInfo {
                ty,
                storage: Storage::Global(index),
                frame: None,
            }),
        )?;
        self.global_zeros.push(self.rep(ty).zero());
        Ok(id)
    }

    /// Zero values of every declared global, indexed by global slot.
    pub fn global_zeros(&self) -> &[Value] {
        &self.global_zeros
    }

    pub fn new_frame(&mut self) -> u32 {
        self.next_frame += 1;
        self.next_frame
    }

    pub fn type_info(&self, id: SymbolId) -> Option<&TypeInfo> {
        match &self.get(id).kind {
            SymbolKind::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn type_kind(&self, id: SymbolId) -> Option<&TypeKind> {
        self.type_info(id).map(|t| &t.kind)
    }

    /// Machine representation of a type, `Void` for non-types.
    pub fn rep(&self, id: SymbolId) -> MachineRep {
        self.type_info(id).map_or(MachineRep::Void, |t| t.rep)
    }

    pub fn function(&self, id: SymbolId) -> Option<&FunctionInfo> {
        match &self.get(id).kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: SymbolId) -> Option<&mut FunctionInfo> {
        match &mut self.get_mut(id).kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn variable(&self, id: SymbolId) -> Option<&VariableInfo> {
        match &self.get(id).kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self, id: SymbolId) -> Option<&mut VariableInfo> {
        match &mut self.get_mut(id).kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn class(&self, id: SymbolId) -> Option<&ClassInfo> {
        match self.type_kind(id) {
            Some(TypeKind::Class(c)) => Some(c),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, id: SymbolId) -> Option<&mut ClassInfo> {
        match &mut self.get_mut(id).kind {
            SymbolKind::Type(TypeInfo {
                kind: TypeKind::Class(c),
                ..
            }) => Some(c),
            _ => None,
        }
    }

    pub fn interface(&self, id: SymbolId) -> Option<&InterfaceInfo> {
        match self.type_kind(id) {
            Some(TypeKind::Interface(i)) => Some(i),
            _ => None,
        }
    }

    pub fn list_type(&mut self, element: SymbolId) -> SymbolId {
        if let Some(&id) = self.list_types.get(&element) {
            return id;
        }
        let name = format!("[{}]", self.type_name(element));
        let id = self.add_anonymous_type(
            &name,
            TypeInfo {
                rep: MachineRep::Pointer,
                kind: TypeKind::List(element),
            },
        );
        self.list_types.insert(element, id);
        id
    }

    pub fn reference_type(&mut self, target: SymbolId) -> SymbolId {
        if let Some(&id) = self.reference_types.get(&target) {
            return id;
        }
        let name = format!("{}&", self.type_name(target));
        let id = self.add_anonymous_type(
            &name,
            TypeInfo {
                rep: MachineRep::Pointer,
                kind: TypeKind::Reference(target),
            },
        );
        self.reference_types.insert(target, id);
        id
    }

    pub fn function_type(&mut self, result: SymbolId, params: &[SymbolId]) -> SymbolId {
        let mut key: SmallVec<[SymbolId; 4]> = SmallVec::with_capacity(params.len() + 1);
        key.push(result);
        key.extend_from_slice(params);
        if let Some(&id) = self.function_types.get(&key) {
            return id;
        }
        let args = params
            .iter()
            .map(|&p| self.type_name(p))
            .collect::<Vec<_>>()
            .join(",");
        let name = format!("({};{})", self.type_name(result), args);
        let id = self.add_anonymous_type(
            &name,
            TypeInfo {
                rep: MachineRep::Pointer,
                kind: TypeKind::Function {
                    result,
                    params: params.iter().copied().collect(),
                },
            },
        );
        self.function_types.insert(key, id);
        id
    }

    pub fn vector_type(&self, width: u32) -> Option<SymbolId> {
        match width {
            2 => Some(self.prims.vec2),
            3 => Some(self.prims.vec3),
            4 => Some(self.prims.vec4),
            _ => None,
        }
    }

    /// The type variable `'name`. Type variables are shared context-wide;
    /// bindings are per call site.
    pub fn type_variable(&mut self, name: &str) -> SymbolId {
        let name = self.intern(name);
        if let Some(&id) = self.type_variables.get(&name) {
            return id;
        }
        let id = self.add_anonymous_type(
            &format!("'{name}"),
            TypeInfo {
                rep: MachineRep::Pointer,
                kind: TypeKind::TypeVariable,
            },
        );
        self.type_variables.insert(name, id);
        id
    }

    /// Finds `name` from `scope` outwards. The nearest scope declaring the
    /// name wins; class scopes include inherited members.
    pub fn lookup(&self, scope: SymbolId, name: &Name) -> Overloads {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            let found = self.scope_lookup(s, name);
            if !found.is_empty() {
                return found;
            }
            cur = self.get(s).scope;
        }
        self.members(self.builtins, name).iter().copied().collect()
    }

    fn scope_lookup(&self, scope: SymbolId, name: &Name) -> Overloads {
        if self.class(scope).is_some() {
            self.class_lookup(scope, name)
        } else {
            self.members(scope, name).iter().copied().collect()
        }
    }

    /// Functions called `name` visible from `scope`, innermost first and
    /// ending with the builtins. Non-function symbols are skipped, and an
    /// inner function hides an outer one with the same parameter types.
    /// Methods found in an enclosing class are returned alone.
    pub fn lookup_functions(&self, scope: SymbolId, name: &Name) -> Overloads {
        let mut found = Overloads::new();
        let scopes = std::iter::successors(Some(scope), |&s| self.get(s).scope)
            .chain(std::iter::once(self.builtins));
        for s in scopes {
            let here: Overloads = self
                .scope_lookup(s, name)
                .into_iter()
                .filter(|&f| self.function(f).is_some())
                .collect();
            let methods = here
                .iter()
                .any(|&f| self.function(f).is_some_and(|i| i.is_method()));
            if found.is_empty() && methods {
                return here;
            }
            for f in here {
                let hidden = found.iter().any(|&g| {
                    self.function(g)
                        .zip(self.function(f))
                        .is_some_and(|(a, b)| a.params == b.params)
                });
                if !hidden {
                    found.push(f);
                }
            }
        }
        found
    }

    /// Removes declarations from the member tables of their scopes, newest
    /// first, and unregisters removed classes from their super-classes.
    pub fn retract(&mut self, ids: &[SymbolId]) {
        for &id in ids.iter().rev() {
            let Some(scope) = self.get(id).scope else {
                continue;
            };
            let name = self.get(id).name.clone();
            let members = &mut self.symbols[scope.index()].members;
            if let Some(chain) = members.get_mut(&name) {
                chain.retain(|m| *m != id);
                if chain.is_empty() {
                    members.shift_remove(&name);
                }
            }
            let supers: Vec<SymbolId> = self
                .class(id)
                .map(|c| c.supers.to_vec())
                .unwrap_or_default();
            for s in supers {
                if let Some(parent) = self.class_mut(s) {
                    parent.children.retain(|c| *c != id);
                }
            }
            log::debug!("retracted {}", self.qualified_name(id));
        }
    }

    fn class_lookup(&self, class: SymbolId, name: &Name) -> Overloads {
        if let Some((field, _)) = self.field_named(class, name) {
            return smallvec::smallvec![field];
        }
        let methods = self.methods_named(class, name);
        if !methods.is_empty() {
            return methods.into_iter().map(|(m, _)| m).collect();
        }
        self.members(class, name).iter().copied().collect()
    }

    /// Resolves a possibly dotted name from `scope`: the first component is
    /// looked up outwards, the rest as members.
    pub fn lookup_path(&self, scope: SymbolId, path: &str) -> Overloads {
        let mut parts = path.split('.');
        let Some(first) = parts.next().and_then(|p| self.lookup_name(p)) else {
            return Overloads::new();
        };
        let mut found = self.lookup(scope, &first);
        for part in parts {
            let Some(&container) = found.first() else {
                return Overloads::new();
            };
            let Some(name) = self.lookup_name(part) else {
                return Overloads::new();
            };
            found = if self.class(container).is_some() {
                self.class_lookup(container, &name)
            } else {
                self.members(container, &name).iter().copied().collect()
            };
        }
        found
    }

    /// Dotted path of a symbol from the root scope.
    pub fn qualified_name(&self, id: SymbolId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(s) = cur {
            let sym = self.get(s);
            if !sym.name.as_str().is_empty() {
                parts.push(sym.name.as_str());
            }
            cur = sym.scope;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Display name of a type.
    pub fn type_name(&self, id: SymbolId) -> String {
        match self.type_kind(id) {
            Some(
                TypeKind::List(_)
                | TypeKind::Reference(_)
                | TypeKind::Vector { .. }
                | TypeKind::Function { .. }
                | TypeKind::TypeVariable,
            ) => self.get(id).name.to_string(),
            _ => self.qualified_name(id),
        }
    }

    /// Resolves a dotted path from the root scope.
    /// A symbol by dotted path from the root. A first component that the
    /// root lacks is looked up among the builtins.
    pub fn find_qualified(&self, path: &str) -> Option<SymbolId> {
        let mut scope = self.root;
        for (i, part) in path.split('.').enumerate() {
            let name = self.lookup_name(part)?;
            let mut found = self.members(scope, &name).first().copied();
            if found.is_none() && i == 0 {
                found = self.members(self.builtins, &name).first().copied();
            }
            scope = found?;
        }
        Some(scope)
    }

    /// The closest enclosing module of a symbol.
    pub fn module_of(&self, id: SymbolId) -> SymbolId {
        let mut cur = self.get(id).scope;
        while let Some(s) = cur {
            if matches!(self.get(s).kind, SymbolKind::Module) {
                return s;
            }
            cur = self.get(s).scope;
        }
        self.root
    }

    /// Drops cached interface conformance for `class` and every class
    /// derived from it.
    pub fn invalidate_conformance(&self, class: SymbolId) {
        let mut pending = vec![class];
        while let Some(c) = pending.pop() {
            if let Some(info) = self.class(c) {
                info.clear_conformance();
                pending.extend(info.children.iter().copied());
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
