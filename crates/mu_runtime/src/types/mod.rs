//! Types and the match relation used by overload resolution.

mod class;
mod interface;

pub use class::{ClassInfo, DispatchView, Layout, SuperOffset, VEntry};
pub use interface::InterfaceInfo;

use crate::symbols::SymbolTable;
use mu_core::{MachineRep, SymbolId};
use smallvec::SmallVec;

pub struct TypeInfo {
    /// Fixed for the lifetime of the type.
    pub rep: MachineRep,
    pub kind: TypeKind,
}

pub enum TypeKind {
    Primitive,
    Void,
    /// Type of the `nil` literal. Matches every pointer-represented type.
    Nil,
    String,
    /// By-reference access to another type's storage.
    Reference(SymbolId),
    /// Persistent singly linked list.
    List(SymbolId),
    Vector {
        element: SymbolId,
        width: u32,
    },
    Class(Box<ClassInfo>),
    Interface(InterfaceInfo),
    Function {
        result: SymbolId,
        params: SmallVec<[SymbolId; 4]>,
    },
    /// Generic placeholder bound per call site (`'a`).
    TypeVariable,
}

/// Type-variable bindings collected while matching one call.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    pairs: SmallVec<[(SymbolId, SymbolId); 2]>,
}

impl Bindings {
    pub fn get(&self, var: SymbolId) -> Option<SymbolId> {
        self.pairs.iter().find(|(v, _)| *v == var).map(|(_, t)| *t)
    }

    pub fn bind(&mut self, var: SymbolId, ty: SymbolId) {
        self.pairs.push((var, ty));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl SymbolTable {
    /// Whether a value of type `arg` can be passed where `param` is expected.
    ///
    /// Classes match their ancestors, lists match element-wise, `nil`
    /// matches pointer types and an unbound type variable binds to `arg`.
    pub fn match_type(&self, param: SymbolId, arg: SymbolId, bindings: &mut Bindings) -> bool {
        if param == arg {
            return true;
        }
        let (Some(p), Some(a)) = (self.type_kind(param), self.type_kind(arg)) else {
            return false;
        };
        match (p, a) {
            (TypeKind::TypeVariable, _) => match bindings.get(param) {
                Some(bound) => bound == arg || self.match_type(bound, arg, bindings),
                None => {
                    bindings.bind(param, arg);
                    true
                }
            },
            (_, TypeKind::Nil) => {
                self.rep(param).is_pointer()
                    && !matches!(p, TypeKind::Reference(_) | TypeKind::Void)
            }
            (TypeKind::Class(_), TypeKind::Class(_)) => self.is_a(arg, param),
            (TypeKind::Interface(_), TypeKind::Class(_)) => {
                self.implementation(arg, param).is_some()
            }
            (TypeKind::List(pe), TypeKind::List(ae)) => self.match_type(*pe, *ae, bindings),
            (TypeKind::Reference(pt), TypeKind::Reference(at)) => pt == at,
            (
                TypeKind::Function {
                    result: pr,
                    params: pp,
                },
                TypeKind::Function {
                    result: ar,
                    params: ap,
                },
            ) => {
                pp.len() == ap.len()
                    && self.match_type(*pr, *ar, bindings)
                    && pp
                        .iter()
                        .zip(ap.iter())
                        .all(|(x, y)| self.match_type(*x, *y, bindings))
            }
            _ => false,
        }
    }

    pub fn contains_type_variable(&self, ty: SymbolId) -> bool {
        match self.type_kind(ty) {
            Some(TypeKind::TypeVariable) => true,
            Some(TypeKind::List(e)) | Some(TypeKind::Reference(e)) => {
                self.contains_type_variable(*e)
            }
            Some(TypeKind::Function { result, params }) => {
                self.contains_type_variable(*result)
                    || params.iter().any(|p| self.contains_type_variable(*p))
            }
            _ => false,
        }
    }

    /// Replaces bound type variables in `ty`, interning any new structural
    /// types. Unbound variables are left in place.
    pub fn substitute(&mut self, ty: SymbolId, bindings: &Bindings) -> SymbolId {
        if bindings.is_empty() {
            return ty;
        }
        enum Shape {
            Var,
            List(SymbolId),
            Reference(SymbolId),
            Function(SymbolId, SmallVec<[SymbolId; 4]>),
            Other,
        }
        let shape = match self.type_kind(ty) {
            Some(TypeKind::TypeVariable) => Shape::Var,
            Some(TypeKind::List(e)) => Shape::List(*e),
            Some(TypeKind::Reference(e)) => Shape::Reference(*e),
            Some(TypeKind::Function { result, params }) => Shape::Function(*result, params.clone()),
            _ => Shape::Other,
        };
        match shape {
            Shape::Var => bindings.get(ty).unwrap_or(ty),
            Shape::List(e) => {
                let e = self.substitute(e, bindings);
                self.list_type(e)
            }
            Shape::Reference(e) => {
                let e = self.substitute(e, bindings);
                self.reference_type(e)
            }
            Shape::Function(result, params) => {
                let result = self.substitute(result, bindings);
                let params: SmallVec<[SymbolId; 4]> =
                    params.iter().map(|&p| self.substitute(p, bindings)).collect();
                self.function_type(result, &params)
            }
            Shape::Other => ty,
        }
    }

    /// `T` for `T&`, otherwise the type itself.
    pub fn dereferenced(&self, ty: SymbolId) -> SymbolId {
        match self.type_kind(ty) {
            Some(TypeKind::Reference(t)) => *t,
            _ => ty,
        }
    }

    pub fn is_reference(&self, ty: SymbolId) -> bool {
        matches!(self.type_kind(ty), Some(TypeKind::Reference(_)))
    }

    pub fn list_element(&self, ty: SymbolId) -> Option<SymbolId> {
        match self.type_kind(ty) {
            Some(TypeKind::List(e)) => Some(*e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_matches_pointer_types_only() {
        let mut t = SymbolTable::new();
        let p = *t.prims();
        let list = t.list_type(p.int);
        let mut b = Bindings::default();
        assert!(t.match_type(list, p.nil, &mut b));
        assert!(t.match_type(p.string, p.nil, &mut b));
        assert!(!t.match_type(p.int, p.nil, &mut b));
    }

    #[test]
    fn type_variable_binds_once() {
        let mut t = SymbolTable::new();
        let p = *t.prims();
        let a = t.type_variable("a");
        let mut b = Bindings::default();
        assert!(t.match_type(a, p.int, &mut b));
        assert!(t.match_type(a, p.int, &mut b));
        assert!(!t.match_type(a, p.float, &mut b));
        let la = t.list_type(a);
        assert_eq!(t.substitute(la, &b), t.list_type(p.int));
    }
}
