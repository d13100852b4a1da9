use crate::node::{EvalResult, Node, NodeFunc};
use crate::thread::Thread;
use mu_core::{MachineRep, SymbolId, Value};
use std::ops::BitOr;
use std::sync::Arc;

/// Host function called with its evaluated arguments.
pub type NativeFunc = fn(&mut Thread, &[Value]) -> EvalResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FunctionAttrs(u32);

impl FunctionAttrs {
    pub const NONE: Self = Self(0);
    /// Two-argument function whose arguments may be swapped during overload
    /// resolution.
    pub const COMMUTATIVE: Self = Self(1 << 0);
    /// Conversion the resolver may insert on its own.
    pub const IMPLICIT_CAST: Self = Self(1 << 1);
    /// Conversion usable by an explicit cast.
    pub const CAST: Self = Self(1 << 2);
    /// Member function; parameter 0 is `this`.
    pub const METHOD: Self = Self(1 << 3);
    pub const CONSTRUCTOR: Self = Self(1 << 4);
    /// Declared without a body (interface members).
    pub const ABSTRACT: Self = Self(1 << 5);
    pub const LAMBDA: Self = Self(1 << 6);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FunctionAttrs {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A resolved function body.
pub struct FunctionCode {
    pub root: Node,
    /// Slots per activation, parameters included.
    pub frame_size: u32,
    /// Frame slots that receive a closure's captured values, in capture order.
    pub capture_slots: Vec<u32>,
    /// A body that falls off its end yields its last value when this
    /// representation accepts it, and the zero value otherwise.
    pub result_rep: MachineRep,
}

#[derive(Clone)]
pub enum FunctionBody {
    /// Called with evaluated arguments.
    Native(NativeFunc),
    /// Installed as the call node's own evaluation function.
    Inline(NodeFunc),
    Code(Arc<FunctionCode>),
    /// Declared; the body has not been resolved yet.
    Pending,
    Abstract,
}

#[derive(Clone)]
pub struct FunctionInfo {
    pub result: SymbolId,
    /// Parameter types, `this` first for methods.
    pub params: Vec<SymbolId>,
    pub attrs: FunctionAttrs,
    pub body: FunctionBody,
    /// Index in the declaring class's dispatch table, set at freeze.
    pub method_index: Option<u32>,
    /// Frame id owning the parameters and locals.
    pub frame: u32,
}

impl FunctionInfo {
    pub fn is_method(&self) -> bool {
        self.attrs.contains(FunctionAttrs::METHOD)
    }

    /// Parameters as seen by a caller of a method, `this` excluded.
    pub fn explicit_params(&self) -> &[SymbolId] {
        if self.is_method() {
            self.params.get(1..).unwrap_or(&[])
        } else {
            &self.params
        }
    }
}
