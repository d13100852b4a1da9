//! Resolved expression trees.
//!
//! A `Node` is an evaluation function plus its argument nodes. Nodes that
//! carry an inline constant play the data-node role. A node without an
//! evaluation function is unresolved; reaching one at run time is an internal
//! error.

use crate::errors::{Exception, InternalError, messages};
use crate::symbols::NativeFunc;
use crate::thread::Thread;
use mu_core::{SymbolId, Value};
use std::sync::Arc;

/// Non-local exits threaded through evaluation as the error half of
/// `EvalResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Return(Value),
    Break,
    Continue,
    Throw(Exception),
    Internal(InternalError),
}

impl From<Exception> for Flow {
    fn from(e: Exception) -> Self {
        Flow::Throw(e)
    }
}

impl From<InternalError> for Flow {
    fn from(e: InternalError) -> Self {
        Flow::Internal(e)
    }
}

pub type EvalResult = Result<Value, Flow>;

pub type NodeFunc = fn(&Node, &mut Thread) -> EvalResult;

pub struct Node {
    func: Option<NodeFunc>,
    pub args: Vec<Node>,
    /// Inline constant or per-node operand (slot, offset, method index).
    pub data: Option<Value>,
    /// Static result type.
    pub ty: SymbolId,
    /// Function, class or interface the node operates on.
    pub symbol: Option<SymbolId>,
    /// String literal text.
    pub text: Option<Arc<str>>,
    pub native: Option<NativeFunc>,
}

impl Node {
    pub fn new(func: NodeFunc, ty: SymbolId, args: Vec<Node>) -> Self {
        Self {
            func: Some(func),
            args,
            data: None,
            ty,
            symbol: None,
            text: None,
            native: None,
        }
    }

    pub fn unresolved(ty: SymbolId) -> Self {
        Self {
            func: None,
            args: Vec::new(),
            data: None,
            ty,
            symbol: None,
            text: None,
            native: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_symbol(mut self, symbol: SymbolId) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_text(mut self, text: Arc<str>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_native(mut self, native: NativeFunc) -> Self {
        self.native = Some(native);
        self
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.func.is_some()
    }

    /// Whether this node and every node below it is resolved.
    pub fn is_fully_resolved(&self) -> bool {
        self.is_resolved() && self.args.iter().all(Node::is_fully_resolved)
    }

    #[inline]
    pub fn eval(&self, thread: &mut Thread) -> EvalResult {
        match self.func {
            Some(f) => f(self, thread),
            None => {
                log::error!("unresolved node of type {} reached", self.ty);
                Err(InternalError::UnresolvedNode.into())
            }
        }
    }

    #[inline]
    pub fn arg(&self, index: usize) -> Result<&Node, Flow> {
        self.args
            .get(index)
            .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_ARGUMENT)))
    }

    #[inline]
    pub fn eval_arg(&self, index: usize, thread: &mut Thread) -> EvalResult {
        self.arg(index)?.eval(thread)
    }

    /// Integer operand stored in `data`.
    pub fn operand(&self) -> Result<u32, Flow> {
        match self.data {
            Some(Value::Int(i)) if i >= 0 => Ok(i as u32),
            _ => Err(InternalError::CorruptValue(messages::MISSING_OPERAND).into()),
        }
    }

    pub fn symbol_operand(&self) -> Result<SymbolId, Flow> {
        self.symbol
            .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_FUNCTION)))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("resolved", &self.is_resolved())
            .field("ty", &self.ty)
            .field("data", &self.data)
            .field("symbol", &self.symbol)
            .field("args", &self.args)
            .finish()
    }
}
