//! Error types for registration, resolution and evaluation.

use mu_core::Value;
use mu_syntax::{Diagnostic, SourceFile};
use std::fmt;

/// Common error message constants used throughout the runtime.
pub mod messages {
    pub const NOT_A_BOOL: &str = "Not a bool";
    pub const NOT_AN_INT: &str = "Not an int";
    pub const NOT_A_NUMBER: &str = "Not a number";
    pub const NOT_A_STRING: &str = "Not a string";
    pub const NOT_A_LIST: &str = "Not a list";
    pub const NOT_AN_OBJECT: &str = "Not an object";
    pub const NOT_A_REFERENCE: &str = "Not a reference";
    pub const NOT_A_FUNCTION: &str = "Not a function value";
    pub const DANGLING_OBJECT: &str = "Object was garbage collected";
    pub const MISSING_CONSTANT: &str = "Constant node without data";
    pub const MISSING_FUNCTION: &str = "Call node without a function symbol";
    pub const FRAME_SIZE: &str = "Frame block without an integer size";
    pub const MISSING_ARGUMENT: &str = "Node is missing an argument";
    pub const MISSING_OPERAND: &str = "Node is missing its integer operand";
    pub const BAD_SLOT: &str = "Slot outside the object";
    pub const BAD_DISPATCH: &str = "Dispatch table has no such entry";
    pub const REP_MISMATCH: &str = "Value does not match its machine representation";
    pub const NOT_A_CLASS: &str = "Instance of a symbol that is not a frozen class";
}

/// Recoverable runtime exceptions. Raised during evaluation, caught by guarded
/// frames or surfaced to the host.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Exception {
    #[error("nil reference")]
    NilReference,
    #[error("index {0} out of range")]
    OutOfRange(i64),
    #[error("bad dynamic cast from {from} to {to}")]
    BadDynamicCast { from: String, to: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("stack overflow")]
    StackOverflow,
    #[error("method \"{0}\" invoked on nil")]
    NilMethodInvocation(String),
    #[error("no method \"{name}\" on {class}")]
    NoSuchMethod { name: String, class: String },
    #[error("uncaught exception: {0}")]
    User(Value),
    #[error("{0}")]
    Native(String),
}

/// Violated runtime invariants. These are never caught by guarded frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error("unresolved node reached at evaluation time")]
    UnresolvedNode,
    #[error("class {0} used before freeze")]
    ClassNotFrozen(String),
    #[error("value stack underflow")]
    StackUnderflow,
    #[error("corrupt value: {0}")]
    CorruptValue(&'static str),
    #[error("{0} escaped its enclosing construct")]
    MisplacedControlFlow(&'static str),
    #[error("function {0} has no body")]
    MissingBody(String),
}

/// Resolution failure for a unit. Holds every diagnostic collected before the
/// unit was abandoned; the first error is the cause.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolveError {
    pub fn first(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.is_error())
    }

    /// All diagnostics with caret snippets taken from `source`.
    pub fn render(&self, source: Option<&SourceFile>) -> String {
        mu_syntax::render_diagnostics(source, &self.diagnostics)
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first() {
            Some(d) => match &d.pos {
                Some(pos) => write!(f, "{}: {}", pos, d.message),
                None => f.write_str(&d.message),
            },
            None => f.write_str("resolution failed"),
        }
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("unknown type \"{0}\"")]
    UnknownType(String),
    #[error("malformed type name \"{0}\"")]
    InvalidTypeName(String),
    #[error("class {0} is frozen")]
    ClassFrozen(String),
    #[error("\"{0}\" is already declared")]
    Duplicate(String),
    #[error("\"{0}\" is not a class")]
    NotAClass(String),
    #[error("\"{0}\" is not an interface")]
    NotAnInterface(String),
    #[error("\"{0}\" is not a scope")]
    NotAScope(String),
    #[error("unknown symbol \"{0}\"")]
    UnknownSymbol(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Exception(#[from] Exception),
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("process has no root node")]
    NoRoot,
    #[error("process thread limit of {0} reached")]
    ThreadLimit(usize),
    #[error("process was torn down")]
    TornDown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("unexpected end of archive")]
    UnexpectedEof,
    #[error("unknown class \"{0}\" in archive")]
    UnknownClass(String),
    #[error("object reference {0} precedes its definition")]
    UnknownObject(u32),
    #[error("values of type {0} cannot be archived")]
    Unsupported(String),
    #[error("value does not match type {0}")]
    Mismatch(String),
    #[error("invalid utf-8 in archived string")]
    BadString,
}
