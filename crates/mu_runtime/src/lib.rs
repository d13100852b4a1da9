//! Mu embedded language runtime.
//!
//! Hosts register native functions and classes in a [`Context`], build
//! programs with an [`AstBuilder`], resolve them into evaluation trees and
//! run them on the threads of a [`Process`].

#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::result_large_err)]

pub mod archive;
mod assembler;
pub mod ast;
mod builtins;
pub mod call_env;
pub mod config;
pub mod context;
pub mod docs;
pub mod errors;
pub mod eval;
pub mod gc;
pub mod heap;
pub mod node;
pub mod process;
pub mod registration;
pub mod symbols;
pub mod thread;
pub mod types;

pub use ast::{Ast, AstBuilder, AstKind, AstUnit, Literal};
pub use call_env::{ArgumentVector, CallEnvironment};
pub use config::{CollectorKind, ProcessConfig};
pub use context::Context;
pub use docs::{DocSink, Documentation, DocumentationLoader};
pub use errors::{
    ArchiveError, Exception, InternalError, RegistrationError, ResolveError, RunError,
};
pub use eval::CatchMode;
pub use node::{EvalResult, Flow, Node};
pub use process::{Process, ThreadJoin};
pub use registration::{ClassDecl, Decl, FunctionDecl, InterfaceDecl};
pub use symbols::{FunctionAttrs, Primitives, SymbolTable};
pub use thread::{Thread, ThreadKind, ThreadState};

pub use mu_core::{MachineRep, ObjRef, ObjectId, SymbolId, Value};
