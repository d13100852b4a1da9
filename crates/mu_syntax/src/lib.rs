//! Source positions and diagnostics shared by the Mu runtime crates.
//!
mod diagnostic;
mod loc;
mod pos;
mod render;
mod source;
mod util;

pub use diagnostic::{Diagnostic, Label, Severity, codes};
pub use loc::{DiagnosticKind, DiagnosticsFormatter};
pub use pos::SourcePos;
pub use render::{render_diagnostic, render_diagnostics};
pub use source::{SourceFile, SourceText};
pub use util::{find_best_match, levenshtein_distance};
