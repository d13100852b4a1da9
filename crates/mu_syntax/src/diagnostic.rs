//!
//!

use crate::{DiagnosticKind, DiagnosticsFormatter, SourcePos};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub message: String,
    pub pos: SourcePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub code: Option<&'static str>,
    pub suggestion: Option<String>,
    pub pos: Option<SourcePos>,
    pub labels: Vec<Label>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, pos: Option<SourcePos>) -> Self {
        Self {
            severity,
            message: DiagnosticsFormatter::format(&kind),
            code: kind.code(),
            suggestion: None,
            pos,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn error(message: impl Into<String>, pos: Option<SourcePos>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            code: None,
            suggestion: None,
            pos,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn error_kind(kind: DiagnosticKind, pos: Option<SourcePos>) -> Self {
        Self::new(Severity::Error, kind, pos)
    }

    pub fn warning_kind(kind: DiagnosticKind, pos: Option<SourcePos>) -> Self {
        Self::new(Severity::Warning, kind, pos)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_label(mut self, message: impl Into<String>, pos: SourcePos) -> Self {
        self.labels.push(Label {
            message: message.into(),
            pos,
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

pub mod codes {
    pub const UNRESOLVED_NAME: &str = "E0001";
    pub const ARITY_MISMATCH: &str = "E0002";
    pub const TYPE_MISMATCH: &str = "E0003";
    pub const AMBIGUOUS_OVERLOAD: &str = "E0004";
    pub const UNRESOLVED_CALL: &str = "E0005";
    pub const BAD_CAST: &str = "E0006";
    pub const NOT_A_COLLECTION: &str = "E0007";
    pub const UNSUPPORTED_REPRESENTATION: &str = "E0008";
    pub const MISPLACED_CONTROL_FLOW: &str = "E0009";
    pub const UNFROZEN_CLASS: &str = "W0001";
}
