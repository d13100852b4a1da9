use crate::codes;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    UnresolvedReference(String),
    UnresolvedFunctionCall(String),
    UnresolvedMember {
        member: String,
        ty: String,
    },
    UnknownType(String),
    ArityMismatch {
        name: String,
        expected: Vec<usize>,
        actual: usize,
    },
    NoMatchingOverload {
        name: String,
        args: Vec<String>,
    },
    AmbiguousOverload {
        name: String,
        candidates: Vec<String>,
    },
    CannotCast {
        from: String,
        to: String,
    },
    CannotAssign {
        from: String,
        to: String,
    },
    NotAReference(String),
    NotACollection(String),
    NotAClass(String),
    NotCallable(String),
    ConditionNotBool(String),
    UnsupportedRepresentation(String),
    ControlFlowOutsideLoop(&'static str),
    ReturnOutsideFunction,
    ReturnTypeMismatch {
        expected: String,
        actual: String,
    },
    CannotInferType(String),
    DidYouMean(String),
    Raw(String),
}

impl DiagnosticKind {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            DiagnosticKind::UnresolvedReference(_)
            | DiagnosticKind::UnresolvedMember { .. }
            | DiagnosticKind::UnknownType(_) => Some(codes::UNRESOLVED_NAME),
            DiagnosticKind::UnresolvedFunctionCall(_)
            | DiagnosticKind::NoMatchingOverload { .. }
            | DiagnosticKind::NotCallable(_) => Some(codes::UNRESOLVED_CALL),
            DiagnosticKind::ArityMismatch { .. } => Some(codes::ARITY_MISMATCH),
            DiagnosticKind::AmbiguousOverload { .. } => Some(codes::AMBIGUOUS_OVERLOAD),
            DiagnosticKind::CannotCast { .. } => Some(codes::BAD_CAST),
            DiagnosticKind::CannotAssign { .. }
            | DiagnosticKind::NotAReference(_)
            | DiagnosticKind::NotAClass(_)
            | DiagnosticKind::ConditionNotBool(_)
            | DiagnosticKind::ReturnTypeMismatch { .. }
            | DiagnosticKind::CannotInferType(_) => Some(codes::TYPE_MISMATCH),
            DiagnosticKind::NotACollection(_) => Some(codes::NOT_A_COLLECTION),
            DiagnosticKind::UnsupportedRepresentation(_) => {
                Some(codes::UNSUPPORTED_REPRESENTATION)
            }
            DiagnosticKind::ControlFlowOutsideLoop(_) | DiagnosticKind::ReturnOutsideFunction => {
                Some(codes::MISPLACED_CONTROL_FLOW)
            }
            DiagnosticKind::DidYouMean(_) | DiagnosticKind::Raw(_) => None,
        }
    }
}

pub struct DiagnosticsFormatter;

impl DiagnosticsFormatter {
    pub fn format(kind: &DiagnosticKind) -> String {
        match kind {
            DiagnosticKind::UnresolvedReference(name) => {
                format!("Unresolved reference to \"{}\"", name)
            }
            DiagnosticKind::UnresolvedFunctionCall(name) => {
                format!("Unresolved function call to \"{}\"", name)
            }
            DiagnosticKind::UnresolvedMember { member, ty } => format!(
                "Unresolved member reference to \"{}\" in type \"{}\"",
                member, ty
            ),
            DiagnosticKind::UnknownType(name) => format!("Unknown type \"{}\"", name),
            DiagnosticKind::ArityMismatch {
                name,
                expected,
                actual,
            } => {
                let counts = expected
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(" or ");
                format!(
                    "Wrong number of arguments to \"{}\": expected {} but got {}",
                    name, counts, actual
                )
            }
            DiagnosticKind::NoMatchingOverload { name, args } => format!(
                "No function \"{}\" matches argument types ({})",
                name,
                args.join(", ")
            ),
            DiagnosticKind::AmbiguousOverload { name, candidates } => format!(
                "Ambiguous call to \"{}\"; candidates are: {}",
                name,
                candidates.join("; ")
            ),
            DiagnosticKind::CannotCast { from, to } => {
                format!("Cannot cast \"{}\" to \"{}\"", from, to)
            }
            DiagnosticKind::CannotAssign { from, to } => {
                format!("Cannot assign type \"{}\" to \"{}\"", from, to)
            }
            DiagnosticKind::NotAReference(ty) => {
                format!("Expression of type \"{}\" is not assignable", ty)
            }
            DiagnosticKind::NotACollection(ty) => format!(
                "The for_each statement requires a collection; type {} is not a collection",
                ty
            ),
            DiagnosticKind::NotAClass(ty) => format!("Type \"{}\" is not a class", ty),
            DiagnosticKind::NotCallable(ty) => {
                format!("Expression of type \"{}\" is not callable", ty)
            }
            DiagnosticKind::ConditionNotBool(ty) => {
                format!("Condition must be of type bool, but got {}", ty)
            }
            DiagnosticKind::UnsupportedRepresentation(rep) => format!(
                "No evaluation functions for machine representation \"{}\"",
                rep
            ),
            DiagnosticKind::ControlFlowOutsideLoop(op) => {
                format!("\"{}\" is only allowed inside a loop", op)
            }
            DiagnosticKind::ReturnOutsideFunction => {
                "\"return\" is only allowed inside a function".into()
            }
            DiagnosticKind::ReturnTypeMismatch { expected, actual } => format!(
                "Type mismatch for return: expected {} but got {}",
                expected, actual
            ),
            DiagnosticKind::CannotInferType(what) => {
                format!("Cannot infer the type of {}", what)
            }
            DiagnosticKind::DidYouMean(s) => format!("Did you mean \"{}\"?", s),
            DiagnosticKind::Raw(s) => s.clone(),
        }
    }
}
