use crate::{Diagnostic, SourceFile, SourcePos};

fn push_snippet(out: &mut String, source: Option<&SourceFile>, pos: &SourcePos, gutter: &str) {
    let Some(line_text) = source.and_then(|s| s.text.line(pos.line)) else {
        return;
    };
    out.push('\n');
    out.push_str(gutter);
    out.push_str(line_text);
    out.push('\n');
    out.push_str(gutter);
    let col = (pos.column as usize).min(line_text.chars().count());
    out.extend(std::iter::repeat_n(' ', col));
    out.push('^');
}

/// Renders one diagnostic. The source, when given, supplies the offending
/// line for the caret snippet.
pub fn render_diagnostic(source: Option<&SourceFile>, diag: &Diagnostic) -> String {
    let code_str = diag.code.map(|c| format!(" [{c}]")).unwrap_or_default();
    let mut out = match &diag.pos {
        Some(pos) => format!("{:?}{}: {}: {}", diag.severity, code_str, pos, diag.message),
        None => format!("{:?}{}: {}", diag.severity, code_str, diag.message),
    };
    if let Some(pos) = &diag.pos {
        push_snippet(&mut out, source, pos, "  | ");
    }
    if let Some(s) = &diag.suggestion {
        out.push_str("\n  = suggestion: ");
        out.push_str(s);
    }
    for label in &diag.labels {
        out.push_str("\n  = note: ");
        out.push_str(&label.message);
        out.push_str(&format!(" ({})", label.pos));
        push_snippet(&mut out, source, &label.pos, "    | ");
    }
    if let Some(h) = &diag.help {
        out.push_str("\n  = help: ");
        out.push_str(h);
    }
    out
}

pub fn render_diagnostics(source: Option<&SourceFile>, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for (idx, d) in diagnostics.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(&render_diagnostic(source, d));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiagnosticKind, Severity};

    #[test]
    fn renders_position_and_caret() {
        let src = SourceFile::new("t.mu", "int x = 1;\nfoo(x);\n".to_string());
        let d = Diagnostic::new(
            Severity::Error,
            DiagnosticKind::UnresolvedFunctionCall("foo".into()),
            Some(SourcePos::in_file("t.mu", 1, 0)),
        );
        let s = render_diagnostic(Some(&src), &d);
        assert!(s.starts_with("Error [E0005]: t.mu:2:1: Unresolved function call"));
        assert!(s.contains("  | foo(x);\n  | ^"));
    }
}
