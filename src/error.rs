use std::fmt;

use serde::{Deserialize, Serialize};

use crate::names::SnippetId;

/// Byte offset range in source text.
pub type Span = (usize, usize);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no such snippet: {0}")]
    NoSuchSnippet(SnippetId),
    #[error("snippet {0} is not a declaration and cannot be dropped")]
    NotDroppable(SnippetId),
    #[error("the session has been closed")]
    Closed,
    #[error("internal consistency error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler diagnostic attached to a snippet. `code` is stable across
/// releases (`cyclic.inheritance`, `cant.resolve.location`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diag {
    pub code: String,
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl Diag {
    pub fn error(code: &str, span: Span, message: impl Into<String>) -> Self {
        Diag {
            code: code.to_string(),
            severity: Severity::Error,
            span,
            message: message.into(),
        }
    }

    pub fn warning(code: &str, span: Span, message: impl Into<String>) -> Self {
        Diag {
            code: code.to_string(),
            severity: Severity::Warning,
            span,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

/// Format a diagnostic with source context, showing the offending line and a caret
/// run under the span.
pub fn format_diag(source: &str, diag: &Diag) -> String {
    let (line_num, col, line_text) = offset_to_line_col(source, diag.span.0);
    let width = diag
        .span
        .1
        .saturating_sub(diag.span.0)
        .clamp(1, line_text.len().saturating_sub(col - 1).max(1));
    format!(
        "{}\n  --> {}:{}\n   | {}\n   | {}{}",
        diag,
        line_num,
        col,
        line_text,
        " ".repeat(col.saturating_sub(1)),
        "^".repeat(width)
    )
}

/// 1-based line number of a byte offset.
pub fn line_of(source: &str, offset: usize) -> usize {
    offset_to_line_col(source, offset).0
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(source.len());
    let mut line_start = 0;
    let mut line_num = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line_start = i + 1;
            line_num += 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());
    let col = offset - line_start + 1;
    (line_num, col, &source[line_start..line_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_points_at_span() {
        let src = "int x = \"a\";";
        let d = Diag::error("prob.found.req", (8, 11), "incompatible types");
        let out = format_diag(src, &d);
        assert!(out.starts_with("Error: incompatible types"));
        assert!(out.ends_with("   |         ^^^"));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let src = "void f() {\n  g();\n}";
        assert_eq!(line_of(src, 0), 1);
        assert_eq!(line_of(src, 13), 2);
        assert_eq!(line_of(src, src.len()), 3);
    }

    #[test]
    fn warning_label() {
        let d = Diag::warning("modifier.ignored", (0, 6), "Modifier 'public' not permitted");
        assert!(!d.is_error());
        assert_eq!(d.to_string(), "Warning: Modifier 'public' not permitted");
    }
}
