//! Structured match diagnostics.
//!
//! A failed match is recorded as a [`Diagnostic`] value attached to the
//! most specific failing decl node. Matching code only decides the kind,
//! subject and detail; turning a diagnostic into a human-readable message
//! happens in [`Diagnostic::render`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a decl node could not be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No native declaration satisfies the request.
    NotFound,
    /// A declaration was found but it is the wrong kind or its types disagree.
    TypeMismatch,
    /// More than one overload or conversion qualifies.
    AmbiguousMatch,
    /// Structural rule broken: default ordering, diamond inheritance,
    /// output parameter shape, non-transferable results.
    StructuralViolation,
    /// Found outside the required file set.
    FileConstraintViolation,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::NotFound => "not_found",
            DiagnosticKind::TypeMismatch => "type_mismatch",
            DiagnosticKind::AmbiguousMatch => "ambiguous_match",
            DiagnosticKind::StructuralViolation => "structural_violation",
            DiagnosticKind::FileConstraintViolation => "file_constraint_violation",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured match failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The symbolic name that failed to match.
    pub subject: String,
    /// Enclosing native scope, empty for the global scope.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    /// File context, when the failure concerns a specific file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            scope: String::new(),
            file: None,
            detail: detail.into(),
        }
    }

    pub fn not_found(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::NotFound, subject, detail)
    }

    pub fn type_mismatch(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::TypeMismatch, subject, detail)
    }

    pub fn ambiguous(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::AmbiguousMatch, subject, detail)
    }

    pub fn structural(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::StructuralViolation, subject, detail)
    }

    pub fn file_constraint(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::FileConstraintViolation, subject, detail)
    }

    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Render the diagnostic as a human-readable message.
    pub fn render(&self) -> String {
        let place = self.place();
        let mut message = match self.kind {
            DiagnosticKind::NotFound => {
                format!("native symbol \"{}\" not found{}.", self.subject, place)
            }
            DiagnosticKind::TypeMismatch => {
                format!("no matching native declaration for \"{}\"{}.", self.subject, place)
            }
            DiagnosticKind::AmbiguousMatch => {
                format!("ambiguous match for \"{}\"{}.", self.subject, place)
            }
            DiagnosticKind::StructuralViolation => {
                format!("\"{}\"{} cannot be bound as declared.", self.subject, place)
            }
            DiagnosticKind::FileConstraintViolation => format!(
                "declaration \"{}\"{} was found, but not inside the required file.",
                self.subject, place
            ),
        };
        if !self.detail.is_empty() {
            message.push_str("\n    ");
            message.push_str(&self.detail.replace('\n', "\n    "));
        }
        message
    }

    fn place(&self) -> String {
        let mut place = String::new();
        if !self.scope.is_empty() {
            place.push_str(" in ");
            place.push_str(&self.scope);
        }
        if let Some(file) = &self.file {
            place.push_str(" (");
            place.push_str(file);
            place.push(')');
        }
        place
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_render_not_found_with_scope() {
        let diag = Diagnostic::not_found("DeletedFunc", "Are you wrapping a deleted method?")
            .in_scope("::ClassWithDeletedCopyCtor");
        assert_eq!(
            diag.render(),
            "native symbol \"DeletedFunc\" not found in ::ClassWithDeletedCopyCtor.\n    \
             Are you wrapping a deleted method?"
        );
    }

    #[test]
    fn test_diagnostic_render_indents_multiline_detail() {
        let diag = Diagnostic::ambiguous("Foo", "candidate ::Foo(int)\ncandidate ::Foo(long)");
        let rendered = diag.render();
        assert!(rendered.starts_with("ambiguous match for \"Foo\"."));
        assert!(rendered.contains("\n    candidate ::Foo(int)\n    candidate ::Foo(long)"));
    }

    #[test]
    fn test_diagnostic_render_file_context() {
        let diag = Diagnostic::file_constraint("Func", "expects it in the file a.h but found it at b.h:3")
            .in_file("b.h");
        assert!(diag.render().contains("\"Func\" (b.h) was found, but not inside"));
    }

    #[test]
    fn test_diagnostic_serializes_kind_snake_case() {
        let diag = Diagnostic::structural("derive4", "Non-virtual diamond inheritance.");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "structural_violation");
        assert!(json.get("scope").is_none());
    }
}
