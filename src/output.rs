//! JSON output types for the `declmatch` binary.
//!
//! Every response is a single JSON object with `status` as its first field
//! and a `schema_version`. Field order and array order are deterministic so
//! the same pass always prints the same bytes.

use std::io::{self, Write};

use serde::Serialize;

use declmatch_core::{DeclTree, MatchError, MatchReport, OutputErrorCode};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

/// One rendered diagnostic in a summary.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSummary {
    /// Dotted path of the node (`Klass.Method`).
    pub path: String,
    pub kind: String,
    pub message: String,
}

/// Outcome counts and rendered diagnostics of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub matched: usize,
    pub failed: usize,
    pub pending: usize,
    pub diagnostics: Vec<DiagnosticSummary>,
}

impl From<&MatchReport> for Summary {
    fn from(report: &MatchReport) -> Self {
        Summary {
            matched: report.matched,
            failed: report.failed,
            pending: report.pending,
            diagnostics: report
                .diagnostics
                .iter()
                .map(|d| DiagnosticSummary {
                    path: d.path.clone(),
                    kind: d.diagnostic.kind.as_str().to_string(),
                    message: d.message.clone(),
                })
                .collect(),
        }
    }
}

/// Response for `declmatch match`.
#[derive(Debug, Serialize)]
pub struct MatchResponse<'a> {
    /// "ok" when every node matched, "unmatched" otherwise.
    pub status: String,
    pub schema_version: String,
    pub summary: Summary,
    pub tree: &'a DeclTree,
}

impl<'a> MatchResponse<'a> {
    pub fn new(tree: &'a DeclTree, report: &MatchReport) -> Self {
        let status = if report.all_matched() { "ok" } else { "unmatched" };
        MatchResponse {
            status: status.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            summary: Summary::from(report),
            tree,
        }
    }
}

/// Error details for error responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: u8,
    pub message: String,
}

impl ErrorInfo {
    pub fn from_error(err: &MatchError) -> Self {
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
        }
    }
}

/// Response for a pass that failed as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Always "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn new(err: &MatchError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Emit a response as pretty JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}
