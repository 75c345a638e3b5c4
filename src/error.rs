//! Error types for the quizgrade library.
//!
//! Three layers of errors mirror the three boundaries of the pipeline:
//!
//! * [`ExtractionError`] — one page could not be turned into a typed record
//!   (unreadable image, backend down, response not matching the schema).
//!
//! * [`ReconcileError`] — the records handed to the reconciler are
//!   structurally broken (duplicate question numbers). Missing or ambiguous
//!   answers are *not* errors; they grade as `undetermined`.
//!
//! * [`GradeError`] — **Fatal** for a grading run. Returned by the top-level
//!   `grade*` functions. Extraction failures are wrapped together with the
//!   [`Side`] that failed so the caller can tell a bad answer-key scan from a
//!   bad student scan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which page of a grading run an error or event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The answer-key page.
    Key,
    /// The student's completed quiz page.
    Submission,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Key => f.write_str("answer key"),
            Side::Submission => f.write_str("submission"),
        }
    }
}

/// Failure to extract a typed record from a page image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The image was zero-length or could not be decoded.
    #[error("image is empty or unreadable: {detail}")]
    EmptyInput { detail: String },

    /// The backend answered, but the payload does not match the schema
    /// (missing required field, wrong type, unknown enum member).
    #[error("response does not match schema '{schema}': {detail}")]
    Malformed { schema: String, detail: String },

    /// The backend could not be reached, returned an error, or timed out.
    #[error("extraction backend unavailable: {detail}")]
    Unavailable { detail: String },
}

/// Structural failure of the reconciler's inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// A record violates its invariants (e.g. duplicate question numbers).
    #[error("invalid {side} record: {reason}")]
    InvalidInput { side: Side, reason: String },
}

/// All fatal errors returned by the quizgrade library.
#[derive(Debug, Error)]
pub enum GradeError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// Extraction of one side failed; no grading was attempted.
    #[error("Failed to extract the {side}: {source}")]
    Extraction {
        side: Side,
        #[source]
        source: ExtractionError,
    },

    // ── Reconciliation errors ─────────────────────────────────────────────
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input image was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A saved key file exists but could not be read (e.g. it is a directory).
    #[error("Failed to read key file '{path}': {source}")]
    KeyReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GradeError {
    /// Tag an extraction failure with the side it happened on.
    pub fn extraction(side: Side, source: ExtractionError) -> Self {
        GradeError::Extraction { side, source }
    }

    /// The side whose extraction failed, if this is an extraction error.
    pub fn failed_side(&self) -> Option<Side> {
        match self {
            GradeError::Extraction { side, .. } => Some(*side),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_names_the_side() {
        let e = GradeError::extraction(
            Side::Key,
            ExtractionError::Unavailable {
                detail: "timed out after 60s".into(),
            },
        );
        let msg = e.to_string();
        assert!(msg.contains("answer key"), "got: {msg}");
        assert!(msg.contains("60s"), "got: {msg}");
        assert_eq!(e.failed_side(), Some(Side::Key));

        let e = GradeError::extraction(
            Side::Submission,
            ExtractionError::EmptyInput {
                detail: "0 bytes".into(),
            },
        );
        assert!(e.to_string().contains("submission"));
        assert_eq!(e.failed_side(), Some(Side::Submission));
    }

    #[test]
    fn malformed_display_includes_schema() {
        let e = ExtractionError::Malformed {
            schema: "get_answers_from_student_quiz".into(),
            detail: "missing field `student_name`".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("get_answers_from_student_quiz"));
        assert!(msg.contains("student_name"));
    }

    #[test]
    fn reconcile_error_converts() {
        let e: GradeError = ReconcileError::InvalidInput {
            side: Side::Key,
            reason: "duplicate question number 3".into(),
        }
        .into();
        assert!(e.to_string().contains("duplicate question number 3"));
        assert_eq!(e.failed_side(), None);
    }

    #[test]
    fn side_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&Side::Submission).unwrap(), "\"submission\"");
    }
}
