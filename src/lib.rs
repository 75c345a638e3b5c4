//! # quizgrade
//!
//! Grade photographed quizzes against an answer key using Vision Language
//! Models (VLMs).
//!
//! ## Why this crate?
//!
//! A teacher has two kinds of paper: the answer key and a pile of completed
//! quizzes. This crate reads both with a VLM into strictly typed records
//! (schema-constrained extraction), then grades each answer against the key
//! with a deterministic, pure reconciler. The VLM does the reading; the
//! grading decision stays inspectable and testable.
//!
//! ## Pipeline Overview
//!
//! ```text
//! key image ──────┐
//!                 ├─ 1. Input    resolve local file or download from URL
//! quiz image ─────┤  2. Encode   validate, downscale, base64 ImageData
//!                 ├─ 3. Extract  VLM call per page (concurrent), JSON → record
//!                 ├─ 4. Reconcile match by question number, judge each answer
//!                 └─ 5. Report   GradingReport + score summary
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizgrade::{grade, GradingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = GradingConfig::default();
//!     let report = grade("key.jpg", "student.jpg", &config).await?;
//!     println!("{}", report.to_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Grading without a VLM
//!
//! [`reconcile`] is a pure function over two records, so records loaded
//! from JSON or built by hand can be graded with no network at all.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `quizgrade` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! quizgrade = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod consistency;
pub mod error;
pub mod extract;
pub mod grade;
pub mod judge;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GradingConfig, GradingConfigBuilder};
pub use consistency::{analyze_consistency, ConsistencyAnalysis};
pub use error::{ExtractionError, GradeError, ReconcileError, Side};
pub use extract::{BackendError, ExtractionBackend, ExtractionRequest, PageExtractor};
pub use grade::{
    extract_key, extract_submission, grade, grade_images, grade_sync, grade_to_file, grade_with_key,
    load_key, save_key,
};
pub use judge::{AnswerJudge, Judgement, KeyMatchJudge, MatchStrategy};
pub use progress::{GradingProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reconcile::{reconcile, reconcile_with};
pub use record::{CorrectValue, KeyQuestion, KeyRecord, Record, SubmissionQuestion, SubmissionRecord};
pub use report::{GradedQuestion, GradingReport, ScoreSummary};
pub use schema::Schema;
pub use stream::{grade_stream, SubmissionStream};
