//! Eager grading entry points.
//!
//! ## Why eager vs. streaming?
//!
//! These functions grade one submission and return its report. Use
//! [`crate::stream::grade_stream`] to grade a whole class against one key
//! with bounded concurrency.
//!
//! ## Failure semantics
//!
//! Both pages must extract cleanly before anything is graded. If either
//! fails, the run stops with [`GradeError::Extraction`] naming the side; no
//! partial report is produced.

use crate::config::GradingConfig;
use crate::error::{ExtractionError, GradeError, Side};
use crate::extract::{self, PageExtractor};
use crate::judge::KeyMatchJudge;
use crate::pipeline::{input, llm};
use crate::reconcile::reconcile_with;
use crate::record::{KeyRecord, SubmissionRecord};
use crate::report::GradingReport;
use crate::schema::Schema;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Grade a student's quiz image against an answer-key image.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `key_input` — local path or HTTP/HTTPS URL of the answer-key page
/// * `submission_input` — local path or URL of the completed quiz page
/// * `config` — grading configuration
///
/// # Errors
/// - input errors (file not found, download failure) for either page
/// - [`GradeError::Extraction`] tagged with the failing [`Side`]
/// - [`GradeError::Reconcile`] when a record is structurally invalid
pub async fn grade(
    key_input: impl AsRef<str>,
    submission_input: impl AsRef<str>,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let (key_input, submission_input) = (key_input.as_ref(), submission_input.as_ref());
    info!("Grading '{}' against key '{}'", submission_input, key_input);

    // ── Step 1: Resolve inputs ───────────────────────────────────────────
    let (key_src, sub_src) = tokio::try_join!(
        input::resolve_image(key_input, config.download_timeout_secs),
        input::resolve_image(submission_input, config.download_timeout_secs),
    )?;

    // ── Step 2: Extract and grade ────────────────────────────────────────
    grade_images(&key_src.bytes, &sub_src.bytes, config).await
}

/// Grade from in-memory page images.
///
/// The two extractions run concurrently; neither buffer is modified.
pub async fn grade_images(
    key_image: &[u8],
    submission_image: &[u8],
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let start = Instant::now();
    let extractor = PageExtractor::from_config(llm::resolve_backend(config)?, config);

    let (key, submission) = tokio::join!(
        observed(config, Side::Key, extractor.extract_key(key_image), key_questions),
        observed(config, Side::Submission, extractor.extract_submission(submission_image), submission_questions),
    );
    // Key failures win: without a key nothing can be graded.
    let key = key?;
    let submission = submission?;

    let report = reconcile_records(&key, &submission, config)?;
    info!(
        "Graded {} questions for '{}' in {:?}",
        report.entries.len(),
        report.student_name,
        start.elapsed()
    );
    Ok(report)
}

/// Grade a quiz image against a previously extracted key.
///
/// Saves a backend round-trip per submission when a class shares one key;
/// see [`load_key`].
pub async fn grade_with_key(
    key: &KeyRecord,
    submission_input: impl AsRef<str>,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let extractor = PageExtractor::from_config(llm::resolve_backend(config)?, config);
    grade_against(&extractor, key, submission_input.as_ref(), config).await
}

/// Synchronous wrapper around [`grade`].
///
/// Creates a temporary tokio runtime internally.
pub fn grade_sync(
    key_input: impl AsRef<str>,
    submission_input: impl AsRef<str>,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| GradeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(grade(key_input, submission_input, config))
}

/// Grade and write the report as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn grade_to_file(
    key_input: impl AsRef<str>,
    submission_input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let report = grade(key_input, submission_input, config).await?;
    write_json_atomic(&report, output_path.as_ref()).await?;
    Ok(report)
}

/// Extract an answer key without grading anything.
pub async fn extract_key(input: impl AsRef<str>, config: &GradingConfig) -> Result<KeyRecord, GradeError> {
    let src = input::resolve_image(input.as_ref(), config.download_timeout_secs).await?;
    let extractor = PageExtractor::from_config(llm::resolve_backend(config)?, config);
    observed(config, Side::Key, extractor.extract_key(&src.bytes), key_questions).await
}

/// Extract a student's submission without grading it.
pub async fn extract_submission(
    input: impl AsRef<str>,
    config: &GradingConfig,
) -> Result<SubmissionRecord, GradeError> {
    let src = input::resolve_image(input.as_ref(), config.download_timeout_secs).await?;
    let extractor = PageExtractor::from_config(llm::resolve_backend(config)?, config);
    observed(config, Side::Submission, extractor.extract_submission(&src.bytes), submission_questions)
    .await
}

/// Load a key previously written by [`save_key`].
///
/// The file is held to the same contract as a fresh extraction: a payload
/// that is not UTF-8 or does not match the key schema is `Malformed` on the
/// key side.
pub async fn load_key(path: impl AsRef<Path>) -> Result<KeyRecord, GradeError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => GradeError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => GradeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => GradeError::KeyReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    let text = String::from_utf8(bytes).map_err(|e| {
        GradeError::extraction(
            Side::Key,
            ExtractionError::Malformed {
                schema: Schema::Key.name().to_string(),
                detail: format!("{} is not UTF-8: {}", path.display(), e),
            },
        )
    })?;
    let key = extract::parse_key(&text).map_err(|e| GradeError::extraction(Side::Key, e))?;
    key.validate()?;
    Ok(key)
}

/// Write an extracted key as pretty JSON (atomic).
pub async fn save_key(key: &KeyRecord, path: impl AsRef<Path>) -> Result<(), GradeError> {
    write_json_atomic(key, path.as_ref()).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Extract one submission input and grade it against an extracted key.
///
/// The key is known up front here, so the backend sees it while reading.
pub(crate) async fn grade_against(
    extractor: &PageExtractor,
    key: &KeyRecord,
    submission_input: &str,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let src = input::resolve_image(submission_input, config.download_timeout_secs).await?;
    let submission = observed(
        config,
        Side::Submission,
        extractor.extract_submission_with_key(&src.bytes, key),
        submission_questions,
    )
    .await?;
    reconcile_records(key, &submission, config)
}

fn reconcile_records(
    key: &KeyRecord,
    submission: &SubmissionRecord,
    config: &GradingConfig,
) -> Result<GradingReport, GradeError> {
    let report = reconcile_with(&KeyMatchJudge::new(config.strategy), key, submission)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_grading_complete(report.entries.len());
    }
    Ok(report)
}

/// Run one extraction, reporting progress and tagging failures with `side`.
async fn observed<T, F>(
    config: &GradingConfig,
    side: Side,
    extraction: F,
    questions: impl Fn(&T) -> usize,
) -> Result<T, GradeError>
where
    F: Future<Output = Result<T, ExtractionError>>,
{
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_extraction_start(side);
    }
    match extraction.await {
        Ok(record) => {
            if let Some(cb) = cb {
                cb.on_extraction_complete(side, questions(&record));
            }
            Ok(record)
        }
        Err(e) => {
            warn!("Extraction of the {} failed: {}", side, e);
            if let Some(cb) = cb {
                cb.on_extraction_error(side, &e.to_string());
            }
            Err(GradeError::extraction(side, e))
        }
    }
}

fn key_questions(key: &KeyRecord) -> usize {
    key.questions.len()
}

fn submission_questions(submission: &SubmissionRecord) -> usize {
    submission.questions.len()
}

async fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), GradeError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GradeError::Internal(format!("Failed to serialise JSON: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GradeError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| GradeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| GradeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}
