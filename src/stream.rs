//! Batch grading API: grade a class against one key, emitting reports as
//! they complete.
//!
//! ## Why stream?
//!
//! A class set is dozens of pages, each a backend round-trip of several
//! seconds. A stream lets callers show results as they arrive and keeps the
//! number of in-flight backend calls bounded by
//! [`GradingConfig::concurrency`].
//!
//! Reports arrive in completion order, each paired with the input it came
//! from. One failed submission never affects the others: each submission is
//! resolved, extracted and reconciled independently, and only the immutable
//! key is shared.

use crate::config::GradingConfig;
use crate::error::GradeError;
use crate::extract::PageExtractor;
use crate::grade::grade_against;
use crate::pipeline::llm;
use crate::record::KeyRecord;
use crate::report::GradingReport;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One batch item: the submission input and its outcome.
pub type SubmissionResult = (String, Result<GradingReport, GradeError>);

/// A boxed stream of batch results.
pub type SubmissionStream = Pin<Box<dyn Stream<Item = SubmissionResult> + Send>>;

/// Grade many submissions against one extracted key.
///
/// # Returns
/// - `Ok(SubmissionStream)` — one item per input, in completion order
/// - `Err(GradeError)` — the key is invalid or no backend is configured
///
/// # Example
/// ```rust,no_run
/// use quizgrade::{grade_stream, load_key, GradingConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let key = load_key("quiz1-key.json").await?;
/// let config = GradingConfig::builder().concurrency(8).build()?;
/// let mut reports = grade_stream(&key, ["alice.jpg", "bob.jpg"], &config)?;
/// while let Some((input, result)) = reports.next().await {
///     match result {
///         Ok(report) => println!("{input}: {:?}", report.summary.grade_percent),
///         Err(e) => eprintln!("{input}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn grade_stream<I, S>(
    key: &KeyRecord,
    submission_inputs: I,
    config: &GradingConfig,
) -> Result<SubmissionStream, GradeError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    key.validate()?;
    let extractor = PageExtractor::from_config(llm::resolve_backend(config)?, config);

    let inputs: Vec<String> = submission_inputs.into_iter().map(Into::into).collect();
    info!(
        "Grading {} submissions against '{}' ({} at a time)",
        inputs.len(),
        key.name,
        config.concurrency
    );

    let key = Arc::new(key.clone());
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(inputs.into_iter().map(move |input| {
        let extractor = extractor.clone();
        let key = Arc::clone(&key);
        let cfg = config.clone();
        async move {
            let result = grade_against(&extractor, &key, &input, &cfg).await;
            (input, result)
        }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Side;
    use crate::extract::mock::{Reply, ScriptedBackend, KEY_JSON, SUBMISSION_JSON};
    use crate::extract::parse_key;
    use crate::pipeline::encode::test_png;
    use std::collections::HashMap;

    #[tokio::test]
    async fn each_submission_gets_its_own_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let empty = dir.path().join("empty.png");
        std::fs::write(&good, test_png(8, 8)).unwrap();
        std::fs::write(&empty, b"").unwrap();
        let missing = dir.path().join("missing.png");

        let backend = ScriptedBackend::new(vec![], vec![Reply::Json(SUBMISSION_JSON.into())]);
        let config = GradingConfig::builder()
            .backend(backend)
            .concurrency(2)
            .build()
            .unwrap();
        let key = parse_key(KEY_JSON).unwrap();

        let inputs = [&good, &empty, &missing].map(|p| p.to_str().unwrap().to_string());
        let results: HashMap<String, Result<GradingReport, GradeError>> =
            grade_stream(&key, inputs.clone(), &config).unwrap().collect().await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[&inputs[0]].as_ref().unwrap().entries.len(), 4);
        assert_eq!(
            results[&inputs[1]].as_ref().unwrap_err().failed_side(),
            Some(Side::Submission)
        );
        assert!(matches!(
            results[&inputs[2]],
            Err(GradeError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn key_is_shown_with_every_submission() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.png");
        std::fs::write(&page, test_png(8, 8)).unwrap();

        let backend = ScriptedBackend::new(vec![], vec![Reply::Json(SUBMISSION_JSON.into())]);
        let config = GradingConfig::builder().backend(backend.clone()).build().unwrap();
        let key = parse_key(KEY_JSON).unwrap();

        let page = page.to_str().unwrap().to_string();
        let results: Vec<_> = grade_stream(&key, [page.clone(), page], &config).unwrap().collect().await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(backend.last_key.lock().unwrap().as_ref(), Some(&key));
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("- Question 1: accepted \"6,785\"; worth 1 point(s)"));
    }

    #[test]
    fn invalid_key_is_rejected_up_front() {
        let backend = ScriptedBackend::new(vec![], vec![]);
        let config = GradingConfig::builder().backend(backend).build().unwrap();
        let mut key = parse_key(KEY_JSON).unwrap();
        key.questions.push(key.questions[0].clone());
        assert!(matches!(
            grade_stream(&key, Vec::<String>::new(), &config),
            Err(GradeError::Reconcile(_))
        ));
    }
}
