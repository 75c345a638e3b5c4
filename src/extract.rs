//! Page extraction: image bytes + schema → validated typed record.
//!
//! [`PageExtractor`] owns the whole boundary with the extraction backend:
//!
//! ```text
//! bytes ──▶ encode ──▶ backend (bounded by timeout) ──▶ cleanup ──▶ serde ──▶ schema checks
//!          EmptyInput      Unavailable                     Malformed    Malformed
//! ```
//!
//! The backend itself sits behind the [`ExtractionBackend`] trait so it can
//! be swapped (any vision LLM via [`crate::pipeline::llm::LlmBackend`]) or
//! scripted in tests. The extractor judges shape only; whether an answer is
//! right is the reconciler's business.

use crate::config::GradingConfig;
use crate::error::ExtractionError;
use crate::pipeline::{encode, postprocess};
use crate::prompts;
use crate::record::{KeyRecord, Record, SubmissionRecord};
use crate::schema::Schema;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One request to the extraction backend.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// The contract the reply must follow.
    pub schema: Schema,
    /// Full instruction text, JSON Schema included.
    pub prompt: String,
    /// The encoded page.
    pub image: ImageData,
    /// Key the submission is graded against, when known before extraction.
    /// Already rendered into `prompt`.
    pub answer_key: Option<KeyRecord>,
}

/// Transport-level failure reported by a backend.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// A service that reads a page image and replies with JSON text.
///
/// Implementations must not keep per-request state: the same backend is
/// shared by concurrent extractions.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short name for logs, e.g. the model id.
    fn name(&self) -> &str;

    /// Produce the raw (unparsed) reply for `request`.
    async fn generate(&self, request: &ExtractionRequest) -> Result<String, BackendError>;
}

/// Converts page images into validated records.
#[derive(Clone)]
pub struct PageExtractor {
    backend: Arc<dyn ExtractionBackend>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
    max_image_pixels: u32,
    key_prompt: Option<String>,
    submission_prompt: Option<String>,
}

impl PageExtractor {
    /// Extractor with default limits (60 s timeout, no retries).
    pub fn new(backend: Arc<dyn ExtractionBackend>) -> Self {
        Self::from_config(backend, &GradingConfig::default())
    }

    /// Extractor using the limits and prompts of `config`.
    pub fn from_config(backend: Arc<dyn ExtractionBackend>, config: &GradingConfig) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            max_image_pixels: config.max_image_pixels,
            key_prompt: config.key_prompt.clone(),
            submission_prompt: config.submission_prompt.clone(),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extract one page into a record of the given schema.
    pub async fn extract(&self, image: &[u8], schema: Schema) -> Result<Record, ExtractionError> {
        let raw = self.request(image, schema, None).await?;
        parse_record(&raw, schema)
    }

    /// Extract an answer-key page.
    pub async fn extract_key(&self, image: &[u8]) -> Result<KeyRecord, ExtractionError> {
        let raw = self.request(image, Schema::Key, None).await?;
        parse_key(&raw)
    }

    /// Extract a student's quiz page.
    pub async fn extract_submission(&self, image: &[u8]) -> Result<SubmissionRecord, ExtractionError> {
        let raw = self.request(image, Schema::Submission, None).await?;
        parse_submission(&raw)
    }

    /// Extract a student's quiz page, showing the backend the key it will be
    /// graded against.
    pub async fn extract_submission_with_key(
        &self,
        image: &[u8],
        key: &KeyRecord,
    ) -> Result<SubmissionRecord, ExtractionError> {
        let raw = self.request(image, Schema::Submission, Some(key)).await?;
        parse_submission(&raw)
    }

    /// Encode the image and call the backend, honouring timeout and retries.
    async fn request(
        &self,
        image: &[u8],
        schema: Schema,
        key: Option<&KeyRecord>,
    ) -> Result<String, ExtractionError> {
        let image = encode::encode_image(image, self.max_image_pixels)?;
        let instruction = match schema {
            Schema::Key => self.key_prompt.as_deref(),
            Schema::Submission => self.submission_prompt.as_deref(),
        };
        let answer_key = key.filter(|_| schema == Schema::Submission).cloned();
        let request = ExtractionRequest {
            schema,
            prompt: prompts::extraction_prompt(schema, instruction, answer_key.as_ref()),
            image,
            answer_key,
        };

        let start = Instant::now();
        let mut last_err = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    schema,
                    attempt,
                    self.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match tokio::time::timeout(self.timeout, self.backend.generate(&request)).await {
                Ok(Ok(raw)) => {
                    info!(
                        "{}: {} replied in {:?} ({} chars)",
                        schema,
                        self.backend.name(),
                        start.elapsed(),
                        raw.len()
                    );
                    return Ok(raw);
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", schema, attempt + 1, e);
                    last_err = e.to_string();
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s",
                        schema,
                        attempt + 1,
                        self.timeout.as_secs()
                    );
                    last_err = format!("timed out after {}s", self.timeout.as_secs());
                }
            }
        }

        Err(ExtractionError::Unavailable { detail: last_err })
    }
}

/// Exponential backoff before retry `attempt` (1-based), saturating.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Parse a raw backend reply into a record of the given schema.
pub fn parse_record(raw: &str, schema: Schema) -> Result<Record, ExtractionError> {
    match schema {
        Schema::Key => parse_key(raw).map(Record::Key),
        Schema::Submission => parse_submission(raw).map(Record::Submission),
    }
}

/// Parse and shape-check an answer-key reply.
pub fn parse_key(raw: &str) -> Result<KeyRecord, ExtractionError> {
    let key: KeyRecord = deserialize(raw, Schema::Key)?;
    if let Some(detail) = key.schema_violation() {
        return Err(malformed(Schema::Key, detail));
    }
    debug!("{}: {} questions", Schema::Key, key.questions.len());
    Ok(key)
}

/// Parse and shape-check a submission reply.
pub fn parse_submission(raw: &str) -> Result<SubmissionRecord, ExtractionError> {
    let submission: SubmissionRecord = deserialize(raw, Schema::Submission)?;
    if let Some(detail) = submission.schema_violation() {
        return Err(malformed(Schema::Submission, detail));
    }
    debug!("{}: {} questions", Schema::Submission, submission.questions.len());
    Ok(submission)
}

fn deserialize<T: DeserializeOwned>(raw: &str, schema: Schema) -> Result<T, ExtractionError> {
    let cleaned = postprocess::clean_json_payload(raw);
    if cleaned.is_empty() {
        return Err(malformed(schema, "empty response".to_string()));
    }
    serde_json::from_str(&cleaned).map_err(|e| {
        warn!("{}: rejected payload: {}", schema, e);
        malformed(schema, e.to_string())
    })
}

fn malformed(schema: Schema, detail: String) -> ExtractionError {
    ExtractionError::Malformed {
        schema: schema.name().to_string(),
        detail,
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One scripted backend behaviour.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Json(String),
        Fail(String),
        Hang,
    }

    /// Backend that answers per schema from a script; falls back to the
    /// last reply once the script for a schema is exhausted.
    #[derive(Default)]
    pub struct ScriptedBackend {
        key: Mutex<VecDeque<Reply>>,
        submission: Mutex<VecDeque<Reply>>,
        pub calls: AtomicUsize,
        pub last_prompt: Mutex<Option<String>>,
        pub last_key: Mutex<Option<KeyRecord>>,
    }

    impl ScriptedBackend {
        pub fn new(key: Vec<Reply>, submission: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                key: Mutex::new(key.into()),
                submission: Mutex::new(submission.into()),
                ..Default::default()
            })
        }

        fn next(&self, schema: Schema) -> Reply {
            let mut queue = match schema {
                Schema::Key => self.key.lock().unwrap(),
                Schema::Submission => self.submission.lock().unwrap(),
            };
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(Reply::Fail("no reply scripted".into()))
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &ExtractionRequest) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
            *self.last_key.lock().unwrap() = request.answer_key.clone();
            match self.next(request.schema) {
                Reply::Json(s) => Ok(s),
                Reply::Fail(e) => Err(BackendError(e)),
                Reply::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Err(BackendError("unreachable".into()))
                }
            }
        }
    }

    pub const KEY_JSON: &str = r#"{
        "name": "Quiz 1",
        "subject": "Intermediate Mathematics",
        "section": "1.1-1.2",
        "assessment_page": 1,
        "book_page": 14,
        "questions": [
            {"number": 1, "question": "In which number does the 6 have a greater value: 7,685 or 6,785?", "answer": ["6,785"], "value": 1},
            {"number": 3, "question": "What is 6 x 7?", "answer": ["42"], "value": 5},
            {"number": 4, "question": "What is the answer to a subtraction problem called?", "answer": ["difference"], "value": 1}
        ]
    }"#;

    pub const SUBMISSION_JSON: &str = r#"{
        "student_name": "Jon Luther White",
        "date": "2024-10-06",
        "name": "Quiz 1",
        "subject": "Intermediate Mathematics",
        "section": "1.1-1.2",
        "page": 1,
        "questions": [
            {"number": 1, "text": "In which number does the 6 have a greater value?", "student_answer": "6785", "generated_answer": "6,785", "correct_value": "fully_correct", "assessment": "The student identified the right number."},
            {"number": 3, "text": "What is 6 x 7?", "student_answer": "42", "correct_value": "fully_correct", "assessment": "The product is right."},
            {"number": 4, "text": "What is the answer to a subtraction problem called?", "student_answer": "", "correct_value": "incorrect", "assessment": "No answer."},
            {"number": 7, "text": "Is 0.233 < 0.33?", "student_answer": "yes", "correct_value": "fully_correct", "assessment": "Correct comparison."}
        ]
    }"#;
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use crate::pipeline::encode::test_png;
    use crate::record::CorrectValue;
    use std::sync::atomic::Ordering;

    #[test]
    fn parses_key_without_field_loss() {
        let key = parse_key(KEY_JSON).unwrap();
        assert_eq!(key.name, "Quiz 1");
        assert_eq!(key.section.as_deref(), Some("1.1-1.2"));
        assert_eq!(key.book_page, 14);
        assert_eq!(key.questions.len(), 3);
        assert_eq!(key.questions[1].answer, vec!["42"]);
        assert_eq!(key.questions[1].value, 5.0);
    }

    #[test]
    fn parses_submission_without_field_loss() {
        let sub = parse_submission(SUBMISSION_JSON).unwrap();
        assert_eq!(sub.student_name, "Jon Luther White");
        assert_eq!(sub.page, Some(1));
        assert_eq!(sub.questions.len(), 4);
        assert_eq!(sub.questions[0].generated_answer.as_deref(), Some("6,785"));
        assert_eq!(sub.questions[2].student_answer, "");
        assert_eq!(sub.questions[2].correct_value, CorrectValue::Incorrect);
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let fenced = format!("```json\n{KEY_JSON}\n```");
        assert!(parse_key(&fenced).is_ok());
    }

    #[test]
    fn missing_required_field_is_malformed() {
        for field in ["\"student_name\": \"Jon Luther White\",", "\"date\": \"2024-10-06\","] {
            let raw = SUBMISSION_JSON.replacen(field, "", 1);
            let err = parse_submission(&raw).unwrap_err();
            assert!(matches!(err, ExtractionError::Malformed { .. }), "{field}: {err:?}");
        }
        let raw = KEY_JSON.replacen("\"book_page\": 14,", "", 1);
        assert!(matches!(parse_key(&raw), Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn wrong_type_is_malformed() {
        let raw = KEY_JSON.replacen("\"book_page\": 14", "\"book_page\": \"fourteen\"", 1);
        assert!(matches!(parse_key(&raw), Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn unknown_enum_member_is_malformed() {
        let raw = SUBMISSION_JSON.replacen("\"incorrect\"", "\"Incorrect\"", 1);
        let err = parse_submission(&raw).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { .. }));
    }

    #[test]
    fn empty_answer_list_is_malformed() {
        let raw = KEY_JSON.replacen("[\"42\"]", "[]", 1);
        let err = parse_key(&raw).unwrap_err();
        assert!(err.to_string().contains("no accepted answer"), "{err}");
    }

    #[test]
    fn missing_assessment_page_defaults() {
        let raw = KEY_JSON.replacen("\"assessment_page\": 1,", "", 1);
        assert_eq!(parse_key(&raw).unwrap().assessment_page, 1);
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_record("I cannot read this page.", Schema::Key),
            Err(ExtractionError::Malformed { .. })
        ));
        assert!(matches!(
            parse_record("", Schema::Submission),
            Err(ExtractionError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn extract_round_trip_through_backend() {
        let backend = ScriptedBackend::new(vec![Reply::Json(KEY_JSON.into())], vec![]);
        let extractor = PageExtractor::new(backend.clone());
        let record = extractor.extract(&test_png(8, 8), Schema::Key).await.unwrap();
        assert_eq!(record.question_count(), 3);
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("get_questions_answers_from_key"));
    }

    #[tokio::test]
    async fn empty_image_never_reaches_backend() {
        let backend = ScriptedBackend::new(vec![Reply::Json(KEY_JSON.into())], vec![]);
        let extractor = PageExtractor::new(backend.clone());
        let err = extractor.extract_key(&[]).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_unavailable() {
        let backend = ScriptedBackend::new(vec![], vec![Reply::Fail("HTTP 503".into())]);
        let extractor = PageExtractor::new(backend);
        let err = extractor.extract_submission(&test_png(8, 8)).await.unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Unavailable {
                detail: "HTTP 503".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out() {
        let backend = ScriptedBackend::new(vec![Reply::Hang], vec![]);
        let extractor = PageExtractor::new(backend).with_timeout(Duration::from_secs(5));
        let err = extractor.extract_key(&test_png(8, 8)).await.unwrap_err();
        match err {
            ExtractionError::Unavailable { detail } => assert!(detail.contains("timed out after 5s")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_recover_from_transient_failure() {
        let backend = ScriptedBackend::new(
            vec![Reply::Fail("HTTP 429".into()), Reply::Json(KEY_JSON.into())],
            vec![],
        );
        let config = GradingConfig::builder().max_retries(2).build().unwrap();
        let extractor = PageExtractor::from_config(backend.clone(), &config);
        let key = extractor.extract_key(&test_png(8, 8)).await.unwrap();
        assert_eq!(key.questions.len(), 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(500, 64), Duration::from_millis(u64::MAX));
        assert_eq!(backoff_delay(500, u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn known_key_reaches_submission_request() {
        let backend = ScriptedBackend::new(vec![], vec![Reply::Json(SUBMISSION_JSON.into())]);
        let extractor = PageExtractor::new(backend.clone());
        let key = parse_key(KEY_JSON).unwrap();

        extractor.extract_submission_with_key(&test_png(8, 8), &key).await.unwrap();
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("ANSWER KEY"));
        assert!(prompt.contains("- Question 3: accepted \"42\"; worth 5 point(s)"));
        assert_eq!(backend.last_key.lock().unwrap().as_ref(), Some(&key));

        extractor.extract_submission(&test_png(8, 8)).await.unwrap();
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(!prompt.contains("ANSWER KEY"));
        assert!(backend.last_key.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn custom_prompt_is_used() {
        let backend = ScriptedBackend::new(vec![], vec![Reply::Json(SUBMISSION_JSON.into())]);
        let config = GradingConfig::builder()
            .submission_prompt("Read the handwritten quiz.")
            .build()
            .unwrap();
        let extractor = PageExtractor::from_config(backend.clone(), &config);
        extractor.extract_submission(&test_png(8, 8)).await.unwrap();
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.starts_with("Read the handwritten quiz."));
    }
}
