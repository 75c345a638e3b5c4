//! Configuration for extraction and grading.
//!
//! All behaviour is controlled through [`GradingConfig`], built via its
//! [`GradingConfigBuilder`]. Backend credentials, prompts and the matching
//! strategy are passed in explicitly here rather than read from process-wide
//! state, so extraction and reconciliation can each be tested in isolation.

use crate::error::GradeError;
use crate::extract::ExtractionBackend;
use crate::judge::MatchStrategy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a grading run.
///
/// Built via [`GradingConfig::builder()`] or using
/// [`GradingConfig::default()`].
///
/// # Example
/// ```rust
/// use quizgrade::{GradingConfig, MatchStrategy};
///
/// let config = GradingConfig::builder()
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(30)
///     .strategy(MatchStrategy::Exact)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GradingConfig {
    /// LLM model identifier, e.g. "gpt-4o", "claude-sonnet-4-20250514".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extraction backend. Takes precedence over every
    /// provider setting; used for non-LLM backends and in tests.
    pub backend: Option<Arc<dyn ExtractionBackend>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Reading a page is transcription, not generation: the same scan should
    /// produce the same record on every run.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page. Default: 2500.
    pub max_tokens: usize,

    /// Retry attempts on a failed backend call. Default: 0.
    ///
    /// Each attempt re-sends the same immutable request; nothing from a failed
    /// attempt is carried into the next.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-backend-call timeout in seconds. Default: 60.
    ///
    /// A call that exceeds it fails with `ExtractionError::Unavailable`.
    pub api_timeout_secs: u64,

    /// Longest image edge sent to the backend, in pixels. Default: 2048.
    ///
    /// Phone photos of quiz pages are routinely 4000+ px tall; larger images
    /// are downscaled before encoding.
    pub max_image_pixels: u32,

    /// Custom answer-key instruction. If None, uses the built-in prompt.
    pub key_prompt: Option<String>,

    /// Custom submission instruction. If None, uses the built-in prompt.
    pub submission_prompt: Option<String>,

    /// How student answers are compared to accepted answers. Default: Normalized.
    pub strategy: MatchStrategy,

    /// Submissions graded at once by [`crate::stream::grade_stream`]. Default: 4.
    pub concurrency: usize,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            temperature: 0.0,
            max_tokens: 2500,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            max_image_pixels: 2048,
            key_prompt: None,
            submission_prompt: None,
            strategy: MatchStrategy::default(),
            concurrency: 4,
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ExtractionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("strategy", &self.strategy)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl GradingConfig {
    /// Create a new builder for `GradingConfig`.
    pub fn builder() -> GradingConfigBuilder {
        GradingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GradingConfig`].
#[derive(Debug)]
pub struct GradingConfigBuilder {
    config: GradingConfig,
}

impl GradingConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(256);
        self
    }

    pub fn key_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.key_prompt = Some(prompt.into());
        self
    }

    pub fn submission_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.submission_prompt = Some(prompt.into());
        self
    }

    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GradingConfig, GradeError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(GradeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(GradeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(GradeError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.key_prompt.as_deref().is_some_and(|p| p.trim().is_empty())
            || c.submission_prompt.as_deref().is_some_and(|p| p.trim().is_empty())
        {
            return Err(GradeError::InvalidConfig(
                "Custom prompts must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = GradingConfig::default();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_tokens, 2500);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.strategy, MatchStrategy::Normalized);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = GradingConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn blank_prompt_is_rejected() {
        assert!(GradingConfig::builder().key_prompt("   ").build().is_err());
        assert!(GradingConfig::builder()
            .submission_prompt("Read the quiz.")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_clamps() {
        let c = GradingConfig::builder()
            .temperature(7.0)
            .concurrency(0)
            .max_image_pixels(10)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_image_pixels, 256);
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", GradingConfig::default());
        assert!(s.contains("GradingConfig"));
        assert!(s.contains("strategy: Normalized"));
    }
}
