//! VLM interaction: build vision messages and call the provider.
//!
//! [`LlmBackend`] adapts any edgequake-llm [`LLMProvider`] to the
//! [`ExtractionBackend`] seam. It is intentionally thin: prompts live in
//! [`crate::prompts`], and timeouts, retries and JSON validation live in
//! [`crate::extract::PageExtractor`].

use crate::config::GradingConfig;
use crate::error::GradeError;
use crate::extract::{BackendError, ExtractionBackend, ExtractionRequest};
use crate::prompts::SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Extraction backend backed by a vision-capable LLM.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &GradingConfig) -> Self {
        Self {
            provider,
            label: config.model.clone().unwrap_or_else(|| "llm".to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

#[async_trait]
impl ExtractionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.label
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: the JSON-only assistant role
    /// 2. **User message**: instruction plus JSON Schema, with the page image
    ///    attached at high detail
    async fn generate(&self, request: &ExtractionRequest) -> Result<String, BackendError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_images(request.prompt.as_str(), vec![request.image.clone()]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| BackendError(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.schema, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Resolve the extraction backend for a run.
///
/// An injected [`GradingConfig::backend`] wins outright; otherwise an LLM
/// provider is resolved via [`resolve_provider`] and wrapped.
pub fn resolve_backend(config: &GradingConfig) -> Result<Arc<dyn ExtractionBackend>, GradeError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmBackend::new(provider, config)))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, GradeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        GradeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`)
/// 2. **Named provider** (`config.provider_name` + `config.model`, model
///    defaulting to [`DEFAULT_MODEL`])
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 4. **OpenAI key** (`OPENAI_API_KEY`), then full auto-detection via
///    [`ProviderFactory::from_env`]
pub fn resolve_provider(config: &GradingConfig) -> Result<Arc<dyn LLMProvider>, GradeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // With several provider keys set, OpenAI wins unless another is named.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| GradeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
