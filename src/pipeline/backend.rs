//! The model boundary: [`VisionBackend`] and its `edgequake-llm` implementation.
//!
//! The driver never talks to an LLM client directly. It hands a backend
//! either the analysis sample or one unit (context + page images) and gets
//! raw text back. Everything model-specific (message layout, sampling options,
//! retries) lives behind this trait, and tests swap in a scripted backend.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are transient and frequent under load. Exponential
//! backoff (`retry_backoff_ms * 2^attempt`) spaces attempts out: with 500 ms
//! base and 3 retries the wait sequence is 500 ms → 1 s → 2 s.
//!
//! Retries belong to the backend. The caller's timeout wraps the whole
//! retry loop, so a slow provider cannot stall a unit past it.

use crate::config::{output_token_budget, ConversionConfig};
use crate::output::DocumentMetadata;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use pdfweave_core::{ProviderId, UnitContext};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Text returned by a backend plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl RawResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// One conversion call: the unit's context and its page images.
pub struct UnitRequest<'a> {
    pub context: &'a UnitContext,
    /// 1-indexed pages matching `images`.
    pub pages: &'a [usize],
    pub images: Vec<ImageData>,
}

/// The structure-analysis call over the first pages of the document.
pub struct AnalysisRequest<'a> {
    /// 1-indexed pages matching `images`.
    pub pages: &'a [usize],
    pub page_count: usize,
    pub metadata: &'a DocumentMetadata,
    pub images: Vec<ImageData>,
}

/// A backend call that failed after all retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct BackendError {
    pub retries: u32,
    pub detail: String,
}

/// Something that can look at page images and answer in text.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Human-readable name for logs and output, e.g. `"openai/gpt-4.1-nano"`.
    fn name(&self) -> &str;

    /// The known provider behind this backend, if any. Used to bound window
    /// size by the provider's image limit.
    fn provider_id(&self) -> Option<ProviderId> {
        None
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<RawResponse, BackendError>;

    async fn convert(&self, request: UnitRequest<'_>) -> Result<RawResponse, BackendError>;
}

/// [`VisionBackend`] over an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    id: Option<ProviderId>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_output_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            id: None,
            system_prompt: prompts::conversion_system_prompt(config),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    pub fn with_provider_id(mut self, id: ProviderId) -> Self {
        self.id = Some(id);
        self
    }

    fn options(&self, pages: usize) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(output_token_budget(
                self.max_tokens,
                self.max_output_tokens,
                pages,
            )),
            ..Default::default()
        }
    }

    async fn chat_with_retry(
        &self,
        what: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<RawResponse, BackendError> {
        let start = Instant::now();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    what, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(messages, Some(options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        what,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(RawResponse {
                        text: response.content,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                    });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed: {}", what, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(BackendError {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl VisionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.label
    }

    fn provider_id(&self) -> Option<ProviderId> {
        self.id
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<RawResponse, BackendError> {
        let messages = analysis_messages(&request);
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };
        self.chat_with_retry("Analysis", &messages, &options).await
    }

    async fn convert(&self, request: UnitRequest<'_>) -> Result<RawResponse, BackendError> {
        let what = format!("Unit {}", request.context.position.unit_index + 1);
        let options = self.options(request.pages.len());
        let messages = unit_messages(&self.system_prompt, request);
        self.chat_with_retry(&what, &messages, &options).await
    }
}

/// Message layout for a conversion call:
/// 1. the conversion system prompt;
/// 2. the rendered unit context;
/// 3. a user turn carrying the page images in order.
pub fn unit_messages(system_prompt: &str, request: UnitRequest<'_>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::system(prompts::unit_context_message(request.context)),
        ChatMessage::user_with_images(prompts::unit_instruction(request.pages), request.images),
    ]
}

fn analysis_messages(request: &AnalysisRequest<'_>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompts::ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user_with_images(
            prompts::analysis_instruction(request.pages, request.page_count, request.metadata),
            request.images.clone(),
        ),
    ]
}

/// Delay before retry `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfweave_core::{
        assemble_context, plan_pages, ContextOptions, ContinuityState, DocumentProfile,
    };

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(u64::MAX, 5), u64::MAX);
    }

    #[test]
    fn unit_messages_are_system_context_images() {
        let windows = plan_pages(&[], 3);
        let ctx = assemble_context(
            &windows[1],
            &DocumentProfile::minimal(3),
            &ContinuityState::new(),
            &[],
            3,
            &ContextOptions::default(),
        );
        let request = UnitRequest {
            context: &ctx,
            pages: &[2],
            images: vec![ImageData::new(String::from("aGVsbG8="), "image/png")],
        };
        assert_eq!(unit_messages("prompt", request).len(), 3);
    }

    #[test]
    fn analysis_messages_carry_instruction() {
        let meta = DocumentMetadata::default();
        let request = AnalysisRequest {
            pages: &[1, 2],
            page_count: 40,
            metadata: &meta,
            images: Vec::new(),
        };
        assert_eq!(analysis_messages(&request).len(), 2);
    }
}
