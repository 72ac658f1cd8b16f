//! Slide-content generation: prompt the language model and parse its reply.
//!
//! The model is reached through the [`TextGenerator`] trait. Two
//! implementations ship with the crate:
//!
//! - [`ProviderGenerator`] wraps any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Gemini, Ollama, ...) resolved the same way the CLI resolves
//!   providers for other tools in this family.
//! - [`GeminiGenerator`] calls the Gemini `generateContent` REST endpoint
//!   with an API key passed in explicitly by the caller.
//!
//! Tests inject their own implementation via
//! [`crate::config::PresentationConfig::generator`].
//!
//! ## Retry Strategy
//!
//! Each attempt is bounded by `api_timeout_secs`. Failed attempts are retried
//! up to `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`). Bad-request and authentication
//! failures are not retried, and neither is a reply that parsed but holds
//! too few slides: asking again with the same prompt rarely changes that.

use crate::config::PresentationConfig;
use crate::error::{ServiceError, SlidesError};
use crate::pipeline::parse::{enforce_slide_bounds, parse_slides};
use crate::prompts;
use crate::request::SourceMaterial;
use crate::slide::SlideRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Default model for the Gemini REST client.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default model when a provider is named without one.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-mini";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Generator seam ───────────────────────────────────────────────────────────

/// One generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Text returned by a generator, with token usage when the service reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A generative language service that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short label for logs, e.g. `"gemini:gemini-2.0-flash"`.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ServiceError>;
}

// ── edgequake-llm provider adapter ───────────────────────────────────────────

/// [`TextGenerator`] backed by an `edgequake_llm` provider.
pub struct ProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for ProviderGenerator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ServiceError> {
        let messages = vec![
            ChatMessage::system(&prompt.system),
            ChatMessage::user(&prompt.user),
        ];
        let options = CompletionOptions {
            temperature: Some(prompt.temperature),
            max_tokens: Some(prompt.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ServiceError::Provider(e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }

        Ok(Generation {
            text: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

// ── Gemini REST client ───────────────────────────────────────────────────────

/// [`TextGenerator`] calling Gemini's `generateContent` endpoint directly.
///
/// The API key is owned by this value; nothing is read from or written to
/// the process environment.
pub struct GeminiGenerator {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    label: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: Option<&str>) -> Result<Self, SlidesError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("edgequake-slides/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SlidesError::Internal(format!("HTTP client: {e}")))?;
        let model = model.unwrap_or(DEFAULT_GEMINI_MODEL).to_string();
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            label: format!("gemini:{model}"),
            model,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point the client at another API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ServiceError> {
        let url = self.endpoint();
        debug!(url = %url, "Calling Gemini generateContent");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request_body(prompt))
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Network(format!("invalid response body: {e}")))?;

        parsed.into_generation()
    }
}

fn gemini_request_body(prompt: &Prompt) -> serde_json::Value {
    serde_json::json!({
        "systemInstruction": { "parts": [{ "text": prompt.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        "generationConfig": {
            "temperature": prompt.temperature,
            "maxOutputTokens": prompt.max_tokens,
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

impl GeminiResponse {
    fn into_generation(self) -> Result<Generation, ServiceError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }

        let usage = self.usage_metadata.unwrap_or_default();
        Ok(Generation {
            text,
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
        })
    }
}

// ── Generator resolution ─────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SlidesError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SlidesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the text generator, from most-specific to least-specific.
///
/// 1. **Injected generator** (`config.generator`), used as-is.
/// 2. **Pre-built provider** (`config.provider`).
/// 3. **Explicit Gemini key** (`config.api_key`), via the REST client.
/// 4. **Named provider + model** (`config.provider_name`) through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key variable.
/// 5. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 6. **`GEMINI_API_KEY`**, via the REST client.
/// 7. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_generator(config: &PresentationConfig) -> Result<Arc<dyn TextGenerator>, SlidesError> {
    if let Some(ref generator) = config.generator {
        return Ok(Arc::clone(generator));
    }

    if let Some(ref provider) = config.provider {
        let label = config.provider_name.as_deref().unwrap_or("custom");
        return Ok(Arc::new(ProviderGenerator::new(Arc::clone(provider), label)));
    }

    if let Some(ref key) = config.api_key {
        if !key.trim().is_empty() {
            return Ok(Arc::new(GeminiGenerator::new(key.trim(), config.model.as_deref())?));
        }
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(match name.as_str() {
            "gemini" => DEFAULT_GEMINI_MODEL,
            _ => DEFAULT_PROVIDER_MODEL,
        });
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderGenerator::new(provider, format!("{name}:{model}"))));
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        let provider = create_provider(&prov, &model)?;
        return Ok(Arc::new(ProviderGenerator::new(provider, format!("{prov}:{model}"))));
    }

    if let Some(key) = non_empty_env("GEMINI_API_KEY") {
        return Ok(Arc::new(GeminiGenerator::new(key, config.model.as_deref())?));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SlidesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No language model could be auto-detected from the environment.\n\
                Pass an API key (--api-key / GEMINI_API_KEY), or set OPENAI_API_KEY, \
                ANTHROPIC_API_KEY, or EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderGenerator::new(llm_provider, "auto")))
}

// ── Slide generation ─────────────────────────────────────────────────────────

/// Validated slides plus generation statistics.
#[derive(Debug, Clone)]
pub struct GeneratedSlides {
    pub slides: Vec<SlideRecord>,
    /// Entries dropped as invalid by the parser in the accepted reply.
    pub dropped: usize,
    /// Generation calls made, including the successful one.
    pub attempts: u32,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub duration_ms: u64,
}

/// Longest wait between two generation attempts.
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// Delay before retry number `retry` (1-indexed): `base * 2^(retry-1)`,
/// capped at [`MAX_RETRY_BACKOFF_MS`].
pub fn retry_backoff_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_RETRY_BACKOFF_MS)
}

/// Build the prompt for a request.
pub fn build_prompt(source: &SourceMaterial, title: &str, config: &PresentationConfig) -> Prompt {
    Prompt {
        system: prompts::system_prompt(
            config.system_prompt.as_deref(),
            config.min_slides,
            config.max_slides,
        ),
        user: prompts::user_prompt(source, title, config.max_source_chars),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Generate and validate slide records for `source`.
///
/// # Errors
/// - [`SlidesError::GenerationService`] when every attempt failed, timed out
///   or returned an unparseable reply, or on a non-retryable service error.
/// - [`SlidesError::GenerationUnderflow`] when a reply parsed but held fewer
///   than `min_slides` valid slides.
pub async fn generate_slides(
    generator: &dyn TextGenerator,
    source: &SourceMaterial,
    title: &str,
    config: &PresentationConfig,
) -> Result<GeneratedSlides, SlidesError> {
    let start = Instant::now();
    let prompt = build_prompt(source, title, config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    info!(
        "Generating {}-{} slides with {}",
        config.min_slides,
        config.max_slides,
        generator.name()
    );

    let mut prompt_tokens = 0usize;
    let mut completion_tokens = 0usize;
    let mut last_err = String::from("no attempt made");

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = retry_backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Generation retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_generation_start(attempt + 1);
        }

        let generation = match timeout(call_timeout, generator.generate(&prompt)).await {
            Err(_) => {
                last_err = format!("timed out after {}s", config.api_timeout_secs);
                warn!("Generation attempt {} {}", attempt + 1, last_err);
                continue;
            }
            Ok(Err(e)) => {
                last_err = e.to_string();
                warn!("Generation attempt {} failed: {}", attempt + 1, last_err);
                if !e.is_retryable() {
                    return Err(SlidesError::GenerationService {
                        attempts: attempt + 1,
                        message: last_err,
                    });
                }
                continue;
            }
            Ok(Ok(generation)) => generation,
        };

        prompt_tokens += generation.prompt_tokens;
        completion_tokens += generation.completion_tokens;

        let parsed = match parse_slides(&generation.text) {
            Ok(parsed) => parsed,
            Err(reason) => {
                last_err = format!("unparseable reply: {reason}");
                warn!("Generation attempt {}: {}", attempt + 1, last_err);
                continue;
            }
        };

        debug!(
            "Reply parsed: {} slides, {} dropped, {} input tokens, {} output tokens",
            parsed.slides.len(),
            parsed.dropped,
            generation.prompt_tokens,
            generation.completion_tokens
        );

        if let Some(ref cb) = config.progress_callback {
            cb.on_slides_generated(parsed.slides.len(), parsed.dropped);
        }

        let slides = enforce_slide_bounds(parsed.slides, config.min_slides, config.max_slides)?;

        return Ok(GeneratedSlides {
            slides,
            dropped: parsed.dropped,
            attempts: attempt + 1,
            prompt_tokens,
            completion_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }

    Err(SlidesError::GenerationService {
        attempts: config.max_retries.saturating_add(1),
        message: last_err,
    })
}
