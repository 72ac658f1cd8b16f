//! Configuration types for presentation generation.
//!
//! All pipeline behaviour is controlled through [`PresentationConfig`], built
//! via its [`PresentationConfigBuilder`]. Credentials and collaborators are
//! plain fields of this value and travel with each call into the pipeline;
//! nothing is stored process-wide, so two requests with different API keys
//! (or a test with a mock generator) never interfere.

use crate::error::SlidesError;
use crate::pipeline::images::{ImageSource, OPENVERSE_SEARCH_URL};
use crate::pipeline::llm::TextGenerator;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one presentation request.
///
/// Built via [`PresentationConfig::builder()`] or using
/// [`PresentationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_slides::{PageSize, PresentationConfig};
///
/// let config = PresentationConfig::builder()
///     .api_key("AIza...")
///     .slide_range(6, 8)
///     .page_size(PageSize::Letter)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PresentationConfig {
    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`
    /// and `api_key`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Gemini API key supplied by the caller for this request.
    pub api_key: Option<String>,

    /// Pre-constructed text generator. Takes precedence over every other
    /// provider setting.
    pub generator: Option<Arc<dyn TextGenerator>>,

    /// Image search/download backend. Defaults to
    /// [`crate::pipeline::images::WebImageSource`].
    pub image_source: Option<Arc<dyn ImageSource>>,

    /// Sampling temperature. Default: 0.7.
    ///
    /// Slide writing benefits from some variety in phrasing; the JSON shape
    /// is enforced by the parser, not by a low temperature.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// Ten slides with explanations and references run to roughly 3 000
    /// output tokens; a cut-off reply is unparseable JSON.
    pub max_tokens: usize,

    /// Additional attempts after a failed generation call. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-generation-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Minimum number of slides a deck must have. Default: 6.
    pub min_slides: usize,

    /// Maximum number of slides kept from the model reply. Default: 10.
    pub max_slides: usize,

    /// Document text beyond this many characters is cut before prompting. Default: 3000.
    pub max_source_chars: usize,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Search and download slide illustrations. Default: true.
    pub fetch_images: bool,

    /// Concurrent image lookups. Default: 4.
    pub image_concurrency: usize,

    /// Per-slide image search + download timeout in seconds. Default: 10.
    pub image_timeout_secs: u64,

    /// Largest accepted image payload in bytes. Default: 5 MiB.
    pub max_image_bytes: u64,

    /// Openverse-compatible image search endpoint.
    pub image_search_url: String,

    /// Page size of the rendered PDF. Default: A4.
    pub page_size: PageSize,

    /// Explicit pdfium shared library (file or directory).
    pub pdfium_lib_path: Option<PathBuf>,

    /// Progress events for each pipeline stage.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            api_key: None,
            generator: None,
            image_source: None,
            temperature: 0.7,
            max_tokens: 8192,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            min_slides: 6,
            max_slides: 10,
            max_source_chars: 3000,
            system_prompt: None,
            fetch_images: true,
            image_concurrency: 4,
            image_timeout_secs: 10,
            max_image_bytes: 5 * 1024 * 1024,
            image_search_url: OPENVERSE_SEARCH_URL.to_string(),
            page_size: PageSize::default(),
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PresentationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .field("image_source", &self.image_source.as_ref().map(|_| "<dyn ImageSource>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("min_slides", &self.min_slides)
            .field("max_slides", &self.max_slides)
            .field("fetch_images", &self.fetch_images)
            .field("image_concurrency", &self.image_concurrency)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl PresentationConfig {
    /// Create a new builder for `PresentationConfig`.
    pub fn builder() -> PresentationConfigBuilder {
        PresentationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the invariants `build()` enforces. Also run by the entry points
    /// so hand-assembled configs get the same treatment.
    pub fn validate(&self) -> Result<(), SlidesError> {
        if self.min_slides == 0 {
            return Err(SlidesError::InvalidConfig(
                "min_slides must be ≥ 1".into(),
            ));
        }
        if self.min_slides > self.max_slides {
            return Err(SlidesError::InvalidConfig(format!(
                "min_slides ({}) must not exceed max_slides ({})",
                self.min_slides, self.max_slides
            )));
        }
        if self.image_concurrency == 0 {
            return Err(SlidesError::InvalidConfig(
                "image_concurrency must be ≥ 1".into(),
            ));
        }
        if self.api_timeout_secs == 0 || self.image_timeout_secs == 0 {
            return Err(SlidesError::InvalidConfig(
                "timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PresentationConfig`].
pub struct PresentationConfigBuilder {
    config: PresentationConfig,
}

impl fmt::Debug for PresentationConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PresentationConfigBuilder {
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

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.config.image_source = Some(source);
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

    /// Accepted slide count range, inclusive.
    pub fn slide_range(mut self, min: usize, max: usize) -> Self {
        self.config.min_slides = min;
        self.config.max_slides = max;
        self
    }

    pub fn max_source_chars(mut self, n: usize) -> Self {
        self.config.max_source_chars = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn fetch_images(mut self, v: bool) -> Self {
        self.config.fetch_images = v;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n;
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn max_image_bytes(mut self, n: u64) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn image_search_url(mut self, url: impl Into<String>) -> Self {
        self.config.image_search_url = url.into();
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PresentationConfig, SlidesError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page size of the rendered deck, portrait orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// ISO A4, 210 × 297 mm. (default)
    #[default]
    A4,
    /// US Letter, 8.5 × 11 in.
    Letter,
}

impl PageSize {
    /// Width and height in PDF points (1/72 inch).
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = SlidesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" | "us-letter" => Ok(PageSize::Letter),
            other => Err(SlidesError::InvalidConfig(format!(
                "unknown page size '{other}' (expected a4 or letter)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PresentationConfig::default();
        assert_eq!(c.min_slides, 6);
        assert_eq!(c.max_slides, 10);
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.max_source_chars, 3000);
        assert_eq!(c.image_timeout_secs, 10);
        assert_eq!(c.page_size, PageSize::A4);
        assert!(c.fetch_images);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn builder_rejects_inverted_slide_range() {
        let err = PresentationConfig::builder()
            .slide_range(8, 6)
            .build()
            .unwrap_err();
        assert!(matches!(err, SlidesError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_minimum_and_zero_concurrency() {
        assert!(PresentationConfig::builder()
            .slide_range(0, 6)
            .build()
            .is_err());
        assert!(PresentationConfig::builder()
            .image_concurrency(0)
            .build()
            .is_err());
        assert!(PresentationConfig::builder()
            .api_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = PresentationConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PresentationConfig::builder()
            .api_key("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn page_size_parsing() {
        assert_eq!("A4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!("letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert!("tabloid".parse::<PageSize>().is_err());
        let (w, h) = PageSize::Letter.dimensions_pt();
        assert_eq!((w, h), (612.0, 792.0));
    }
}
