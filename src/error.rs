//! Error types for the edgequake-slides library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`SlidesError`] — **Fatal**: the request cannot produce a presentation
//!   (unsupported upload, empty content, the language model failed or wrote
//!   too few slides, pdfium could not build the document). Returned as
//!   `Err(SlidesError)` from the top-level `generate*` functions; no partial
//!   presentation is ever returned alongside it.
//!
//! * [`ImageError`] — **Non-fatal**: the illustration for a single slide
//!   could not be found or downloaded. Stored on
//!   [`crate::slide::ResolvedSlide`] so the slide renders without an image
//!   and callers can still see why.
//!
//! * [`ServiceError`] — transport-level failure of a
//!   [`crate::pipeline::llm::TextGenerator`]. The generation stage retries
//!   the retryable ones and folds the last one into
//!   [`SlidesError::GenerationService`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-slides library.
#[derive(Debug, Error)]
pub enum SlidesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload's MIME type is not PDF, DOCX, TXT or CSV, or its bytes
    /// could not be read as the declared type.
    #[error("Unsupported document format '{mime_type}': {reason}\nSupported: PDF, DOCX, TXT, CSV.")]
    UnsupportedFormat { mime_type: String, reason: String },

    /// The topic or the extracted document text is blank.
    #[error("No usable content in {origin}: the text is empty or whitespace only")]
    EmptyContent { origin: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The language model call failed, timed out, or its reply could not be
    /// parsed, on every attempt.
    #[error("Slide generation failed after {attempts} attempt(s): {message}")]
    GenerationService { attempts: u32, message: String },

    /// The model replied, but fewer valid slides survived parsing than required.
    #[error("The model produced {produced} usable slide(s); at least {required} are required")]
    GenerationUnderflow { produced: usize, required: usize },

    /// No language model could be configured (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// pdfium failed to create, populate or serialise the document.
    #[error("PDF rendering failed: {detail}")]
    Render { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium next to the executable.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
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

impl SlidesError {
    /// True for the errors caused by the caller's input rather than by a
    /// service or the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SlidesError::UnsupportedFormat { .. } | SlidesError::EmptyContent { .. }
        )
    }
}

/// A non-fatal failure to illustrate a single slide.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The search returned nothing usable for the query.
    #[error("no image found for '{query}'")]
    NoResults { query: String },

    /// The query was blank or could not be turned into a request.
    #[error("invalid image query '{query}'")]
    InvalidQuery { query: String },

    /// Connection, DNS or body-read failure.
    #[error("network error: {detail}")]
    Network { detail: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// The search or download exceeded the per-slide timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The payload is not a PNG or JPEG image.
    #[error("unsupported image type '{content_type}'")]
    UnsupportedType { content_type: String },

    /// The payload exceeds the configured size cap.
    #[error("image is {bytes} bytes (limit {limit})")]
    TooLarge { bytes: u64, limit: u64 },
}

/// Failure of a single call to the generative language service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never got an answer (connect, DNS, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The provider library reported an error.
    #[error("provider error: {0}")]
    Provider(String),

    /// The service answered successfully but with no text.
    #[error("empty response from the model")]
    EmptyResponse,
}

impl ServiceError {
    /// Bad requests and authentication failures will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Http { status, .. } => !matches!(status, 400 | 401 | 403),
            _ => true,
        }
    }
}
