//! # edgequake-slides
//!
//! Generate slide-deck PDFs from a topic or a document using a language model.
//!
//! Give it a topic ("Photosynthesis") or an uploaded PDF, DOCX, TXT or CSV
//! file. The crate asks a language model for 6-10 structured slides, finds an
//! illustration for each one, and lays every slide out on its own PDF page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! topic / document
//!  │
//!  ├─ 1. Input    extract text (pdfium, DOCX XML, CSV statistics)
//!  ├─ 2. Generate prompt the model, parse and validate JSON slides
//!  ├─ 3. Images   bounded-concurrency search + download, best effort
//!  └─ 4. Render   plan each page, draw it with pdfium → PDF bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_slides::{generate_presentation, PresentationConfig, PresentationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PresentationConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let request = PresentationRequest::topic("Photosynthesis");
//!     let output = generate_presentation(&request, &config).await?;
//!     std::fs::write(&output.file_name, &output.pdf)?;
//!     eprintln!("{} slides, {} with images",
//!         output.stats.slide_count,
//!         output.stats.images_resolved);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `slides2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-slides = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! PDF input and PDF output both need the pdfium shared library. It is found
//! via [`PresentationConfig::pdfium_lib_path`], `PDFIUM_LIB_PATH`, the current
//! directory, or the system library path, in that order.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod deck;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod slide;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSize, PresentationConfig, PresentationConfigBuilder};
pub use deck::{
    draft_presentation, generate_presentation, generate_presentation_sync,
    generate_presentation_to_file, output_file_name, write_presentation,
};
pub use error::{ImageError, ServiceError, SlidesError};
pub use output::{PageSummary, PresentationOutput, PresentationStats};
pub use pipeline::images::{ImageSource, WebImageSource};
pub use pipeline::llm::{
    GeminiGenerator, Generation, Prompt, ProviderGenerator, TextGenerator,
};
pub use pipeline::render::{render_presentation, RenderedPdf};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{
    DocumentKind, PresentationRequest, SourceInput, SourceMaterial, SourceOrigin,
    UploadedDocument,
};
pub use slide::{ImageAsset, Presentation, ResolvedSlide, SlideRecord};
