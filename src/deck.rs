//! Presentation entry points.
//!
//! ```text
//! request ─▶ normalise ─▶ generate ─▶ resolve images ─▶ render ─▶ PDF
//!            (input)      (llm)       (images)          (render)
//! ```
//!
//! Stages run in order for one request. Input and generation failures are
//! fatal and return `Err` with no partial output; image failures are
//! recorded per slide and never fail the request.

use crate::config::PresentationConfig;
use crate::error::SlidesError;
use crate::output::{PresentationOutput, PresentationStats};
use crate::pipeline::{images, input, llm, render};
use crate::request::PresentationRequest;
use crate::slide::Presentation;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Stages 1-3 plus the bookkeeping `generate_presentation` reports.
struct Draft {
    presentation: Presentation,
    source_chars: usize,
    generation: llm::GeneratedSlides,
    image_duration_ms: u64,
}

async fn draft(
    request: &PresentationRequest,
    config: &PresentationConfig,
) -> Result<Draft, SlidesError> {
    config.validate()?;
    let title = request.deck_title();
    info!("Starting presentation: {}", title);

    // ── Step 1: Normalise input ──────────────────────────────────────────
    let source = input::normalize(&request.input, config.pdfium_lib_path.as_deref()).await?;
    let source_chars = source.char_count();
    debug!("Source material: {} chars", source_chars);
    if let Some(ref cb) = config.progress_callback {
        cb.on_source_ready(source_chars);
    }

    // ── Step 2: Generate slide content ───────────────────────────────────
    let generator = llm::resolve_generator(config)?;
    let generation = llm::generate_slides(generator.as_ref(), &source, &title, config).await?;
    info!(
        "Generated {} slides in {}ms ({} attempt(s))",
        generation.slides.len(),
        generation.duration_ms,
        generation.attempts
    );

    // ── Step 3: Resolve images ───────────────────────────────────────────
    let image_start = Instant::now();
    let image_source = images::image_source_for(config)?;
    let slides = images::resolve_images(generation.slides.clone(), image_source, config).await;
    let image_duration_ms = image_start.elapsed().as_millis() as u64;

    let presentation = Presentation {
        title,
        slides,
        page_size: config.page_size,
        generated_on: chrono::Local::now().date_naive(),
    };
    info!(
        "Images: {}/{} slides illustrated in {}ms",
        presentation.images_resolved(),
        presentation.slides.len(),
        image_duration_ms
    );

    Ok(Draft {
        presentation,
        source_chars,
        generation,
        image_duration_ms,
    })
}

/// Run normalisation, generation and image resolution without rendering.
///
/// Useful for previews: the returned [`Presentation`] holds every slide and
/// its image outcome, and can be rendered later with
/// [`crate::pipeline::render::render_presentation`].
pub async fn draft_presentation(
    request: &PresentationRequest,
    config: &PresentationConfig,
) -> Result<Presentation, SlidesError> {
    Ok(draft(request, config).await?.presentation)
}

/// Generate a presentation PDF from a topic or document.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - [`SlidesError::UnsupportedFormat`] / [`SlidesError::EmptyContent`] for
///   unusable input, before any external call is made.
/// - [`SlidesError::GenerationService`] / [`SlidesError::GenerationUnderflow`]
///   when the language model fails or writes too few slides.
/// - [`SlidesError::Render`] / [`SlidesError::PdfiumBindingFailed`] when the
///   PDF cannot be produced.
pub async fn generate_presentation(
    request: &PresentationRequest,
    config: &PresentationConfig,
) -> Result<PresentationOutput, SlidesError> {
    let total_start = Instant::now();
    let Draft {
        presentation,
        source_chars,
        generation,
        image_duration_ms,
    } = draft(request, config).await?;

    // ── Step 4: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let rendered =
        render::render_presentation(&presentation, config.pdfium_lib_path.as_deref()).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_render_complete(rendered.pages.len(), rendered.bytes.len());
    }

    let images_resolved = presentation.images_resolved();
    let stats = PresentationStats {
        slide_count: presentation.slides.len(),
        images_resolved,
        images_missing: presentation.slides.len() - images_resolved,
        dropped_records: generation.dropped,
        generation_attempts: generation.attempts,
        total_input_tokens: generation.prompt_tokens as u64,
        total_output_tokens: generation.completion_tokens as u64,
        source_chars,
        pdf_bytes: rendered.bytes.len(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        generation_duration_ms: generation.duration_ms,
        image_duration_ms,
        render_duration_ms,
    };

    info!(
        "Presentation complete: {} pages, {} bytes, {}ms total",
        stats.slide_count, stats.pdf_bytes, stats.total_duration_ms
    );

    Ok(PresentationOutput {
        pdf: rendered.bytes,
        file_name: output_file_name(&presentation.title),
        title: presentation.title,
        pages: rendered.pages,
        slides: generation.slides,
        stats,
    })
}

/// Generate a presentation and write it to `path`.
///
/// When `path` is an existing directory the PDF is written inside it under
/// [`output_file_name`]. Uses atomic write (temp file + rename) so a failed
/// run never leaves a partial PDF behind.
pub async fn generate_presentation_to_file(
    request: &PresentationRequest,
    path: impl AsRef<Path>,
    config: &PresentationConfig,
) -> Result<PresentationStats, SlidesError> {
    let output = generate_presentation(request, config).await?;
    write_presentation(&output, path.as_ref()).await?;
    Ok(output.stats)
}

/// Write a finished presentation atomically; returns the final path.
pub async fn write_presentation(
    output: &PresentationOutput,
    path: &Path,
) -> Result<PathBuf, SlidesError> {
    let target = if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        path.join(&output.file_name)
    } else {
        path.to_path_buf()
    };

    let write_err = |e: std::io::Error| SlidesError::OutputWriteFailed {
        path: target.clone(),
        source: e,
    };

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }

    let tmp_path = target.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, &target)
        .await
        .map_err(write_err)?;

    info!("Wrote {}", target.display());
    Ok(target)
}

/// Synchronous wrapper around [`generate_presentation`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_presentation_sync(
    request: &PresentationRequest,
    config: &PresentationConfig,
) -> Result<PresentationOutput, SlidesError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SlidesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_presentation(request, config))
}

/// Deterministic PDF file name for a deck title.
///
/// Runs of characters other than ASCII letters and digits become a single
/// `_`; e.g. `"Climate Change: 101"` → `Climate_Change_101_presentation.pdf`.
pub fn output_file_name(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c);
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "presentation.pdf".to_string()
    } else {
        format!("{stem}_presentation.pdf")
    }
}
