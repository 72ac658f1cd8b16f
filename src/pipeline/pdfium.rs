//! pdfium binding and PDF text extraction.
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and blocks on CPU work. Every call that touches a
//! [`Pdfium`] handle therefore runs inside `tokio::task::spawn_blocking`, and
//! each blocking task binds its own handle via [`bind`].
//!
//! ## Library lookup
//!
//! 1. The explicit path from the config (file, or directory holding the
//!    platform library name).
//! 2. `PDFIUM_LIB_PATH` (same rules).
//! 3. The current directory.
//! 4. The system library search path.
//!
//! The first location that binds is remembered for the rest of the process.

use crate::error::SlidesError;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming a pdfium library file or directory.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

static RESOLVED_PATH: OnceCell<PathBuf> = OnceCell::new();

/// Bind to a pdfium library, trying each lookup location in order.
pub fn bind(explicit: Option<&Path>) -> Result<Pdfium, SlidesError> {
    if explicit.is_none() {
        if let Some(path) = RESOLVED_PATH.get() {
            if let Ok(bindings) = Pdfium::bind_to_library(path) {
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let mut failures = Vec::new();
    for candidate in candidates(explicit) {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", candidate.display());
                let _ = RESOLVED_PATH.set(candidate);
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => failures.push(format!("{}: {:?}", candidate.display(), e)),
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            failures.push(format!("system library: {:?}", e));
            Err(SlidesError::PdfiumBindingFailed(failures.join("; ")))
        }
    }
}

fn candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(library_file(p));
    }
    if let Some(p) = std::env::var_os(PDFIUM_LIB_ENV) {
        if !p.is_empty() {
            out.push(library_file(Path::new(&p)));
        }
    }
    out.push(Pdfium::pdfium_platform_library_name_at_path("./"));
    out
}

/// A directory resolves to the platform library name inside it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

/// Extract the text of every page, pages separated by blank lines.
///
/// Bytes pdfium cannot open are reported as
/// [`SlidesError::UnsupportedFormat`]: the upload claimed to be a PDF but
/// is not one we can read.
pub async fn extract_text(
    bytes: Vec<u8>,
    pdfium_lib: Option<&Path>,
) -> Result<String, SlidesError> {
    let lib = pdfium_lib.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || extract_text_blocking(bytes, lib.as_deref()))
        .await
        .map_err(|e| SlidesError::Internal(format!("Text extraction task panicked: {}", e)))?
}

fn extract_text_blocking(bytes: Vec<u8>, pdfium_lib: Option<&Path>) -> Result<String, SlidesError> {
    let pdfium = bind(pdfium_lib)?;

    let document =
        pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| SlidesError::UnsupportedFormat {
                mime_type: "application/pdf".into(),
                reason: format!("unreadable PDF: {:?}", e),
            })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut out = String::new();
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(text) => {
                let text = text.all();
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if !out.is_empty() {
                    out.push_str("\n\n");
                }
                out.push_str(text);
            }
            Err(e) => warn!("Skipping text of page {}: {:?}", idx + 1, e),
        }
    }

    Ok(out)
}
