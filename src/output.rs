//! Result types returned by the generation entry points.

use crate::slide::SlideRecord;
use serde::{Deserialize, Serialize};

/// A finished presentation.
#[derive(Debug, Clone)]
pub struct PresentationOutput {
    /// The PDF byte stream, one page per slide.
    pub pdf: Vec<u8>,
    /// Deck title as printed in every page footer.
    pub title: String,
    /// Deterministic file name derived from the title.
    pub file_name: String,
    /// Per-page summary, in page order.
    pub pages: Vec<PageSummary>,
    /// Slide content as generated, in page order.
    pub slides: Vec<SlideRecord>,
    pub stats: PresentationStats,
}

/// What ended up on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: usize,
    pub title: String,
    pub has_image: bool,
    /// Body text scale used to fit the page (1.0 = base size).
    pub font_scale: f32,
    /// Some text was cut to stay on one page.
    pub truncated: bool,
}

/// Statistics for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationStats {
    pub slide_count: usize,
    pub images_resolved: usize,
    pub images_missing: usize,
    /// Slide entries the parser rejected in the accepted reply.
    pub dropped_records: usize,
    pub generation_attempts: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub source_chars: usize,
    pub pdf_bytes: usize,
    pub total_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub image_duration_ms: u64,
    pub render_duration_ms: u64,
}
