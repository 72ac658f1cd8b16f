//! Slide content as it moves through the pipeline.
//!
//! ```text
//! SlideRecord ──▶ ResolvedSlide ──▶ Presentation ──▶ PDF bytes
//! (generator)     (+ image)          (+ metadata)     (renderer)
//! ```

use crate::config::PageSize;
use crate::error::ImageError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured content for one slide, before image resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    pub title: String,
    pub bullets: Vec<String>,
    pub explanation: String,
    /// Short description used to search for an illustration.
    pub image_query: String,
    /// Absolute http(s) URLs for further reading.
    pub references: Vec<String>,
}

/// Downloaded illustration bytes with their content type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub source_url: Option<String>,
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("content_type", &self.content_type)
            .field("source_url", &self.source_url)
            .finish()
    }
}

/// A slide record with its image-resolution outcome attached.
///
/// `image` and `image_error` are never both set. Both are `None` when image
/// fetching was disabled.
#[derive(Debug, Clone)]
pub struct ResolvedSlide {
    pub record: SlideRecord,
    pub image: Option<ImageAsset>,
    pub image_error: Option<ImageError>,
}

impl ResolvedSlide {
    pub fn from_outcome(record: SlideRecord, outcome: Result<ImageAsset, ImageError>) -> Self {
        match outcome {
            Ok(asset) => Self {
                record,
                image: Some(asset),
                image_error: None,
            },
            Err(e) => Self {
                record,
                image: None,
                image_error: Some(e),
            },
        }
    }

    pub fn without_image(record: SlideRecord) -> Self {
        Self {
            record,
            image: None,
            image_error: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// The finished deck: ordered slides plus rendering metadata.
#[derive(Debug, Clone)]
pub struct Presentation {
    pub title: String,
    pub slides: Vec<ResolvedSlide>,
    pub page_size: PageSize,
    pub generated_on: NaiveDate,
}

impl Presentation {
    pub fn records(&self) -> impl Iterator<Item = &SlideRecord> {
        self.slides.iter().map(|s| &s.record)
    }

    pub fn images_resolved(&self) -> usize {
        self.slides.iter().filter(|s| s.has_image()).count()
    }

    /// Plain-text dump of every slide, in order. Images are not included,
    /// so two decks built from the same records compare equal here even when
    /// their illustrations differ.
    pub fn slide_text(&self) -> String {
        let mut out = String::new();
        for (i, record) in self.records().enumerate() {
            out.push_str(&format!("# {}. {}\n", i + 1, record.title));
            for bullet in &record.bullets {
                out.push_str(&format!("- {bullet}\n"));
            }
            if !record.explanation.is_empty() {
                out.push_str(&record.explanation);
                out.push('\n');
            }
            for reference in &record.references {
                out.push_str(&format!("> {reference}\n"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> SlideRecord {
        SlideRecord {
            title: title.into(),
            bullets: vec!["one".into(), "two".into()],
            explanation: "why".into(),
            image_query: title.into(),
            references: vec!["https://example.com".into()],
        }
    }

    #[test]
    fn outcome_sets_exactly_one_side() {
        let ok = ResolvedSlide::from_outcome(
            record("a"),
            Ok(ImageAsset {
                bytes: vec![1, 2, 3],
                content_type: "image/png".into(),
                source_url: None,
            }),
        );
        assert!(ok.has_image());
        assert!(ok.image_error.is_none());

        let missing = ResolvedSlide::from_outcome(
            record("b"),
            Err(ImageError::NoResults { query: "b".into() }),
        );
        assert!(!missing.has_image());
        assert!(missing.image_error.is_some());
    }

    #[test]
    fn slide_text_lists_every_slide_in_order() {
        let deck = Presentation {
            title: "Deck".into(),
            slides: vec![
                ResolvedSlide::without_image(record("First")),
                ResolvedSlide::without_image(record("Second")),
            ],
            page_size: PageSize::A4,
            generated_on: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };
        let text = deck.slide_text();
        let first = text.find("1. First").unwrap();
        let second = text.find("2. Second").unwrap();
        assert!(first < second);
        assert!(text.contains("- one"));
        assert!(text.contains("> https://example.com"));
        assert_eq!(deck.images_resolved(), 0);
    }
}
