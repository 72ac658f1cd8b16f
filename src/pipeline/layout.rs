//! Page layout planning.
//!
//! [`plan_page`] turns one slide into positioned text runs, panels and an
//! image rectangle, in PDF points with the origin at the bottom-left corner.
//! The planner is pure: no pdfium handle, no I/O. [`crate::pipeline::render`]
//! only executes the plan, which keeps every placement rule unit-testable
//! without the native library.
//!
//! ```text
//! ┌──────────────────────────────┐  accent bar
//! │ Title (bold, ≤ 2 lines)      │
//! │ date (first page only)       │
//! │ slide title (first page only)│
//! │ • bullet                     │
//! │ • bullet                     │
//! │ ┌──────────────────────────┐ │
//! │ │ Additional Information   │ │
//! │ └──────────────────────────┘ │
//! │        [ image region ]      │
//! │ References & Further Reading │
//! │ https://…                    │
//! │ Deck title | 3 / 7           │  footer
//! └──────────────────────────────┘
//! ```
//!
//! Overflow: body text is laid out at 100%, 90%, 80% and 70% of its base
//! size; the first scale that fits wins. At 70% any remaining overflow is cut
//! and the last visible line gets an ellipsis. Nothing ever flows onto a
//! second page.

use crate::config::PageSize;
use crate::slide::{Presentation, SlideRecord};
use chrono::NaiveDate;
use image::DynamicImage;
use tracing::{debug, warn};

// ── Geometry ─────────────────────────────────────────────────────────────────

const MARGIN: f32 = 48.0;
const ACCENT_BAR_HEIGHT: f32 = 10.0;
const TITLE_SIZE: f32 = 24.0;
const TITLE_MAX_LINES: usize = 2;
/// The first slide's own title, under the deck title on page one.
const SUBTITLE_SIZE: f32 = 18.0;
const DATE_SIZE: f32 = 10.0;
const BULLET_SIZE: f32 = 14.0;
const EXPLANATION_SIZE: f32 = 11.0;
const REFERENCE_SIZE: f32 = 8.0;
const FOOTER_SIZE: f32 = 8.0;
const FOOTER_BASELINE: f32 = 24.0;
const MAX_REFERENCES: usize = 5;
const BULLET_INDENT: f32 = 16.0;
const PANEL_PAD: f32 = 8.0;
const SECTION_GAP: f32 = 12.0;
/// Largest share of the body area an image may take.
const IMAGE_SHARE: f32 = 0.4;
const IMAGE_MAX_HEIGHT: f32 = 240.0;

/// Body font scales tried in order before truncating.
pub const FONT_SCALES: [f32; 4] = [1.0, 0.9, 0.8, 0.7];

const ELLIPSIS: &str = "...";
const BULLET_MARKER: &str = "•";
const EXPLANATION_LABEL: &str = "Additional Information:";
const REFERENCES_LABEL: &str = "References & Further Reading:";

/// RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const TITLE_COLOR: Rgb = Rgb(31, 56, 100);
pub const BODY_COLOR: Rgb = Rgb(33, 33, 33);
pub const MUTED_COLOR: Rgb = Rgb(110, 110, 110);
pub const ACCENT_COLOR: Rgb = Rgb(46, 92, 160);
pub const PANEL_FILL: Rgb = Rgb(238, 242, 248);
pub const PANEL_STROKE: Rgb = Rgb(200, 210, 225);

/// The two standard fonts used on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

/// One drawing command. Coordinates are PDF points from the bottom-left.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutItem {
    /// A single line of text; `y` is the baseline.
    Text {
        x: f32,
        y: f32,
        text: String,
        size: f32,
        face: FontFace,
        color: Rgb,
    },
    /// A filled rectangle.
    Panel {
        left: f32,
        bottom: f32,
        width: f32,
        height: f32,
        fill: Rgb,
        stroke: Option<Rgb>,
    },
    /// Where the slide's image goes, already scaled to its aspect ratio.
    Image {
        left: f32,
        bottom: f32,
        width: f32,
        height: f32,
    },
}

/// The plan for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub items: Vec<LayoutItem>,
    /// Scale applied to the body text (1.0 = base size).
    pub font_scale: f32,
    /// Some text did not fit and was cut.
    pub truncated: bool,
}

impl PageLayout {
    pub fn has_image(&self) -> bool {
        self.items
            .iter()
            .any(|i| matches!(i, LayoutItem::Image { .. }))
    }

    /// Every text run on the page, top to bottom, one per line.
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|i| match i {
                LayoutItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-page information that does not come from the slide itself.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub page_num: usize,
    pub page_count: usize,
    pub deck_title: &'a str,
    /// Shown under the title when set (first page).
    pub date: Option<NaiveDate>,
    pub page_size: PageSize,
}

/// A planned page together with the decoded image it places, if any.
#[derive(Debug, Clone)]
pub struct PlannedPage {
    pub layout: PageLayout,
    pub image: Option<DynamicImage>,
}

// ── Text measurement ─────────────────────────────────────────────────────────

// Advance widths of printable ASCII (0x20..=0x7E) in 1/1000 em, from the
// standard Helvetica and Helvetica-Bold font metrics.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

fn char_width(c: char, face: FontFace) -> u16 {
    let table = match face {
        FontFace::Regular => &HELVETICA_WIDTHS,
        FontFace::Bold => &HELVETICA_BOLD_WIDTHS,
    };
    match c {
        ' '..='~' => table[c as usize - 0x20],
        '•' => 350,
        _ => 556,
    }
}

/// Width of `text` in points at `size`.
pub fn text_width(text: &str, face: FontFace, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, face) as f32).sum::<f32>() * size / 1000.0
}

/// Greedy word wrap. Words wider than `max_width` are split by character.
pub fn wrap_text(text: &str, face: FontFace, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, face, size) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, face, size) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            let mut next = current.clone();
            next.push(c);
            if !current.is_empty() && text_width(&next, face, size) > max_width {
                lines.push(std::mem::take(&mut current));
                current.push(c);
            } else {
                current = next;
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Cut `text` so that it plus an ellipsis fits in `max_width`.
pub fn ellipsize(text: &str, face: FontFace, size: f32, max_width: f32) -> String {
    let mut kept: String = text.trim_end().to_string();
    while !kept.is_empty() && text_width(&format!("{kept}{ELLIPSIS}"), face, size) > max_width {
        kept.pop();
    }
    format!("{}{ELLIPSIS}", kept.trim_end())
}

/// `text` unchanged when it fits, otherwise ellipsized.
fn fit_line(text: &str, face: FontFace, size: f32, max_width: f32) -> String {
    if text_width(text, face, size) <= max_width {
        text.to_string()
    } else {
        ellipsize(text, face, size, max_width)
    }
}

// ── Body text ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Bullet,
    Explanation,
}

#[derive(Debug, Clone)]
struct BodyLine {
    text: String,
    kind: BodyKind,
    face: FontFace,
    /// First line of a bullet gets the marker.
    marker: bool,
    size: f32,
    leading: f32,
    space_before: f32,
}

fn body_lines(record: &SlideRecord, scale: f32, content_width: f32) -> Vec<BodyLine> {
    let bullet_size = BULLET_SIZE * scale;
    let expl_size = EXPLANATION_SIZE * scale;
    let mut lines = Vec::new();

    for (i, bullet) in record.bullets.iter().enumerate() {
        let wrapped = wrap_text(
            bullet,
            FontFace::Regular,
            bullet_size,
            content_width - BULLET_INDENT,
        );
        for (j, text) in wrapped.into_iter().enumerate() {
            lines.push(BodyLine {
                text,
                kind: BodyKind::Bullet,
                face: FontFace::Regular,
                marker: j == 0,
                size: bullet_size,
                leading: bullet_size * 1.3,
                space_before: if j == 0 && i > 0 { bullet_size * 0.4 } else { 0.0 },
            });
        }
    }

    let wrapped = wrap_text(
        &record.explanation,
        FontFace::Regular,
        expl_size,
        content_width - 2.0 * PANEL_PAD,
    );
    let label = (!wrapped.is_empty()).then(|| (EXPLANATION_LABEL.to_string(), FontFace::Bold));
    let panel = label
        .into_iter()
        .chain(wrapped.into_iter().map(|t| (t, FontFace::Regular)));
    for (j, (text, face)) in panel.enumerate() {
        lines.push(BodyLine {
            text,
            kind: BodyKind::Explanation,
            face,
            marker: false,
            size: expl_size,
            leading: expl_size * 1.35,
            space_before: if j == 0 { SECTION_GAP + PANEL_PAD } else { 0.0 },
        });
    }

    lines
}

fn body_height(lines: &[BodyLine]) -> f32 {
    let text: f32 = lines.iter().map(|l| l.space_before + l.leading).sum();
    let panel_bottom = if lines.iter().any(|l| l.kind == BodyKind::Explanation) {
        PANEL_PAD
    } else {
        0.0
    };
    text + panel_bottom
}

// ── Planner ──────────────────────────────────────────────────────────────────

/// Push a bold heading of at most [`TITLE_MAX_LINES`] lines below `cursor`.
/// Returns true when it had to be cut.
fn push_heading(
    items: &mut Vec<LayoutItem>,
    cursor: &mut f32,
    text: &str,
    size: f32,
    content_width: f32,
) -> bool {
    let mut lines = wrap_text(text, FontFace::Bold, size, content_width);
    let cut = lines.len() > TITLE_MAX_LINES;
    if cut {
        lines.truncate(TITLE_MAX_LINES);
        let last = &mut lines[TITLE_MAX_LINES - 1];
        *last = ellipsize(last, FontFace::Bold, size, content_width);
    }
    for line in lines {
        *cursor -= size * 1.2;
        items.push(LayoutItem::Text {
            x: MARGIN,
            y: *cursor + size * 0.2,
            text: line,
            size,
            face: FontFace::Bold,
            color: TITLE_COLOR,
        });
    }
    cut
}

/// Plan one page.
///
/// `image_dims` is the pixel size of the slide's decoded image; `None`
/// means the page has no image region at all.
pub fn plan_page(
    record: &SlideRecord,
    image_dims: Option<(u32, u32)>,
    ctx: &PageContext<'_>,
) -> PageLayout {
    let (width, height) = ctx.page_size.dimensions_pt();
    let content_width = width - 2.0 * MARGIN;
    let mut items = Vec::new();
    let mut truncated = false;

    items.push(LayoutItem::Panel {
        left: 0.0,
        bottom: height - ACCENT_BAR_HEIGHT,
        width,
        height: ACCENT_BAR_HEIGHT,
        fill: ACCENT_COLOR,
        stroke: None,
    });

    // Title. Page one leads with the deck title and date, then the slide's
    // own title as a subheading unless the two are the same.
    let mut cursor = height - MARGIN;
    match ctx.date {
        Some(date) => {
            truncated |= push_heading(&mut items, &mut cursor, ctx.deck_title, TITLE_SIZE, content_width);
            cursor -= DATE_SIZE * 1.6;
            items.push(LayoutItem::Text {
                x: MARGIN,
                y: cursor + DATE_SIZE * 0.2,
                text: format!("Generated on {}", date.format("%B %-d, %Y")),
                size: DATE_SIZE,
                face: FontFace::Regular,
                color: MUTED_COLOR,
            });
            if !record.title.trim().eq_ignore_ascii_case(ctx.deck_title.trim()) {
                cursor -= SECTION_GAP / 2.0;
                truncated |=
                    push_heading(&mut items, &mut cursor, &record.title, SUBTITLE_SIZE, content_width);
            }
        }
        None => {
            truncated |= push_heading(&mut items, &mut cursor, &record.title, TITLE_SIZE, content_width);
        }
    }
    cursor -= SECTION_GAP;
    let body_top = cursor;

    // Footer and references, bottom-up
    let footer = fit_line(
        &format!("{} | {} / {}", ctx.deck_title, ctx.page_num, ctx.page_count),
        FontFace::Regular,
        FOOTER_SIZE,
        content_width,
    );
    items.push(LayoutItem::Text {
        x: MARGIN,
        y: FOOTER_BASELINE,
        text: footer,
        size: FOOTER_SIZE,
        face: FontFace::Regular,
        color: MUTED_COLOR,
    });

    let mut floor = FOOTER_BASELINE + FOOTER_SIZE * 2.0;
    if !record.references.is_empty() {
        let shown = record.references.len().min(MAX_REFERENCES);
        if shown < record.references.len() {
            truncated = true;
        }
        let leading = REFERENCE_SIZE * 1.35;
        let mut refs = Vec::with_capacity(shown + 1);
        refs.push((REFERENCES_LABEL.to_string(), FontFace::Bold));
        for r in &record.references[..shown] {
            refs.push((
                fit_line(r, FontFace::Regular, REFERENCE_SIZE, content_width),
                FontFace::Regular,
            ));
        }
        // Last reference sits on the floor; earlier ones stack upwards.
        for (text, face) in refs.into_iter().rev() {
            items.push(LayoutItem::Text {
                x: MARGIN,
                y: floor,
                text,
                size: REFERENCE_SIZE,
                face,
                color: MUTED_COLOR,
            });
            floor += leading;
        }
        floor += SECTION_GAP - leading + REFERENCE_SIZE;
    }

    // Image region, directly above the references
    if let Some((px_w, px_h)) = image_dims {
        let available = (body_top - floor).max(0.0);
        let max_h = (available * IMAGE_SHARE).min(IMAGE_MAX_HEIGHT);
        if px_w > 0 && px_h > 0 && max_h > 1.0 {
            let scale = (content_width / px_w as f32).min(max_h / px_h as f32);
            let w = (px_w as f32 * scale).min(content_width);
            let h = (px_h as f32 * scale).min(max_h);
            items.push(LayoutItem::Image {
                left: MARGIN + (content_width - w) / 2.0,
                bottom: floor,
                width: w,
                height: h,
            });
            floor += h + SECTION_GAP;
        }
    }

    // Body: shrink, then truncate
    let available = (body_top - floor).max(0.0);
    let (lines, font_scale) = FONT_SCALES
        .iter()
        .map(|&s| (body_lines(record, s, content_width), s))
        .find(|(lines, _)| body_height(lines) <= available)
        .unwrap_or_else(|| {
            let s = FONT_SCALES[FONT_SCALES.len() - 1];
            (body_lines(record, s, content_width), s)
        });

    let mut cursor = body_top;
    let mut panel_at: Option<(usize, f32)> = None;
    let mut last_text: Option<usize> = None;
    let mut body_truncated = false;

    for line in lines.iter() {
        let panel_reserve = if line.kind == BodyKind::Explanation {
            PANEL_PAD
        } else {
            0.0
        };
        if cursor - line.space_before - line.leading - panel_reserve < floor {
            body_truncated = true;
            break;
        }
        cursor -= line.space_before;
        if line.kind == BodyKind::Explanation && panel_at.is_none() {
            panel_at = Some((items.len(), cursor + PANEL_PAD));
        }
        cursor -= line.leading;
        let baseline = cursor + line.leading - line.size;

        let x = match line.kind {
            BodyKind::Bullet => {
                if line.marker {
                    items.push(LayoutItem::Text {
                        x: MARGIN,
                        y: baseline,
                        text: BULLET_MARKER.to_string(),
                        size: line.size,
                        face: FontFace::Regular,
                        color: ACCENT_COLOR,
                    });
                }
                MARGIN + BULLET_INDENT
            }
            BodyKind::Explanation => MARGIN + PANEL_PAD,
        };
        last_text = Some(items.len());
        items.push(LayoutItem::Text {
            x,
            y: baseline,
            text: line.text.clone(),
            size: line.size,
            face: line.face,
            color: BODY_COLOR,
        });
    }

    if body_truncated {
        truncated = true;
        if let Some(idx) = last_text {
            if let LayoutItem::Text {
                text, size, face, x, ..
            } = &mut items[idx]
            {
                let max = width - MARGIN - *x;
                *text = ellipsize(text, *face, *size, max);
            }
        }
    }

    if let Some((idx, top)) = panel_at {
        let bottom = cursor - PANEL_PAD;
        items.insert(
            idx,
            LayoutItem::Panel {
                left: MARGIN,
                bottom,
                width: content_width,
                height: top - bottom,
                fill: PANEL_FILL,
                stroke: Some(PANEL_STROKE),
            },
        );
    }

    if truncated {
        debug!(
            "Page {}: content truncated at font scale {}",
            ctx.page_num, font_scale
        );
    }

    PageLayout {
        width,
        height,
        items,
        font_scale,
        truncated,
    }
}

/// Decode images and plan every page of a presentation.
///
/// Image bytes that do not decode are dropped for that slide; the page is
/// planned without an image region.
pub fn plan_presentation(presentation: &Presentation) -> Vec<PlannedPage> {
    let page_count = presentation.slides.len();
    presentation
        .slides
        .iter()
        .enumerate()
        .map(|(i, slide)| {
            let image = slide
                .image
                .as_ref()
                .and_then(|asset| match image::load_from_memory(&asset.bytes) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        warn!("Slide {}: dropping undecodable image ({})", i + 1, e);
                        None
                    }
                });
            let ctx = PageContext {
                page_num: i + 1,
                page_count,
                deck_title: &presentation.title,
                date: (i == 0).then_some(presentation.generated_on),
                page_size: presentation.page_size,
            };
            let layout = plan_page(
                &slide.record,
                image.as_ref().map(|img| (img.width(), img.height())),
                &ctx,
            );
            PlannedPage { layout, image }
        })
        .collect()
}
