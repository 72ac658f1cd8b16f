//! PDF rendering: execute page layouts with pdfium.
//!
//! All placement decisions are made by [`crate::pipeline::layout`]; this
//! module only turns each [`LayoutItem`] into a pdfium page object. Work
//! runs inside `spawn_blocking` because pdfium calls are synchronous and
//! CPU-bound.

use crate::error::SlidesError;
use crate::output::PageSummary;
use crate::pipeline::layout::{self, FontFace, LayoutItem, PlannedPage, Rgb};
use crate::pipeline::pdfium::bind;
use crate::slide::Presentation;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// A finished PDF and a summary of each page.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: Vec<PageSummary>,
}

/// Render one page per slide.
///
/// Undecodable images are dropped during planning; only a failure of pdfium
/// itself (binding, page creation, serialisation) is an error.
pub async fn render_presentation(
    presentation: &Presentation,
    pdfium_lib: Option<&Path>,
) -> Result<RenderedPdf, SlidesError> {
    let presentation = presentation.clone();
    let lib = pdfium_lib.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || {
        let planned = layout::plan_presentation(&presentation);
        render_blocking(&presentation, &planned, lib.as_deref())
    })
    .await
    .map_err(|e| SlidesError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_err(stage: &str) -> impl Fn(PdfiumError) -> SlidesError + '_ {
    move |e| SlidesError::Render {
        detail: format!("{stage}: {:?}", e),
    }
}

fn color(c: Rgb) -> PdfColor {
    PdfColor::new(c.0, c.1, c.2, 255)
}

/// Blocking implementation of deck rendering.
fn render_blocking(
    presentation: &Presentation,
    planned: &[PlannedPage],
    pdfium_lib: Option<&Path>,
) -> Result<RenderedPdf, SlidesError> {
    let pdfium = bind(pdfium_lib)?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(render_err("create document"))?;

    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();

    let mut summaries = Vec::with_capacity(planned.len());

    for (idx, (page_plan, slide)) in planned.iter().zip(&presentation.slides).enumerate() {
        let plan = &page_plan.layout;
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(plan.width),
                PdfPoints::new(plan.height),
            ))
            .map_err(render_err("create page"))?;

        for item in &plan.items {
            match item {
                LayoutItem::Text {
                    x,
                    y,
                    text,
                    size,
                    face,
                    color: c,
                } => {
                    let font = match face {
                        FontFace::Regular => regular,
                        FontFace::Bold => bold,
                    };
                    let mut object = page
                        .objects_mut()
                        .create_text_object(
                            PdfPoints::new(*x),
                            PdfPoints::new(*y),
                            text,
                            font,
                            PdfPoints::new(*size),
                        )
                        .map_err(render_err("draw text"))?;
                    object
                        .set_fill_color(color(*c))
                        .map_err(render_err("colour text"))?;
                }
                LayoutItem::Panel {
                    left,
                    bottom,
                    width,
                    height,
                    fill,
                    stroke,
                } => {
                    page.objects_mut()
                        .create_path_object_rect(
                            PdfRect::new_from_values(*bottom, *left, bottom + height, left + width),
                            stroke.map(color),
                            stroke.map(|_| PdfPoints::new(0.75)),
                            Some(color(*fill)),
                        )
                        .map_err(render_err("draw panel"))?;
                }
                LayoutItem::Image {
                    left,
                    bottom,
                    width,
                    height,
                } => {
                    if let Some(ref image) = page_plan.image {
                        page.objects_mut()
                            .create_image_object(
                                PdfPoints::new(*left),
                                PdfPoints::new(*bottom),
                                image,
                                Some(PdfPoints::new(*width)),
                                Some(PdfPoints::new(*height)),
                            )
                            .map_err(render_err("place image"))?;
                    }
                }
            }
        }

        page.regenerate_content()
            .map_err(render_err("finish page"))?;

        debug!(
            "Page {}: {} objects, font scale {}, truncated={}",
            idx + 1,
            plan.items.len(),
            plan.font_scale,
            plan.truncated
        );

        summaries.push(PageSummary {
            page_num: idx + 1,
            title: slide.record.title.clone(),
            has_image: plan.has_image(),
            font_scale: plan.font_scale,
            truncated: plan.truncated,
        });
    }

    let bytes = document
        .save_to_bytes()
        .map_err(render_err("save document"))?;

    info!(
        "Rendered {} pages ({} bytes)",
        summaries.len(),
        bytes.len()
    );

    Ok(RenderedPdf {
        bytes,
        pages: summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSize;
    use crate::slide::{ImageAsset, ResolvedSlide, SlideRecord};
    use chrono::NaiveDate;

    fn pdfium_available() -> bool {
        match bind(None) {
            Ok(_) => true,
            Err(e) => {
                println!("SKIP: pdfium not available ({e})");
                false
            }
        }
    }

    fn record(title: &str) -> SlideRecord {
        SlideRecord {
            title: title.into(),
            bullets: vec!["Sunlight".into(), "Water".into(), "Carbon dioxide".into()],
            explanation: "Plants turn light into chemical energy.".into(),
            image_query: "leaf".into(),
            references: vec!["https://example.org/photosynthesis".into()],
        }
    }

    fn png() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 9, image::Rgb([20, 140, 60])))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn renders_one_page_per_slide() {
        if !pdfium_available() {
            return;
        }
        let deck = Presentation {
            title: "Photosynthesis".into(),
            slides: vec![
                ResolvedSlide::from_outcome(
                    record("Inputs"),
                    Ok(ImageAsset {
                        bytes: png(),
                        content_type: "image/png".into(),
                        source_url: None,
                    }),
                ),
                ResolvedSlide::without_image(record("Outputs")),
                ResolvedSlide::from_outcome(
                    record("Broken image"),
                    Ok(ImageAsset {
                        bytes: b"garbage".to_vec(),
                        content_type: "image/png".into(),
                        source_url: None,
                    }),
                ),
            ],
            page_size: PageSize::A4,
            generated_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        };

        let out = render_presentation(&deck, None).await.unwrap();
        assert!(out.bytes.starts_with(b"%PDF"));
        assert_eq!(out.pages.len(), 3);
        assert!(out.pages[0].has_image);
        assert!(!out.pages[1].has_image);
        assert!(!out.pages[2].has_image);

        let pdfium = bind(None).unwrap();
        let doc = pdfium.load_pdf_from_byte_vec(out.bytes, None).unwrap();
        assert_eq!(doc.pages().len(), 3);
        let text = doc.pages().get(1).unwrap().text().unwrap().all();
        assert!(text.contains("Outputs"), "{text}");
    }
}
