//! Input normalisation: topic or uploaded document → [`SourceMaterial`].
//!
//! Dispatch is on the *declared* MIME type only; bytes that do not parse as
//! the declared kind are reported as [`SlidesError::UnsupportedFormat`]
//! rather than sniffed into some other kind. The emptiness check runs last,
//! on the extracted text, and always before any network call is made.

use crate::error::SlidesError;
use crate::pipeline::{pdfium, summary};
use crate::request::{DocumentKind, SourceInput, SourceMaterial, SourceOrigin, UploadedDocument};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};

const DOCX_BODY_PART: &str = "word/document.xml";

/// Normalise the caller's input into plain-text source material.
///
/// `pdfium_lib` is only consulted for PDF uploads.
pub async fn normalize(
    input: &SourceInput,
    pdfium_lib: Option<&Path>,
) -> Result<SourceMaterial, SlidesError> {
    match input {
        SourceInput::Topic(topic) => {
            if topic.trim().is_empty() {
                return Err(SlidesError::EmptyContent {
                    origin: "topic".into(),
                });
            }
            Ok(SourceMaterial {
                text: topic.clone(),
                origin: SourceOrigin::Topic,
            })
        }
        SourceInput::Document(doc) => normalize_document(doc, pdfium_lib).await,
    }
}

async fn normalize_document(
    doc: &UploadedDocument,
    pdfium_lib: Option<&Path>,
) -> Result<SourceMaterial, SlidesError> {
    let kind =
        DocumentKind::from_mime(&doc.mime_type).ok_or_else(|| SlidesError::UnsupportedFormat {
            mime_type: doc.mime_type.clone(),
            reason: "not a PDF, DOCX, TXT or CSV document".into(),
        })?;

    let origin = format!(
        "{} document{}",
        kind,
        doc.file_name
            .as_deref()
            .map(|n| format!(" '{n}'"))
            .unwrap_or_default()
    );

    if doc.bytes.is_empty() {
        return Err(SlidesError::EmptyContent { origin });
    }

    info!("Extracting text from {} ({} bytes)", origin, doc.bytes.len());

    let text = match kind {
        DocumentKind::Txt => extract_txt(&doc.bytes),
        DocumentKind::Docx => extract_docx(&doc.bytes)?,
        DocumentKind::Csv => summary::summarize_csv(&doc.bytes)?,
        DocumentKind::Pdf => pdfium::extract_text(doc.bytes.clone(), pdfium_lib).await?,
    };

    if text.trim().is_empty() {
        return Err(SlidesError::EmptyContent { origin });
    }

    debug!("Extracted {} chars from {}", text.chars().count(), origin);

    Ok(SourceMaterial {
        text,
        origin: SourceOrigin::Document(kind),
    })
}

/// Decode a text upload as UTF-8, dropping a leading BOM.
///
/// Invalid sequences become U+FFFD instead of failing the request; a
/// Latin-1 upload with a few accented characters still makes a usable prompt.
pub fn extract_txt(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}

/// Extract paragraph text from a DOCX package.
///
/// Reads `word/document.xml` and emits the text runs (`w:t`), with a newline
/// per paragraph (`w:p`) and line break (`w:br`, `w:cr`), and a tab per
/// `w:tab` or table cell boundary.
pub fn extract_docx(bytes: &[u8]) -> Result<String, SlidesError> {
    let unsupported = |reason: String| SlidesError::UnsupportedFormat {
        mime_type: DocumentKind::Docx.mime_type().to_string(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| unsupported(format!("not a DOCX package: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| unsupported(format!("missing {DOCX_BODY_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| unsupported(format!("unreadable {DOCX_BODY_PART}: {e}")))?;

    docx_body_text(&xml).map_err(unsupported)
}

/// Walk the WordprocessingML body and collect its visible text.
fn docx_body_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:br" | b"w:cr" => out.push('\n'),
                b"w:tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Text(ref t)) => {
                if in_text {
                    out.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref r)) => {
                if in_text {
                    if let Some(ch) = resolve_entity(r) {
                        out.push(ch);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                b"w:tc" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

/// Resolve `&amp;`-style and numeric character references.
fn resolve_entity(r: &quick_xml::events::BytesRef<'_>) -> Option<char> {
    if let Ok(Some(ch)) = r.resolve_char_ref() {
        return Some(ch);
    }
    match &**r {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => None,
    }
}
