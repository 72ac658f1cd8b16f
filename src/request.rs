//! Request-side types: what the caller hands in, and the normalised source
//! material the generator works from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One presentation request: a topic or an uploaded document.
#[derive(Debug, Clone)]
pub struct PresentationRequest {
    pub input: SourceInput,
    /// Deck title. Defaults to the topic, or the document's file stem.
    pub title: Option<String>,
}

impl PresentationRequest {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            input: SourceInput::Topic(topic.into()),
            title: None,
        }
    }

    pub fn document(document: UploadedDocument) -> Self {
        Self {
            input: SourceInput::Document(document),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The title printed on the deck and used for the output file name.
    pub fn deck_title(&self) -> String {
        if let Some(t) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return t.to_string();
        }
        match &self.input {
            SourceInput::Topic(topic) => {
                let topic = topic.trim();
                if topic.is_empty() {
                    "Presentation".to_string()
                } else {
                    topic.to_string()
                }
            }
            SourceInput::Document(doc) => doc
                .file_name
                .as_deref()
                .and_then(|n| Path::new(n).file_stem())
                .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Presentation".to_string()),
        }
    }
}

/// Where the source material comes from.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Free-text topic, used verbatim as generation context.
    Topic(String),
    /// Uploaded document bytes with their declared MIME type.
    Document(UploadedDocument),
}

/// An uploaded document as received from the caller.
#[derive(Clone)]
pub struct UploadedDocument {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl UploadedDocument {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Read a document from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self {
            bytes,
            mime_type,
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }
}

impl fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// The four document kinds the input normaliser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Txt,
    Csv,
}

impl DocumentKind {
    /// Map a declared MIME type to a document kind.
    ///
    /// Parameters (`; charset=utf-8`) and case are ignored.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(DocumentKind::Docx)
            }
            "text/plain" => Some(DocumentKind::Txt),
            "text/csv" | "application/csv" | "text/comma-separated-values" => {
                Some(DocumentKind::Csv)
            }
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Txt => "text/plain",
            DocumentKind::Csv => "text/csv",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Docx => "DOCX",
            DocumentKind::Txt => "TXT",
            DocumentKind::Csv => "CSV",
        };
        f.write_str(s)
    }
}

/// Origin of the source material; selects the user-prompt variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrigin {
    Topic,
    Document(DocumentKind),
}

/// Normalised plain-text basis for content generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMaterial {
    pub text: String,
    pub origin: SourceOrigin,
}

impl SourceMaterial {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
