//! Prompts for slide-content generation.
//!
//! Every prompt lives here so the wording can change without touching the
//! retry and parsing logic in [`crate::pipeline::llm`]. Unit tests inspect
//! the built prompts directly.
//!
//! Callers can override the system prompt via
//! [`crate::config::PresentationConfig::system_prompt`]; `{min_slides}` and
//! `{max_slides}` placeholders in an override are filled in as well.

use crate::request::{SourceMaterial, SourceOrigin};

/// Default system prompt. `{min_slides}` / `{max_slides}` are substituted.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an assistant that writes professional presentation slides.

Follow these rules precisely:

1. STRUCTURE
   - Write between {min_slides} and {max_slides} slides
   - Start with a title slide and an introduction, end with a conclusion
   - Every slide has a clear title and 3-6 concise bullet points

2. CONTENT
   - "explanation": 2-4 sentences with detail, statistics or examples that
     support the bullet points
   - "image_query": a short image-search phrase (2-6 words) describing a
     photo or diagram that would illustrate the slide
   - "reference_urls": 1-3 absolute https URLs to credible sources or
     further reading

3. OUTPUT FORMAT
   - Respond ONLY with valid JSON, no commentary, no Markdown fences
   - Use exactly this structure:

{
  "slides": [
    {
      "title": "Slide Title",
      "bullet_points": ["First key point", "Second key point", "Third key point"],
      "explanation": "Supporting detail for the points above.",
      "image_query": "short image search phrase",
      "reference_urls": ["https://example.org/article"]
    }
  ]
}"#;

/// Build the system prompt for the configured slide range.
pub fn system_prompt(template: Option<&str>, min_slides: usize, max_slides: usize) -> String {
    template
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .replace("{min_slides}", &min_slides.to_string())
        .replace("{max_slides}", &max_slides.to_string())
}

/// Build the user message for the given source material.
///
/// Topics are sent verbatim. Document text is cut to `max_source_chars`
/// characters (suffixed with `...`) so a long upload cannot crowd the reply
/// out of the model's context window.
pub fn user_prompt(source: &SourceMaterial, title: &str, max_source_chars: usize) -> String {
    match source.origin {
        SourceOrigin::Topic => format!(
            "Topic to present: {}\n\n\
             Generate comprehensive content from your own knowledge, with relevant \
             examples, statistics and references.",
            source.text.trim()
        ),
        SourceOrigin::Document(kind) => format!(
            "{kind} document content to analyse:\n\"\"\"\n{}\n\"\"\"\n\n\
             Presentation title: {title}\n\n\
             Build the slides from the document above. Prefer its facts and figures \
             over general knowledge.",
            truncate_chars(&source.text, max_source_chars)
        ),
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
