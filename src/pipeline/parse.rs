//! Parsing of the model reply into validated [`SlideRecord`]s.
//!
//! Models are asked for bare JSON but routinely wrap it in fences, prefix it
//! with a sentence, or emit one malformed slide among several good ones. The
//! parser cleans the text with deterministic rules, locates the JSON value,
//! then validates every slide entry on its own so one bad entry costs one
//! slide rather than the whole reply.
//!
//! Rules (applied in order):
//! 1. Strip outer Markdown code fences
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Locate the JSON object (first `{` to last `}`) or bare array
//! 5. Validate each entry, dropping invalid ones

use crate::error::SlidesError;
use crate::slide::SlideRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Valid slides from one reply, and how many entries were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSlides {
    pub slides: Vec<SlideRecord>,
    pub dropped: usize,
}

/// Parse a raw model reply.
///
/// Returns `Err` with a short description when no JSON slide list can be
/// found at all; individual invalid entries are counted in
/// [`ParsedSlides::dropped`] instead.
pub fn parse_slides(raw: &str) -> Result<ParsedSlides, String> {
    let s = strip_code_fences(raw);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);

    let value = locate_json(&s).ok_or_else(|| {
        format!(
            "no JSON slide list in reply (starts with {:?})",
            s.chars().take(60).collect::<String>()
        )
    })?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("slides") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(format!(
                    "\"slides\" is {} instead of an array",
                    json_type(&other)
                ))
            }
            None => return Err("JSON object has no \"slides\" field".into()),
        },
        other => return Err(format!("reply is a JSON {}", json_type(&other))),
    };

    let total = entries.len();
    let slides: Vec<SlideRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match validate_entry(entry) {
            Ok(record) => Some(record),
            Err(reason) => {
                debug!("Dropping slide entry {}: {}", i + 1, reason);
                None
            }
        })
        .collect();

    Ok(ParsedSlides {
        dropped: total - slides.len(),
        slides,
    })
}

/// Apply the slide-count policy: too few is an error, too many is cut.
pub fn enforce_slide_bounds(
    mut slides: Vec<SlideRecord>,
    min: usize,
    max: usize,
) -> Result<Vec<SlideRecord>, SlidesError> {
    if slides.len() < min {
        return Err(SlidesError::GenerationUnderflow {
            produced: slides.len(),
            required: min,
        });
    }
    if slides.len() > max {
        debug!("Truncating {} slides to {}", slides.len(), max);
        slides.truncate(max);
    }
    Ok(slides)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Locate the JSON value ────────────────────────────────────────────
//
// Prose before or after the JSON is common ("Here are your slides: {...}").
// Whichever bracket opens first decides whether an object or a bare array is
// tried first; the other shape is the fallback.

fn locate_json(input: &str) -> Option<Value> {
    let object = span(input, '{', '}');
    let array = span(input, '[', ']');

    let ordered = match (object, array) {
        (Some(o), Some(a)) if a.0 < o.0 => [Some(a), Some(o)],
        (o, a) => [o, a],
    };

    ordered
        .into_iter()
        .flatten()
        .find_map(|(start, end)| serde_json::from_str::<Value>(&input[start..=end]).ok())
}

fn span(input: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = input.find(open)?;
    let end = input.rfind(close)?;
    (end > start).then_some((start, end))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Rule 5: Validate entries ─────────────────────────────────────────────────

/// One slide entry as the model may write it. Only `title` and
/// `bullet_points` are required; everything else is coerced leniently.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSlide {
    title: Option<Value>,
    #[serde(alias = "bullets")]
    bullet_points: Option<Value>,
    #[serde(alias = "additional_info")]
    explanation: Option<Value>,
    #[serde(alias = "image_description")]
    image_query: Option<Value>,
    image_urls: Option<Value>,
    #[serde(alias = "references")]
    reference_urls: Option<Value>,
}

static RE_BULLET_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[•\-*]|\d+[.)])\s+").unwrap());

/// A scalar as text: strings as-is, numbers and booleans printed.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A string becomes a one-element list; a list keeps its scalar items.
fn text_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// A list of strings is joined with spaces into one block of text.
fn text_block(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(_)) => text_list(value).join(" "),
        Some(other) => scalar_text(other).unwrap_or_default(),
        None => String::new(),
    }
}

fn validate_entry(entry: Value) -> Result<SlideRecord, String> {
    if !entry.is_object() {
        return Err(format!("slide entry is {}", json_type(&entry)));
    }
    let raw: RawSlide = serde_json::from_value(entry).map_err(|e| e.to_string())?;

    let title = raw.title.as_ref().and_then(scalar_text).unwrap_or_default();
    if title.is_empty() {
        return Err("missing title".into());
    }

    let bullets: Vec<String> = text_list(raw.bullet_points.as_ref())
        .iter()
        .map(|b| RE_BULLET_MARKER.replace(b, "").trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    if bullets.is_empty() {
        return Err(format!("slide '{title}' has no bullet points"));
    }

    let image_query = Some(text_block(raw.image_query.as_ref()))
        .filter(|q| !q.is_empty())
        .or_else(|| text_list(raw.image_urls.as_ref()).into_iter().next())
        .unwrap_or_else(|| title.clone());

    let references = text_list(raw.reference_urls.as_ref())
        .into_iter()
        .filter(|r| is_http_url(r))
        .collect();

    Ok(SlideRecord {
        bullets,
        explanation: text_block(raw.explanation.as_ref()),
        image_query,
        references,
        title,
    })
}

/// True for absolute `http://` / `https://` URLs with a non-empty host.
pub fn is_http_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide_json(title: &str) -> String {
        format!(
            r#"{{"title":"{title}","bullet_points":["a","b","c"],"explanation":"e","image_query":"q","reference_urls":["https://example.org"]}}"#
        )
    }

    fn deck_json(n: usize) -> String {
        let slides: Vec<String> = (1..=n).map(|i| slide_json(&format!("S{i}"))).collect();
        format!(r#"{{"slides":[{}]}}"#, slides.join(","))
    }

    #[test]
    fn parses_clean_reply() {
        let parsed = parse_slides(&deck_json(7)).unwrap();
        assert_eq!(parsed.slides.len(), 7);
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.slides[0].title, "S1");
        assert_eq!(parsed.slides[0].references, vec!["https://example.org"]);
    }

    #[test]
    fn strips_fences_and_crlf() {
        let raw = format!("```json\r\n{}\r\n```", deck_json(6));
        assert_eq!(parse_slides(&raw).unwrap().slides.len(), 6);
    }

    #[test]
    fn tolerates_surrounding_prose_and_invisible_chars() {
        let raw = format!(
            "Here are your slides:\n\u{FEFF}{}\nLet me know if you need changes.",
            deck_json(6)
        );
        assert_eq!(parse_slides(&raw).unwrap().slides.len(), 6);
    }

    #[test]
    fn accepts_bare_array() {
        let raw = format!("[{},{}]", slide_json("A"), slide_json("B"));
        let parsed = parse_slides(&raw).unwrap();
        assert_eq!(parsed.slides.len(), 2);
        assert_eq!(parsed.slides[1].title, "B");
    }

    #[test]
    fn drops_invalid_entries_individually() {
        let raw = format!(
            r#"{{"slides":[{},{{"title":"","bullet_points":["x"]}},{{"title":"No bullets","bullet_points":[]}},{{"title":"Object bullets","bullet_points":{{"a":1}}}},"not an object",{}]}}"#,
            slide_json("Good 1"),
            slide_json("Good 2")
        );
        let parsed = parse_slides(&raw).unwrap();
        assert_eq!(parsed.slides.len(), 2);
        assert_eq!(parsed.dropped, 4);
    }

    #[test]
    fn optional_fields_with_unexpected_types_are_coerced() {
        let odd = [
            r#"{"title":"Ref string","bullet_points":["a"],"reference_urls":"https://example.org/one"}"#,
            r#"{"title":"Explanation list","bullet_points":["a"],"explanation":["First part.","Second part."]}"#,
            r#"{"title":"Numeric query","bullet_points":"single bullet","image_query":42}"#,
            r#"{"title":"Object fields","bullet_points":["a"],"explanation":{"x":1},"image_urls":7}"#,
        ];
        let mut entries: Vec<String> = (1..=2).map(|i| slide_json(&format!("S{i}"))).collect();
        entries.extend(odd.iter().map(|s| s.to_string()));
        let raw = format!(r#"{{"slides":[{}]}}"#, entries.join(","));

        let parsed = parse_slides(&raw).unwrap();
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.slides.len(), 6);
        assert_eq!(parsed.slides[2].references, vec!["https://example.org/one"]);
        assert_eq!(parsed.slides[3].explanation, "First part. Second part.");
        assert_eq!(parsed.slides[4].bullets, vec!["single bullet"]);
        assert_eq!(parsed.slides[4].image_query, "42");
        assert!(parsed.slides[5].explanation.is_empty());
        assert_eq!(parsed.slides[5].image_query, "Object fields");
        assert!(enforce_slide_bounds(parsed.slides, 6, 10).is_ok());
    }

    #[test]
    fn accepts_field_aliases() {
        let raw = r#"{"slides":[{"title":"Alias","bullets":["• one","- two","* three","4. four"],"additional_info":"more","image_urls":["https://img.example/x.png"],"references":["not a url","https://a.example/ref"]}]}"#;
        let s = &parse_slides(raw).unwrap().slides[0];
        assert_eq!(s.bullets, vec!["one", "two", "three", "four"]);
        assert_eq!(s.explanation, "more");
        assert_eq!(s.image_query, "https://img.example/x.png");
        assert_eq!(s.references, vec!["https://a.example/ref"]);
    }

    #[test]
    fn image_query_falls_back_to_title() {
        let raw = r#"[{"title":"Chlorophyll","bullet_points":["green"]}]"#;
        let s = &parse_slides(raw).unwrap().slides[0];
        assert_eq!(s.image_query, "Chlorophyll");
        assert!(s.explanation.is_empty());
        assert!(s.references.is_empty());
    }

    #[test]
    fn unparseable_reply_is_error() {
        assert!(parse_slides("I cannot help with that.").is_err());
        assert!(parse_slides(r#"{"title":"no slides field"}"#).is_err());
        assert!(parse_slides(r#"{"slides":"nope"}"#).is_err());
    }

    #[test]
    fn underflow_is_never_padded() {
        let slides = parse_slides(&deck_json(4)).unwrap().slides;
        match enforce_slide_bounds(slides, 6, 10) {
            Err(SlidesError::GenerationUnderflow { produced, required }) => {
                assert_eq!((produced, required), (4, 6));
            }
            other => panic!("expected underflow, got {other:?}"),
        }
    }

    #[test]
    fn overflow_is_truncated_in_order() {
        let slides = parse_slides(&deck_json(12)).unwrap().slides;
        let kept = enforce_slide_bounds(slides, 6, 10).unwrap();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[9].title, "S10");
    }

    #[test]
    fn http_url_check() {
        assert!(is_http_url("https://example.org/path?q=1"));
        assert!(is_http_url("http://example.org"));
        assert!(!is_http_url("ftp://example.org"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("see https://example.org"));
        assert!(!is_http_url("https://exa mple.org"));
    }
}
