//! Integration tests for the presentation pipeline.
//!
//! The language model and the image search are replaced with in-process
//! mocks, so these run offline. Tests that render a PDF need the pdfium
//! shared library and print `SKIP` when it cannot be bound.
//!
//! The live test at the bottom calls Gemini and is gated behind
//! `E2E_ENABLED`:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_slides::pipeline::{input, layout, pdfium};
use edgequake_slides::{
    draft_presentation, generate_presentation, generate_presentation_to_file,
    render_presentation, DocumentKind, Generation, GenerationProgressCallback, ImageAsset,
    ImageError, ImageSource, PresentationConfig, PresentationRequest, Prompt, ServiceError,
    SlidesError, SourceInput, SourceOrigin, TextGenerator, UploadedDocument,
};
use std::collections::{HashSet, VecDeque};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Mocks ────────────────────────────────────────────────────────────────────

/// Replays scripted replies in order and records every prompt it receives.
struct MockGenerator {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockGenerator {
    fn new(replies: Vec<Result<String, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn always(reply: String) -> Arc<Self> {
        Self::new(vec![Ok(reply.clone()), Ok(reply.clone()), Ok(reply)])
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_user_prompt(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|p| p.user.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ServiceError::EmptyResponse))?;
        Ok(Generation {
            text: reply,
            prompt_tokens: 100,
            completion_tokens: 400,
        })
    }
}

/// Returns a small PNG for every query except the ones listed as missing.
struct MockImages {
    missing: HashSet<String>,
    calls: AtomicUsize,
}

impl MockImages {
    fn new(missing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            missing: missing.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ImageSource for MockImages {
    async fn fetch(&self, query: &str) -> Result<ImageAsset, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(query) {
            return Err(ImageError::NoResults {
                query: query.to_string(),
            });
        }
        Ok(ImageAsset {
            bytes: png(),
            content_type: "image/png".into(),
            source_url: Some(format!("https://images.test/{query}.png")),
        })
    }
}

#[derive(Default)]
struct CountingCallback {
    attempts: AtomicUsize,
    resolved: AtomicUsize,
    missing: AtomicUsize,
}

impl GenerationProgressCallback for CountingCallback {
    fn on_generation_start(&self, _attempt: u32) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_image_resolved(&self, _slide: usize, _total: usize, _bytes: usize) {
        self.resolved.fetch_add(1, Ordering::SeqCst);
    }

    fn on_image_missing(&self, _slide: usize, _total: usize, _reason: &str) {
        self.missing.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn png() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        32,
        18,
        image::Rgb([30, 150, 70]),
    ))
    .write_to(&mut buf, image::ImageFormat::Png)
    .unwrap();
    buf.into_inner()
}

const PHOTOSYNTHESIS: [&str; 7] = [
    "What Is Photosynthesis",
    "Light-Dependent Reactions",
    "The Calvin Cycle",
    "Chlorophyll and Pigments",
    "Factors Affecting the Rate",
    "Photosynthesis and Climate",
    "Summary",
];

/// A model reply with one slide per title; image queries are `image-N`.
fn reply_for(titles: &[&str]) -> String {
    let slides: Vec<serde_json::Value> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            serde_json::json!({
                "title": title,
                "bullet_points": [
                    format!("{title}: first point"),
                    format!("{title}: second point"),
                    "Plants convert light energy into chemical energy",
                ],
                "explanation": format!("{title} explained in a few sentences."),
                "image_query": format!("image-{}", i + 1),
                "reference_urls": ["https://en.wikipedia.org/wiki/Photosynthesis"],
            })
        })
        .collect();
    format!(
        "```json\n{}\n```",
        serde_json::to_string_pretty(&serde_json::json!({ "slides": slides })).unwrap()
    )
}

fn config(generator: Arc<MockGenerator>, images: Arc<MockImages>) -> PresentationConfig {
    PresentationConfig::builder()
        .generator(generator as Arc<dyn TextGenerator>)
        .image_source(images as Arc<dyn ImageSource>)
        .retry_backoff_ms(10)
        .build()
        .unwrap()
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

fn pdfium_available() -> bool {
    match pdfium::bind(None) {
        Ok(_) => true,
        Err(e) => {
            println!("SKIP: pdfium not available ({e})");
            false
        }
    }
}

// ── Photosynthesis scenario ──────────────────────────────────────────────────

#[tokio::test]
async fn photosynthesis_deck_with_two_missing_images() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let images = MockImages::new(&["image-3", "image-6"]);
    let progress = Arc::new(CountingCallback::default());
    let mut config = config(generator.clone(), images.clone());
    config.progress_callback = Some(progress.clone() as Arc<dyn GenerationProgressCallback>);

    let deck = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();

    assert_eq!(deck.title, "Photosynthesis");
    assert_eq!(deck.slides.len(), 7);
    assert_eq!(deck.images_resolved(), 5);
    assert_eq!(images.calls.load(Ordering::SeqCst), 7);
    assert_eq!(progress.resolved.load(Ordering::SeqCst), 5);
    assert_eq!(progress.missing.load(Ordering::SeqCst), 2);

    // Slide order follows the model's order regardless of fetch completion.
    let titles: Vec<&str> = deck.records().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, PHOTOSYNTHESIS);
    assert!(matches!(
        deck.slides[2].image_error,
        Some(ImageError::NoResults { .. })
    ));
    assert!(deck.slides[5].image.is_none());

    let pages = layout::plan_presentation(&deck);
    assert_eq!(pages.len(), 7);
    let without_image: Vec<usize> = pages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.layout.has_image())
        .map(|(i, _)| i + 1)
        .collect();
    assert_eq!(without_image, vec![3, 6]);

    for (page, record) in pages.iter().zip(deck.records()) {
        let text = page.layout.text();
        assert!(text.contains(&record.title), "missing title on page: {text}");
        assert!(text.contains("first point"), "missing bullets on page: {text}");
    }
    assert!(pages[0].layout.text().contains("Generated on"));
    assert!(pages[6].layout.text().contains("Photosynthesis | 7 / 7"));
}

#[tokio::test]
async fn photosynthesis_pdf_has_one_page_per_slide() {
    if !pdfium_available() {
        return;
    }
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let images = MockImages::new(&["image-3", "image-6"]);
    let config = config(generator, images);

    let output = generate_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();

    assert_eq!(output.file_name, "Photosynthesis_presentation.pdf");
    assert!(output.pdf.starts_with(b"%PDF"));
    assert_eq!(output.pages.len(), 7);
    assert_eq!(output.stats.slide_count, 7);
    assert_eq!(output.stats.images_resolved, 5);
    assert_eq!(output.stats.images_missing, 2);
    assert_eq!(output.stats.generation_attempts, 1);
    assert_eq!(output.stats.total_output_tokens, 400);
    assert!(!output.pages[2].has_image);
    assert!(output.pages[3].has_image);

    let pdfium = pdfium::bind(None).unwrap();
    let doc = pdfium.load_pdf_from_byte_vec(output.pdf, None).unwrap();
    assert_eq!(doc.pages().len(), 7);
}

#[tokio::test]
async fn presentation_is_written_into_directory() {
    if !pdfium_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS[..6]));
    let images = MockImages::new(&[]);
    let config = config(generator, images);

    let stats = generate_presentation_to_file(
        &PresentationRequest::topic("Photosynthesis"),
        dir.path(),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(stats.slide_count, 6);
    let path = dir.path().join("Photosynthesis_presentation.pdf");
    assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
}

// ── Input failures never reach the model ─────────────────────────────────────

#[tokio::test]
async fn empty_txt_upload_fails_before_generation() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let images = MockImages::new(&[]);
    let config = config(generator.clone(), images.clone());

    let request = PresentationRequest::document(
        UploadedDocument::new(b"  \n\t \r\n".to_vec(), "text/plain").with_file_name("notes.txt"),
    );
    let err = draft_presentation(&request, &config).await.unwrap_err();

    assert!(matches!(err, SlidesError::EmptyContent { .. }), "{err:?}");
    assert_eq!(generator.calls(), 0);
    assert_eq!(images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn png_upload_is_unsupported() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let config = config(generator.clone(), MockImages::new(&[]));

    let request = PresentationRequest::document(UploadedDocument::new(png(), "image/png"));
    let err = generate_presentation(&request, &config).await.unwrap_err();

    match err {
        SlidesError::UnsupportedFormat { mime_type, .. } => assert_eq!(mime_type, "image/png"),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
    assert_eq!(generator.calls(), 0);
}

// ── Document inputs reach the prompt ─────────────────────────────────────────

#[tokio::test]
async fn pdf_upload_normalizes_to_slide_text() {
    if !pdfium_available() {
        return;
    }
    // Render a deck, then feed the PDF back in as an upload.
    let config = config(
        MockGenerator::always(reply_for(&PHOTOSYNTHESIS)),
        MockImages::new(&[]),
    );
    let deck = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();
    let pdf = render_presentation(&deck, None).await.unwrap().bytes;

    let upload = SourceInput::Document(
        UploadedDocument::new(pdf.clone(), "application/pdf").with_file_name("deck.pdf"),
    );
    let material = input::normalize(&upload, None).await.unwrap();
    assert_eq!(material.origin, SourceOrigin::Document(DocumentKind::Pdf));
    for title in ["The Calvin Cycle", "Chlorophyll and Pigments", "Summary"] {
        assert!(material.text.contains(title), "missing {title}: {}", material.text);
    }

    // And through the whole pipeline: the extracted text reaches the model.
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let config = self::config(generator.clone(), MockImages::new(&[]));
    let request =
        PresentationRequest::document(UploadedDocument::new(pdf, "application/pdf"));
    draft_presentation(&request, &config).await.unwrap();
    assert!(generator.last_user_prompt().contains("Light-Dependent Reactions"));
}

#[tokio::test]
async fn corrupt_pdf_upload_is_unsupported() {
    if !pdfium_available() {
        return;
    }
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let config = config(generator.clone(), MockImages::new(&[]));

    let request = PresentationRequest::document(UploadedDocument::new(
        b"%PDF-garbage".to_vec(),
        "application/pdf",
    ));
    let err = draft_presentation(&request, &config).await.unwrap_err();

    assert!(matches!(err, SlidesError::UnsupportedFormat { .. }), "{err:?}");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn docx_text_is_sent_to_the_model() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let config = config(generator.clone(), MockImages::new(&[]));

    let document = UploadedDocument::new(
        docx(&["Quarterly review", "Revenue grew 12% year over year."]),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    )
    .with_file_name("review.docx");
    let deck = draft_presentation(&PresentationRequest::document(document), &config)
        .await
        .unwrap();

    assert_eq!(deck.title, "review");
    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Quarterly review"), "{prompt}");
    assert!(prompt.contains("Revenue grew 12% year over year."), "{prompt}");
}

#[tokio::test]
async fn csv_is_summarised_for_the_model() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let config = config(generator.clone(), MockImages::new(&[]));

    let csv = "region,sales\nnorth,10\nsouth,30\nnorth,20\n";
    let document = UploadedDocument::new(csv.as_bytes().to_vec(), "text/csv");
    let request = PresentationRequest::document(document).with_title("Sales");
    let deck = draft_presentation(&request, &config).await.unwrap();

    assert_eq!(deck.title, "Sales");
    let prompt = generator.last_user_prompt();
    assert!(prompt.contains("Dataset with 3 rows and 2 columns"), "{prompt}");
    assert!(prompt.contains("Column 'sales' (numeric)"), "{prompt}");
    assert!(prompt.contains("most frequent 'north' (2)"), "{prompt}");
    assert!(!prompt.contains("south,30"), "raw rows should not be sent: {prompt}");
}

#[tokio::test]
async fn long_documents_are_truncated_in_the_prompt() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let mut config = config(generator.clone(), MockImages::new(&[]));
    config.max_source_chars = 100;

    let text = format!("{}TAIL-MARKER", "word ".repeat(200));
    let request =
        PresentationRequest::document(UploadedDocument::new(text.into_bytes(), "text/plain"));
    draft_presentation(&request, &config).await.unwrap();

    assert!(!generator.last_user_prompt().contains("TAIL-MARKER"));
}

// ── Generation policy ────────────────────────────────────────────────────────

#[tokio::test]
async fn too_few_slides_is_underflow() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS[..4]));
    let config = config(generator.clone(), MockImages::new(&[]));

    let err = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap_err();

    match err {
        SlidesError::GenerationUnderflow { produced, required } => {
            assert_eq!(produced, 4);
            assert_eq!(required, 6);
        }
        other => panic!("expected GenerationUnderflow, got {other:?}"),
    }
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn extra_slides_are_truncated_to_maximum() {
    let titles: Vec<String> = (1..=12).map(|i| format!("Slide {i}")).collect();
    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
    let generator = MockGenerator::always(reply_for(&titles));
    let config = config(generator, MockImages::new(&[]));

    let deck = draft_presentation(&PresentationRequest::topic("Counting"), &config)
        .await
        .unwrap();
    assert_eq!(deck.slides.len(), 10);
    assert_eq!(deck.slides[9].record.title, "Slide 10");
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let generator = MockGenerator::new(vec![
        Err(ServiceError::Http {
            status: 503,
            body: "overloaded".into(),
        }),
        Ok(reply_for(&PHOTOSYNTHESIS)),
    ]);
    let progress = Arc::new(CountingCallback::default());
    let mut config = config(generator.clone(), MockImages::new(&[]));
    config.progress_callback = Some(progress.clone() as Arc<dyn GenerationProgressCallback>);

    let deck = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();

    assert_eq!(deck.slides.len(), 7);
    assert_eq!(generator.calls(), 2);
    assert_eq!(progress.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_failure_is_generation_service_error() {
    let generator = MockGenerator::new(vec![
        Err(ServiceError::Network("connection reset".into())),
        Err(ServiceError::Network("connection reset".into())),
        Ok(reply_for(&PHOTOSYNTHESIS)),
    ]);
    let config = config(generator.clone(), MockImages::new(&[]));

    let err = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap_err();

    assert!(
        matches!(err, SlidesError::GenerationService { attempts: 2, .. }),
        "{err:?}"
    );
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn slow_model_times_out() {
    let generator = MockGenerator::slow(Duration::from_secs(5));
    let config = PresentationConfig::builder()
        .generator(generator.clone() as Arc<dyn TextGenerator>)
        .image_source(MockImages::new(&[]) as Arc<dyn ImageSource>)
        .api_timeout_secs(1)
        .max_retries(0)
        .build()
        .unwrap();

    let err = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap_err();

    match err {
        SlidesError::GenerationService { attempts, message } => {
            assert_eq!(attempts, 1);
            assert!(message.contains("timed out"), "{message}");
        }
        other => panic!("expected GenerationService, got {other:?}"),
    }
}

#[tokio::test]
async fn same_reply_gives_identical_slide_text() {
    let reply = reply_for(&PHOTOSYNTHESIS);
    let request = PresentationRequest::topic("Photosynthesis");

    let first = draft_presentation(
        &request,
        &config(MockGenerator::always(reply.clone()), MockImages::new(&[])),
    )
    .await
    .unwrap();
    let second = draft_presentation(
        &request,
        &config(
            MockGenerator::always(reply),
            MockImages::new(&["image-1", "image-2"]),
        ),
    )
    .await
    .unwrap();

    assert_eq!(first.slide_text(), second.slide_text());
    assert!(first.slide_text().contains("# 3. The Calvin Cycle"));
}

#[tokio::test]
async fn disabled_images_skip_the_source() {
    let generator = MockGenerator::always(reply_for(&PHOTOSYNTHESIS));
    let images = MockImages::new(&[]);
    let mut config = config(generator, images.clone());
    config.fetch_images = false;

    let deck = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();

    assert_eq!(deck.images_resolved(), 0);
    assert!(deck.slides.iter().all(|s| s.image_error.is_none()));
    assert_eq!(images.calls.load(Ordering::SeqCst), 0);
    assert!(layout::plan_presentation(&deck)
        .iter()
        .all(|p| !p.layout.has_image()));
}

// ── Live service ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_gemini_topic_deck() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let Ok(key) = std::env::var("GEMINI_API_KEY") else {
        println!("SKIP — GEMINI_API_KEY not set");
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter("edgequake_slides=debug")
        .try_init();

    let config = PresentationConfig::builder()
        .api_key(key)
        .fetch_images(false)
        .build()
        .unwrap();
    let deck = draft_presentation(&PresentationRequest::topic("Photosynthesis"), &config)
        .await
        .unwrap();

    println!("{}", deck.slide_text());
    assert!((6..=10).contains(&deck.slides.len()));
    assert!(deck
        .records()
        .all(|r| !r.title.is_empty() && !r.bullets.is_empty()));
}
