//! CLI binary for edgequake-slides.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PresentationConfig` and writes the resulting PDF.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use edgequake_slides::{
    draft_presentation, generate_presentation, write_presentation, GenerationProgressCallback,
    PageSize, Presentation, PresentationConfig, PresentationRequest, ProgressCallback,
    UploadedDocument,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the model writes, then a bar
/// over the image lookups. Image events arrive out of slide order.
struct CliProgressCallback {
    bar: ProgressBar,
    fetch_images: bool,
    /// Per-slide start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    images_done: AtomicUsize,
    images_missing: AtomicUsize,
}

impl CliProgressCallback {
    fn new(fetch_images: bool) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading source…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fetch_images,
            start_times: Mutex::new(HashMap::new()),
            images_done: AtomicUsize::new(0),
            images_missing: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once the slide count is known.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Illustrating");
        self.bar.reset_eta();
    }

    fn rendering(&self) {
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(spinner_style);
        self.bar.set_prefix("Rendering");
        self.bar.set_message("laying out pages…");
    }

    fn elapsed_secs(&self, slide: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&slide))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn image_finished(&self, total: usize) {
        self.bar.inc(1);
        if self.images_done.fetch_add(1, Ordering::SeqCst) + 1 == total {
            self.rendering();
        }
    }

    /// Remove the bar without a summary (dry runs and failures).
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_source_ready(&self, chars: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Source ready ({chars} chars)"))
        ));
    }

    fn on_generation_start(&self, attempt: u32) {
        self.bar.set_prefix("Generating");
        if attempt == 1 {
            self.bar.set_message("asking the model for slides…");
        } else {
            self.bar.set_message(format!("retrying (attempt {attempt})…"));
        }
    }

    fn on_slides_generated(&self, count: usize, dropped: usize) {
        let note = if dropped > 0 {
            dim(&format!("  ({dropped} invalid entries dropped)"))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} {} slides written{}",
            green("✓"),
            bold(&count.to_string()),
            note
        ));
        if self.fetch_images {
            self.activate_bar(count);
        } else {
            self.rendering();
        }
    }

    fn on_image_start(&self, slide: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(slide, Instant::now());
        }
        self.bar.set_message(format!("slide {slide}"));
    }

    fn on_image_resolved(&self, slide: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(slide);
        self.bar.println(format!(
            "  {} Slide {:>2}/{:<2}  {:<10}  {}",
            green("✓"),
            slide,
            total,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.image_finished(total);
    }

    fn on_image_missing(&self, slide: usize, total: usize, reason: &str) {
        let secs = self.elapsed_secs(slide);
        self.images_missing.fetch_add(1, Ordering::SeqCst);

        // Keep long error messages to one terminal line.
        let msg: String = if reason.chars().count() > 60 {
            let mut s: String = reason.chars().take(59).collect();
            s.push('…');
            s
        } else {
            reason.to_string()
        };

        self.bar.println(format!(
            "  {} Slide {:>2}/{:<2}  {}  {}",
            red("✗"),
            slide,
            total,
            red(&format!("no image: {msg}")),
            dim(&format!("{secs:.1}s")),
        ));
        self.image_finished(total);
    }

    fn on_render_complete(&self, pages: usize, bytes: usize) {
        self.bar.finish_and_clear();
        let missing = self.images_missing.load(Ordering::SeqCst);
        eprintln!(
            "{} {} pages rendered  {}{}",
            green("✔"),
            bold(&pages.to_string()),
            dim(&format!("{} KiB", bytes / 1024)),
            if missing > 0 {
                format!("  {}", cyan(&format!("⚠ {missing} without image")))
            } else {
                String::new()
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Deck about a topic, written to ./Photosynthesis_presentation.pdf
  slides2pdf --topic "Photosynthesis"

  # Deck from a document
  slides2pdf --document report.docx -o decks/

  # CSV data, fixed title, US Letter pages
  slides2pdf --document sales.csv --title "Q3 Sales" --page-size letter

  # Preview the outline without rendering
  slides2pdf --topic "Black holes" --dry-run

  # Use a different provider
  slides2pdf --provider openai --model gpt-4.1-mini --topic "Rust ownership"

SUPPORTED DOCUMENTS:
  .pdf   application/pdf          (needs the pdfium library)
  .docx  Word document
  .txt   text/plain
  .csv   text/csv                 (summarised as column statistics)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default generator)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, e.g. edgequake_slides=debug

SETUP:
  1. Set API key:   export GEMINI_API_KEY=...
  2. Install pdfium from https://github.com/bblanchon/pdfium-binaries and
     point PDFIUM_LIB_PATH at it (or place it next to the binary).
  3. Generate:      slides2pdf --topic "Photosynthesis"
"#;

/// Generate slide-deck PDFs from a topic or document using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "slides2pdf",
    version,
    about = "Generate slide-deck PDFs from a topic or document using LLMs",
    long_about = "Generate a 6-10 slide presentation from a topic or an uploaded PDF, DOCX, TXT \
or CSV file. A language model writes the slides, an image search illustrates them, and every \
slide is laid out on its own PDF page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP,
    group(ArgGroup::new("source").required(true).args(["topic", "document"]))
)]
struct Cli {
    /// Topic to build the deck about.
    #[arg(long, env = "SLIDES_TOPIC")]
    topic: Option<String>,

    /// PDF, DOCX, TXT or CSV file to build the deck from.
    #[arg(long, env = "SLIDES_DOCUMENT")]
    document: Option<PathBuf>,

    /// Output PDF file or directory (default: current directory).
    #[arg(short, long, env = "SLIDES_OUTPUT")]
    output: Option<PathBuf>,

    /// Deck title (default: the topic or the document file name).
    #[arg(long, env = "SLIDES_TITLE")]
    title: Option<String>,

    /// Override the MIME type guessed from the document extension.
    #[arg(long, env = "SLIDES_MIME")]
    mime: Option<String>,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "SLIDES_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "SLIDES_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Gemini API key (takes precedence over provider env vars).
    #[arg(long, env = "SLIDES_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Fewest slides to accept from the model.
    #[arg(long, env = "SLIDES_MIN_SLIDES", default_value_t = 6,
          value_parser = clap::value_parser!(u32).range(1..=50))]
    min_slides: u32,

    /// Most slides to keep; extra slides are dropped.
    #[arg(long, env = "SLIDES_MAX_SLIDES", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..=50))]
    max_slides: u32,

    /// Skip the image search; every slide renders text only.
    #[arg(long, env = "SLIDES_NO_IMAGES")]
    no_images: bool,

    /// Number of concurrent image lookups.
    #[arg(long, env = "SLIDES_IMAGE_CONCURRENCY", default_value_t = 4)]
    image_concurrency: usize,

    /// Openverse-compatible image search endpoint.
    #[arg(long, env = "SLIDES_IMAGE_SEARCH_URL")]
    image_search_url: Option<String>,

    /// Page size of the rendered deck.
    #[arg(long, env = "SLIDES_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SLIDES_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "SLIDES_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Extra generation attempts after a failure.
    #[arg(long, env = "SLIDES_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "SLIDES_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Per-slide image lookup timeout in seconds.
    #[arg(long, env = "SLIDES_IMAGE_TIMEOUT", default_value_t = 10)]
    image_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SLIDES_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "SLIDES_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Generate and illustrate the slides, print the outline, render nothing.
    #[arg(long, env = "SLIDES_DRY_RUN")]
    dry_run: bool,

    /// Print machine-readable JSON on stdout.
    #[arg(long, env = "SLIDES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SLIDES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLIDES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SLIDES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs stay quiet while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build request and config ─────────────────────────────────────────
    let request = build_request(&cli).await?;

    let progress = show_progress.then(|| CliProgressCallback::new(!cli.no_images));
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn GenerationProgressCallback>),
    )
    .await?;

    let result = run(&cli, &request, &config).await;
    if let Some(ref cb) = progress {
        cb.clear();
    }
    result
}

async fn run(cli: &Cli, request: &PresentationRequest, config: &PresentationConfig) -> Result<()> {
    // ── Dry run: outline only ────────────────────────────────────────────
    if cli.dry_run {
        let presentation = draft_presentation(request, config)
            .await
            .context("Slide generation failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outline_json(&presentation))
                    .context("Failed to serialise outline")?
            );
        } else {
            print!("{}", presentation.slide_text());
            if !cli.quiet {
                eprintln!(
                    "{} {} slides, {} with images (dry run, nothing rendered)",
                    cyan("◆"),
                    presentation.slides.len(),
                    presentation.images_resolved()
                );
            }
        }
        return Ok(());
    }

    // ── Generate and write ───────────────────────────────────────────────
    let output = generate_presentation(request, config)
        .await
        .context("Presentation generation failed")?;

    let target = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let path = write_presentation(&output, &target)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    let stats = &output.stats;
    if cli.json {
        let summary = serde_json::json!({
            "path": path,
            "title": output.title,
            "pages": output.pages,
            "stats": stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} slides  {}/{} images  {}ms  →  {}",
            if stats.images_missing == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.slide_count,
            stats.images_resolved,
            stats.slide_count,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  ({} attempt(s))",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.generation_attempts,
        );
    }

    Ok(())
}

/// Map `--topic` / `--document` to a request.
async fn build_request(cli: &Cli) -> Result<PresentationRequest> {
    let mut request = match (&cli.topic, &cli.document) {
        (Some(topic), _) => PresentationRequest::topic(topic.clone()),
        (None, Some(path)) => PresentationRequest::document(load_document(path, cli).await?),
        (None, None) => anyhow::bail!("Either --topic or --document is required"),
    };
    if let Some(ref title) = cli.title {
        request = request.with_title(title.clone());
    }
    Ok(request)
}

async fn load_document(path: &Path, cli: &Cli) -> Result<UploadedDocument> {
    let mut document = UploadedDocument::from_path(path)
        .await
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    if let Some(ref mime) = cli.mime {
        document.mime_type = mime.clone();
    }
    Ok(document)
}

/// Map CLI args to `PresentationConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
) -> Result<PresentationConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PresentationConfig::builder()
        .slide_range(cli.min_slides as usize, cli.max_slides as usize)
        .fetch_images(!cli.no_images)
        .image_concurrency(cli.image_concurrency)
        .page_size(cli.page_size.into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .image_timeout_secs(cli.image_timeout);

    if let Some(ref url) = cli.image_search_url {
        builder = builder.image_search_url(url.clone());
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    // Fields that stay `None` unless given on the command line.
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.api_key = cli.api_key.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}

/// JSON view of a drafted deck: slide content plus each image outcome.
fn outline_json(presentation: &Presentation) -> serde_json::Value {
    let slides: Vec<serde_json::Value> = presentation
        .slides
        .iter()
        .map(|slide| {
            serde_json::json!({
                "record": slide.record,
                "image_bytes": slide.image.as_ref().map(|i| i.bytes.len()),
                "image_url": slide.image.as_ref().and_then(|i| i.source_url.clone()),
                "image_error": slide.image_error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    serde_json::json!({
        "title": presentation.title,
        "generated_on": presentation.generated_on,
        "slides": slides,
    })
}
