//! CLI binary for receipt-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, sets up logging and reports results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt_extract::config::{API_KEY_ENV, DEFAULT_API_BASE, DEFAULT_MODEL};
use receipt_extract::{
    list_models, run, ExtractionConfig, ExtractionObserver, PageError, PageFormat, PageOutcome,
    RegionError, RunStats, SharedObserver, TracingObserver,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

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

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: a live progress bar plus one line per page, on top of
/// the regular tracing records (which still reach `--log-file`).
struct CliProgress {
    bar: ProgressBar,
    failed: AtomicUsize,
    logs: TracingObserver,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Self {
            bar,
            failed: AtomicUsize::new(0),
            logs: TracingObserver,
        }
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionObserver for CliProgress {
    fn on_run_start(&self, total_pages: usize) {
        self.logs.on_run_start(total_pages);
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Looking for receipts on {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page: &str) {
        self.logs.on_page_start(page);
        self.bar.set_message(page.to_string());
    }

    fn on_boxes_parsed(&self, page: &str, count: usize) {
        self.logs.on_boxes_parsed(page, count);
    }

    fn on_region_skipped(&self, page: &str, index: usize, reason: &RegionError) {
        self.logs.on_region_skipped(page, index, reason);
    }

    fn on_receipt_saved(&self, page: &str, index: usize, path: &Path) {
        self.logs.on_receipt_saved(page, index, path);
    }

    fn on_page_complete(&self, outcome: &PageOutcome) {
        self.logs.on_page_complete(outcome);
        let elapsed = dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0));

        match outcome.error {
            None => self.bar.println(format!(
                "  {} {:<32}  {}  {}",
                green("✓"),
                outcome.page,
                dim(&format!(
                    "{} of {} boxes saved",
                    outcome.receipts_saved, outcome.boxes_found
                )),
                elapsed,
            )),
            Some(ref e) => {
                // Truncate very long error messages to keep output tidy.
                let msg = e.to_string();
                let msg = if msg.chars().count() > 80 {
                    format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
                } else {
                    msg
                };
                self.bar.println(format!(
                    "  {} {:<32}  {}  {}",
                    red("✗"),
                    outcome.page,
                    red(&msg),
                    elapsed
                ));
            }
        }
        self.bar.inc(1);
    }

    fn on_page_error(&self, error: &PageError) {
        self.logs.on_page_error(error);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_run_complete(&self, stats: &RunStats) {
        self.logs.on_run_complete(stats);
        self.finish();

        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} receipts saved from {} pages",
                green("✔"),
                bold(&stats.receipts_saved.to_string()),
                stats.pages_processed
            );
        } else {
            eprintln!(
                "{} {} receipts saved from {}/{} pages  ({} failed)",
                if failed == stats.pages_total {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&stats.receipts_saved.to_string()),
                stats.pages_processed,
                stats.pages_total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rasterise every PDF in ./input and extract receipts
  receipts

  # Reuse page images from a previous run
  receipts --skip-rasterize --pages-dir output/pages

  # Different folders and model
  receipts --input-dir scans --receipts-dir out/receipts --model qwen-2.5-vl

  # List the models the endpoint offers
  receipts --list-models

  # Log everything to a file as well
  receipts --log-level debug --log-file receipt_extraction.log

  # Machine-readable run summary
  receipts --json > stats.json

OUTPUT FILES:
  {pages-dir}/{pdf name}_page_{N}.png          one image per PDF page
  {receipts-dir}/receipt_{page file}_{i}.png   one image per receipt

ENVIRONMENT VARIABLES:
  LLM_VENICE_KEY     API key for the OpenAI-compatible endpoint (required)
  RUST_LOG           Overrides --log-level (tracing EnvFilter syntax)
  PDFIUM_LIB_PATH    Path to libpdfium if not next to the binary or on the
                     system library path

EXIT CODES:
  0    success, including "nothing to do"
  1    configuration or unexpected error
  130  interrupted (Ctrl-C)
"#;

/// Extract receipts from scanned PDF pages using a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "receipts",
    version,
    about = "Extract receipts from scanned PDF pages using a vision model",
    long_about = "Rasterise every PDF in the input folder, ask a vision-language model \
where the receipts are on each page, and save every receipt as its own PNG. Works with \
Venice.ai (default) or any OpenAI-compatible endpoint, or with an edgequake-llm provider.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Vision model ID.
    #[arg(long, env = "RECEIPTS_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// instead of the OpenAI-compatible endpoint.
    #[arg(long, env = "RECEIPTS_PROVIDER")]
    provider: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "RECEIPTS_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Folder containing the PDF files.
    #[arg(long, env = "RECEIPTS_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Folder for rasterised page images.
    #[arg(long, env = "RECEIPTS_PAGES_DIR", default_value = "output/pages")]
    pages_dir: PathBuf,

    /// Folder for extracted receipt images.
    #[arg(long, env = "RECEIPTS_RECEIPTS_DIR", default_value = "output/receipts")]
    receipts_dir: PathBuf,

    /// Skip PDF rasterisation and use the existing page images.
    #[arg(long)]
    skip_rasterize: bool,

    /// List available models and exit.
    #[arg(long)]
    list_models: bool,

    /// Log level.
    #[arg(long, env = "RECEIPTS_LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,

    /// Also write logs to this file.
    #[arg(long, env = "RECEIPTS_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "RECEIPTS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Contrast factor applied to rendered pages (1.0 = unchanged).
    #[arg(long, env = "RECEIPTS_CONTRAST", default_value_t = 2.0)]
    contrast: f32,

    /// Image format for rasterised pages.
    #[arg(long, env = "RECEIPTS_PAGE_FORMAT", value_enum, default_value = "png")]
    page_format: PageFormatArg,

    /// Number of pages processed concurrently.
    #[arg(short, long, env = "RECEIPTS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per page on model failure.
    #[arg(long, env = "RECEIPTS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call model timeout in seconds (no timeout when unset).
    #[arg(long, env = "RECEIPTS_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RECEIPTS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the run summary (or model list) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECEIPTS_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            // tracing has no level above error
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageFormatArg {
    Png,
    Jpeg,
}

impl From<PageFormatArg> for PageFormat {
    fn from(v: PageFormatArg) -> Self {
        match v {
            PageFormatArg::Png => PageFormat::Png,
            PageFormatArg::Jpeg => PageFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tokio::select! {
        result = real_main(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                eprintln!("{} {:#}", red("error:"), e);
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Process interrupted by user");
            eprintln!("\n{}", cyan("Process interrupted by user"));
            // A running pdfium render would otherwise hold the runtime open on drop.
            std::process::exit(130)
        }
    }
}

async fn real_main(cli: Cli) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level terminal logs unless a level was
    // asked for explicitly; the log file always gets the requested level.
    let show_progress = !cli.no_progress && !cli.json && !cli.list_models;
    let level = cli.log_level.map(LogLevel::directive).unwrap_or("info");
    let terminal_level = match cli.log_level {
        Some(l) => l.directive(),
        None if show_progress => "error",
        None => "info",
    };
    init_logging(terminal_level, level, cli.log_file.as_deref())?;

    let config = build_config(&cli).await?;

    // ── List-models mode ─────────────────────────────────────────────────
    if cli.list_models {
        let models = list_models(&config)
            .await
            .context("Failed to list models")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&models).context("Failed to serialise model list")?
            );
        } else {
            for id in models {
                println!("{id}");
            }
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let (observer, progress) = build_observer(show_progress);
    let result = run(&config, observer.as_ref()).await;
    // Ensures the spinner is gone on the early-exit paths too.
    if let Some(progress) = progress {
        progress.finish();
    }
    let stats = result.context("Receipt extraction failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise run summary")?
        );
    } else if !show_progress {
        eprintln!(
            "Extracted {} receipts from {}/{} pages in {}ms",
            stats.receipts_saved, stats.pages_processed, stats.pages_total, stats.total_duration_ms
        );
        if stats.pages_failed > 0 {
            eprintln!("  {} pages failed", stats.pages_failed);
        }
    }

    Ok(())
}

/// Observer for the run: the progress bar when it is shown, plain tracing
/// otherwise. The concrete progress handle is returned so it can be cleared.
fn build_observer(show_progress: bool) -> (SharedObserver, Option<Arc<CliProgress>>) {
    if show_progress {
        let progress = Arc::new(CliProgress::new());
        (Arc::clone(&progress) as SharedObserver, Some(progress))
    } else {
        (Arc::new(TracingObserver), None)
    }
}

/// stderr logging, plus an optional plain-text log file.
fn init_logging(terminal_level: &str, file_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = |level: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter(terminal_level)),
        )
        .with(file_layer)
        .init();
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(cli.model.clone())
        .api_base(cli.api_base.clone())
        .input_dir(cli.input_dir.clone())
        .pages_dir(cli.pages_dir.clone())
        .receipts_dir(cli.receipts_dir.clone())
        .skip_rasterize(cli.skip_rasterize)
        .dpi(cli.dpi)
        .contrast_factor(cli.contrast)
        .page_format(cli.page_format.into())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
