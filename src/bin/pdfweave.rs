//! CLI binary for edgequake-pdfweave.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfweave::{
    convert, convert_to_file, inspect, plan_units, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, FidelityTier, Heading, PageSelection, PageSeparator,
    ProcessingMode, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use pdfweave_core::{build_section_forest, describe_window, find_anomalies, flatten_toc};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
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

/// Terminal progress callback: a live bar plus one log line per unit. Works
/// when units complete out of order (independent mode).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-unit wall-clock start times.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Page range per unit, for the log lines.
    ranges: Mutex<HashMap<usize, (usize, usize)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us how many units there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Analysing document structure…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            ranges: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn finish_unit(&self, unit: usize) -> (String, f64) {
        let elapsed_ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&unit))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        let pages = self
            .ranges
            .lock()
            .ok()
            .and_then(|mut r| r.remove(&unit))
            .map(|(s, e)| if s == e { format!("p.{s}") } else { format!("pp.{s}-{e}") })
            .unwrap_or_default();
        (pages, elapsed_ms as f64 / 1000.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_analysis_complete(&self, sections: usize, backend: &str) {
        self.bar.println(format!(
            "{} {} top-level sections  {}",
            cyan("◆"),
            bold(&sections.to_string()),
            dim(&format!("via {backend}"))
        ));
    }

    fn on_conversion_start(&self, total_units: usize) {
        self.activate_bar(total_units);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting conversion of {total_units} units…"))
        ));
    }

    fn on_unit_start(&self, unit: usize, _total: usize, start_page: usize, end_page: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(unit, Instant::now());
        }
        if let Ok(mut r) = self.ranges.lock() {
            r.insert(unit, (start_page, end_page));
        }
        self.bar.set_message(format!("unit {unit}"));
    }

    fn on_unit_complete(&self, unit: usize, total: usize, markdown_len: usize) {
        let (pages, secs) = self.finish_unit(unit);
        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3} {:<10} {:<8}  {}",
            green("✓"),
            unit,
            total,
            pages,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit: usize, total: usize, error: &str) {
        let (pages, secs) = self.finish_unit(unit);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3} {:<10} {}  {}",
            red("✗"),
            unit,
            total,
            pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_units: usize, success_count: usize) {
        let failed = total_units.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} units converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} units converted  ({} degraded)",
                if failed == total_units {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_units,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Page by page with continuity (stdout)
  pdfweave document.pdf

  # Windows of ~10 pages cut on chapter boundaries
  pdfweave --mode windowed --window-pages 10 --window-slack 2 book.pdf -o book.md

  # Fast, no continuity, 16 calls in flight
  pdfweave --mode independent -c 16 slides.pdf -o slides.md

  # Specific pages, high fidelity, fixed provider
  pdfweave --pages 1-5 --fidelity tier3 --provider anthropic paper.pdf

  # Inspect PDF metadata (no API key needed)
  pdfweave --inspect-only document.pdf

  # Preview the section forest and windows for a heading list (no LLM call)
  pdfweave --plan --total-pages 120 --mode windowed headings.json

  # JSON output with per-unit results
  pdfweave --json document.pdf > output.json

PROVIDER SELECTION:
  With --provider unset, every provider whose key is set is a candidate:
    1. a single configured provider is used as-is;
    2. sensitive documents (--sensitive, or books/magazines) go to a
       provider without content filtering;
    3. a native-document provider whose page limit covers the document;
    4. if the document exceeds every native limit, the largest context;
    5. otherwise the first of openai, anthropic, gemini, mistral, ollama.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  MISTRAL_API_KEY         Mistral API key
  OLLAMA_HOST             Ollama endpoint
  EDGEQUAKE_LLM_PROVIDER  Override provider (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (else the system library)
"#;

/// Convert PDF files and URLs to Markdown with section-aware Vision LLM calls.
#[derive(Parser, Debug)]
#[command(
    name = "pdfweave",
    version,
    about = "Convert PDF files and URLs to Markdown using Vision LLMs, section by section",
    long_about = "Convert PDF documents (local files or URLs) to Markdown using Vision Language \
Models. A first call reads the document's structure; every following call sees the table of \
contents, where it sits in it, and how the previous call ended.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL (a heading JSON file with --plan).
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "PDFWEAVE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, mistral, ollama, or any
    /// name edgequake-llm knows. Selected from the document if unset.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// How pages are grouped into calls.
    #[arg(long, env = "PDFWEAVE_MODE", value_enum, default_value = "sequential")]
    mode: ModeArg,

    /// Target pages per window (windowed mode).
    #[arg(long, env = "PDFWEAVE_WINDOW_PAGES", default_value_t = 20)]
    window_pages: usize,

    /// Pages a window cut may move to land on a section boundary.
    #[arg(long, env = "PDFWEAVE_WINDOW_SLACK", default_value_t = 0)]
    window_slack: usize,

    /// Section depth that counts as a window boundary (1 = top level only).
    #[arg(long, env = "PDFWEAVE_BOUNDARY_DEPTH", default_value_t = 1)]
    boundary_depth: usize,

    /// Levels of the table of contents shown to each call (0 = none).
    #[arg(long, env = "PDFWEAVE_TOC_DEPTH", default_value_t = 3)]
    toc_depth: usize,

    /// Skip the structure-analysis call.
    #[arg(long, env = "PDFWEAVE_NO_ANALYSIS")]
    no_analysis: bool,

    /// Pages shown to the structure-analysis call.
    #[arg(long, env = "PDFWEAVE_ANALYSIS_PAGES", default_value_t = 8)]
    analysis_pages: usize,

    /// Do not prefer providers that read whole documents natively.
    #[arg(long, env = "PDFWEAVE_NO_NATIVE")]
    no_native: bool,

    /// Treat the document as sensitive (avoid content-filtering providers).
    #[arg(long, env = "PDFWEAVE_SENSITIVE")]
    sensitive: bool,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFWEAVE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent VLM calls (independent mode).
    #[arg(short, long, env = "PDFWEAVE_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFWEAVE_PAGES", default_value = "all")]
    pages: String,

    /// Output quality: tier1, tier2, tier3.
    #[arg(long, env = "PDFWEAVE_FIDELITY", value_enum, default_value = "tier2")]
    fidelity: FidelityArg,

    /// Unit separator: none, hr, comment, or custom string.
    #[arg(long, env = "PDFWEAVE_SEPARATOR", default_value = "none")]
    separator: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFWEAVE_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDFWEAVE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page of a unit.
    #[arg(long, env = "PDFWEAVE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFWEAVE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per unit on LLM failure.
    #[arg(long, env = "PDFWEAVE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Prepend YAML front-matter with document metadata.
    #[arg(long, env = "PDFWEAVE_METADATA")]
    metadata: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "PDFWEAVE_JSON")]
    json: bool,

    /// Exit non-zero when any unit degraded.
    #[arg(long, env = "PDFWEAVE_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFWEAVE_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Treat INPUT as a JSON heading list and print the section forest and
    /// unit plan, without opening a PDF or calling a model.
    #[arg(long)]
    plan: bool,

    /// Page count for --plan (default: the last heading's page).
    #[arg(long)]
    total_pages: Option<usize>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFWEAVE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFWEAVE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFWEAVE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-unit LLM call timeout in seconds, retries included.
    #[arg(long, env = "PDFWEAVE_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Independent,
    Sequential,
    Windowed,
}

impl From<ModeArg> for ProcessingMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Independent => ProcessingMode::Independent,
            ModeArg::Sequential => ProcessingMode::Sequential,
            ModeArg::Windowed => ProcessingMode::Windowed,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FidelityArg {
    Tier1,
    Tier2,
    Tier3,
}

impl From<FidelityArg> for FidelityTier {
    fn from(v: FidelityArg) -> Self {
        match v {
            FidelityArg::Tier1 => FidelityTier::Tier1,
            FidelityArg::Tier2 => FidelityTier::Tier2,
            FidelityArg::Tier3 => FidelityTier::Tier3,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are noise while the progress bar is up.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.plan;
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

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan {
        return print_plan(&cli).await;
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = if let Some(ref output_path) = cli.output {
        let output = convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} units  {}ms  →  {}",
                if output.degraded { cyan("⚠") } else { green("✔") },
                output.stats.processed_units,
                output.stats.total_units,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
        output
    } else {
        let output = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
        output
    };

    if !cli.quiet && !cli.json {
        print_summary(&output, show_progress);
    }

    if cli.strict {
        output.into_result().context("Conversion degraded")?;
    }
    Ok(())
}

fn print_summary(output: &ConversionOutput, show_progress: bool) {
    if !show_progress {
        eprintln!(
            "Converted {}/{} units ({} pages) in {}ms with {}",
            output.stats.processed_units,
            output.stats.total_units,
            output.stats.selected_pages,
            output.stats.total_duration_ms,
            output.backend,
        );
    }
    if output.analysis_degraded {
        eprintln!(
            "  {} structure analysis unavailable; converted without sections",
            cyan("⚠")
        );
    }
    for warning in output.all_warnings() {
        eprintln!("  {} {}", cyan("⚠"), dim(warning));
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&output.stats.total_input_tokens.to_string()),
        dim(&output.stats.total_output_tokens.to_string()),
    );
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = PageSelection::parse(&cli.pages).context("Invalid --pages")?;

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .mode(cli.mode.into())
        .window_pages(cli.window_pages)
        .window_slack(cli.window_slack)
        .boundary_depth(cli.boundary_depth)
        .toc_max_depth(cli.toc_depth)
        .analyze_structure(!cli.no_analysis)
        .analysis_sample_pages(cli.analysis_pages)
        .prefer_native(!cli.no_native)
        .sensitive_content(cli.sensitive)
        .pages(pages)
        .fidelity(cli.fidelity.into())
        .page_separator(parse_separator(&cli.separator))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .include_metadata(cli.metadata)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `--plan`: forest and units for a heading file, no PDF and no model.
async fn print_plan(cli: &Cli) -> Result<()> {
    let raw = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read heading file {}", cli.input))?;
    let headings: Vec<Heading> =
        serde_json::from_str(&raw).context("Heading file must be a JSON array of {level, text, page}")?;

    let total_pages = cli
        .total_pages
        .or_else(|| headings.iter().map(|h| h.page).max())
        .unwrap_or(0);
    let config = build_config(cli, None).await?;
    let selected = config.pages.to_pages(total_pages);

    let forest = build_section_forest(&headings, total_pages);
    let units = plan_units(&forest, total_pages, &selected, &config, None);

    if cli.json {
        let json = serde_json::json!({ "sections": forest, "units": units });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}", bold(&format!("Sections ({total_pages} pages)")));
    for (depth, section) in flatten_toc(&forest, usize::MAX) {
        println!(
            "  {}{} {}",
            "  ".repeat(depth),
            section.title,
            dim(&format!("pp.{}-{}", section.start_page, section.end_page))
        );
    }
    for anomaly in find_anomalies(&forest) {
        println!("  {} {:?}", cyan("⚠"), anomaly);
    }

    println!();
    println!("{}", bold(&format!("Units ({:?} mode)", config.mode)));
    for unit in &units {
        let window = describe_window(&forest, unit.index, unit.start_page, unit.end_page);
        let mut notes = Vec::new();
        if let Some(s) = window.continued_section {
            notes.push(format!("continues '{}'", s.title));
        }
        if window.continues_after {
            notes.push("runs on".to_string());
        }
        println!(
            "  {:>3}  pp.{}-{}  {} pages  {}",
            unit.index + 1,
            unit.start_page,
            unit.end_page,
            unit.pages.len(),
            dim(&notes.join(", "))
        );
    }
    Ok(())
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
