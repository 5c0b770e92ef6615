//! Configuration types for structure-aware PDF-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a run
//! can be logged, cloned into spawned tasks, and compared with another run.
//!
//! The structural knobs ([`ProcessingMode`], [`WindowPlanConfig`],
//! [`ContextOptions`], [`SelectionPolicy`]) come straight from
//! `pdfweave-core`; everything else is about rendering, the LLM call and the
//! assembled output.

use crate::error::PdfweaveError;
use crate::pipeline::backend::VisionBackend;
use crate::pipeline::registry::ProviderRegistry;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use pdfweave_core::{ContextOptions, SelectionPolicy, WindowPlanConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a PDF-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfweave::{ConversionConfig, ProcessingMode};
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .mode(ProcessingMode::Windowed)
///     .window_pages(10)
///     .window_slack(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.window.target_pages, 10);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps either dimension regardless of DPI, so an A0 poster cannot
    /// exhaust memory.
    pub max_rendered_pixels: u32,

    /// Units converted at once in [`ProcessingMode::Independent`]. Default: 10.
    ///
    /// The continuity modes are sequential by construction and ignore this.
    pub concurrency: usize,

    /// LLM model identifier used with `provider_name`.
    /// If None, the provider's default model is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is selected from the document profile.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn VisionBackend>>,

    /// Configured providers to select from. If None, built from the
    /// environment with [`ProviderRegistry::from_env`].
    pub registry: Option<ProviderRegistry>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page of a unit. Default: 4096.
    ///
    /// A window of N pages is allowed `N * max_tokens`, capped at
    /// `max_output_tokens`.
    pub max_tokens: usize,

    /// Upper bound on output tokens for a single call. Default: 16384.
    pub max_output_tokens: usize,

    /// Maximum retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses the built-in conversion prompt.
    pub system_prompt: Option<String>,

    /// How pages are grouped into units and whether continuity flows between
    /// them. Default: [`ProcessingMode::Sequential`].
    pub mode: ProcessingMode,

    /// Window sizing for [`ProcessingMode::Windowed`].
    pub window: WindowPlanConfig,

    /// What the per-unit context includes.
    pub context: ContextOptions,

    /// Run the structure-analysis call before conversion. Default: true.
    ///
    /// Without it the profile is minimal and the section forest empty.
    pub analyze_structure: bool,

    /// Pages shown to the analysis call, from the start of the selection. Default: 8.
    pub analysis_sample_pages: usize,

    /// Provider selection preferences.
    pub selection: SelectionPolicy,

    /// Treat the document as sensitive regardless of what analysis reports.
    pub sensitive_content: bool,

    /// Fidelity tier controlling prompt complexity. Default: [`FidelityTier::Tier2`].
    pub fidelity: FidelityTier,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Separator between units in assembled output. Default: None.
    pub page_separator: PageSeparator,

    /// Include YAML front-matter with document metadata. Default: false.
    pub include_metadata: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout in seconds, covering all retries of one unit. Default: 180.
    pub api_timeout_secs: u64,

    /// Receives unit-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            registry: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_output_tokens: 16_384,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            mode: ProcessingMode::default(),
            window: WindowPlanConfig::default(),
            context: ContextOptions::default(),
            analyze_structure: true,
            analysis_sample_pages: 8,
            selection: SelectionPolicy::default(),
            sensitive_content: false,
            fidelity: FidelityTier::default(),
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            include_metadata: false,
            download_timeout_secs: 120,
            api_timeout_secs: 180,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("registry", &self.registry)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("mode", &self.mode)
            .field("window", &self.window)
            .field("analyze_structure", &self.analyze_structure)
            .field("selection", &self.selection)
            .field("fidelity", &self.fidelity)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Output-token budget for one call covering `pages` pages.
    pub fn token_budget(&self, pages: usize) -> usize {
        output_token_budget(self.max_tokens, self.max_output_tokens, pages)
    }
}

/// `per_page * pages`, never below `per_page` and never above `cap`
/// (unless `per_page` itself exceeds it).
pub(crate) fn output_token_budget(per_page: usize, cap: usize, pages: usize) -> usize {
    per_page
        .saturating_mul(pages.max(1))
        .min(cap.max(per_page))
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.config.registry = Some(registry);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn window(mut self, window: WindowPlanConfig) -> Self {
        self.config.window = window;
        self
    }

    pub fn window_pages(mut self, pages: usize) -> Self {
        self.config.window.target_pages = pages.max(1);
        self
    }

    pub fn window_slack(mut self, pages: usize) -> Self {
        self.config.window.slack_pages = pages;
        self
    }

    pub fn boundary_depth(mut self, depth: usize) -> Self {
        self.config.window.boundary_depth = depth;
        self
    }

    pub fn context(mut self, options: ContextOptions) -> Self {
        self.config.context = options;
        self
    }

    pub fn toc_max_depth(mut self, depth: usize) -> Self {
        self.config.context.toc_max_depth = depth;
        self
    }

    pub fn analyze_structure(mut self, v: bool) -> Self {
        self.config.analyze_structure = v;
        self
    }

    pub fn analysis_sample_pages(mut self, n: usize) -> Self {
        self.config.analysis_sample_pages = n.max(1);
        self
    }

    pub fn selection(mut self, policy: SelectionPolicy) -> Self {
        self.config.selection = policy;
        self
    }

    pub fn prefer_native(mut self, v: bool) -> Self {
        self.config.selection.prefer_native = v;
        self
    }

    pub fn sensitive_content(mut self, v: bool) -> Self {
        self.config.sensitive_content = v;
        self
    }

    pub fn fidelity(mut self, tier: FidelityTier) -> Self {
        self.config.fidelity = tier;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, PdfweaveError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PdfweaveError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(PdfweaveError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.mode == ProcessingMode::Windowed && c.window.target_pages == 0 {
            return Err(PdfweaveError::InvalidConfig(
                "Window size must be ≥ 1 page".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(PdfweaveError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(PdfweaveError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the document is split into units and whether continuity flows
/// between them.
///
/// | Mode | Unit | Continuity | Concurrency |
/// |------|------|------------|-------------|
/// | `Independent` | one page | none | `concurrency` |
/// | `Sequential` | one page | yes | 1 |
/// | `Windowed` | a window of pages | yes | 1 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Pages converted in parallel, each call knowing only its own position.
    Independent,
    /// One page per call, in order, with continuity from the previous page.
    #[default]
    Sequential,
    /// Multi-page windows cut at section boundaries, in order, with continuity.
    Windowed,
}

impl ProcessingMode {
    /// Whether each unit's result feeds the next unit's context.
    pub fn carries_continuity(self) -> bool {
        !matches!(self, ProcessingMode::Independent)
    }
}

/// Quality tier controlling which Markdown features the VLM is asked to produce.
///
/// | Tier | Use case |
/// |------|----------|
/// | 1 | Plain-text extraction, embedding pipelines |
/// | 2 | Documentation, wikis, readable reports (default) |
/// | 3 | Scientific papers, technical books with math and complex tables |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FidelityTier {
    /// Basic: text, headings, lists only.
    Tier1,
    /// Structural: text, headings, lists, GFM tables, footnotes. (default)
    #[default]
    Tier2,
    /// High-fidelity: Tier2 + LaTeX math, HTML table fallback, image captions.
    Tier3,
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed
    /// page numbers within `[1, total_pages]`.
    pub fn to_pages(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if (1..=total_pages).contains(p) {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => ((*start).max(1)..=(*end).min(total_pages)).collect(),
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|p| (1..=total_pages).contains(p))
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Parse the CLI syntax: `"5"`, `"3-7"` or `"1,4,9"`.
    pub fn parse(s: &str) -> Result<Self, PdfweaveError> {
        let s = s.trim();
        let bad = || PdfweaveError::InvalidConfig(format!("Invalid page selection '{s}'"));
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>().map_err(|_| bad()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }
        if let Some((a, b)) = s.split_once('-') {
            let start = a.trim().parse().map_err(|_| bad())?;
            let end = b.trim().parse().map_err(|_| bad())?;
            return Ok(PageSelection::Range(start, end));
        }
        s.parse().map(PageSelection::Single).map_err(|_| bad())
    }
}

/// How to separate units in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; units joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with the unit's first page: "<!-- page N -->"
    Comment,
    /// Custom string inserted between units.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string placed before the unit starting at `page_num`.
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
