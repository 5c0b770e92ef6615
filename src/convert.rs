//! Eager (full-document) conversion entry points and the unit driver.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for all units, then return.
//! It collects every [`UnitResult`] into memory and assembles the final
//! Markdown document before returning. Use [`crate::stream::convert_stream`]
//! instead when you want units progressively.
//!
//! ## Driver
//!
//! ```text
//! metadata ─▶ analysis ─▶ section forest ─▶ unit plan ─▶ for each unit:
//!                                                          context ─▶ backend ─▶ parse ─▶ fold
//! ```
//!
//! In the continuity modes each unit's result is folded into the
//! [`ContinuityState`] before the next unit's context is assembled, so units
//! run strictly in order. [`ProcessingMode::Independent`] gives every unit an
//! empty state and runs up to `concurrency` of them at once.

use crate::config::{ConversionConfig, ProcessingMode};
use crate::error::{PdfweaveError, UnitError};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, UnitResult};
use crate::pipeline::analyze::{analyze_document, Analysis};
use crate::pipeline::backend::{RawResponse, UnitRequest, VisionBackend};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::registry::resolve_backend;
use crate::pipeline::render::{self, PageImages, PdfRenderer};
use crate::pipeline::response;
use futures::stream::{self, StreamExt};
use pdfweave_core::{
    assemble_context, build_section_forest, describe_window, find_anomalies, fold_continuity,
    plan_pages, plan_windows, ContinuityState, ConversionResult, DocumentProfile, ProviderId,
    Section, SectionAnomaly, SectionSummary, UnitContext,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One planned conversion unit: the selected pages of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlan {
    /// 0-based position in the plan.
    pub index: usize,
    pub start_page: usize,
    pub end_page: usize,
    /// Selected pages in `start_page..=end_page`, ascending.
    pub pages: Vec<usize>,
}

/// Everything fixed before the first unit runs.
pub(crate) struct DocumentRun {
    pub forest: Vec<Section>,
    pub profile: DocumentProfile,
    pub units: Vec<UnitPlan>,
    pub backend: Arc<dyn VisionBackend>,
    pub metadata: DocumentMetadata,
    pub selected_pages: usize,
    pub warnings: Vec<String>,
    pub analysis_ms: u64,
    pub analysis_degraded: bool,
}

/// Convert a PDF file or URL to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` whenever the document could be opened and a
/// provider resolved, even if some or all units degraded (check
/// `output.degraded`, or call [`ConversionOutput::into_result`]).
///
/// # Errors
/// Returns `Err(PdfweaveError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - Wrong or missing password
/// - No provider configured
/// - A page selection that matches no page
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_resolved(&resolved, config).await
}

/// Convert PDF bytes in memory to Markdown.
///
/// The bytes are written to a managed temp file that is removed on return.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfweave::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let config = ConversionConfig::default();
/// let output = convert_from_bytes(&bytes, &config).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    let resolved = ResolvedInput::from_bytes(bytes)?;
    convert_resolved(&resolved, config).await
}

async fn convert_resolved(
    resolved: &ResolvedInput,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    let metadata = render::extract_metadata(resolved.path(), config.password.as_deref()).await?;
    let renderer = PdfRenderer::new(resolved.path(), config);
    convert_document(&renderer, metadata, config).await
}

/// Convert a document whose pages come from `source`.
///
/// [`convert`] calls this with a pdfium renderer; hosts that already hold
/// page images (or tests) can supply their own [`PageImages`].
pub async fn convert_document(
    source: &dyn PageImages,
    metadata: DocumentMetadata,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    let total_start = Instant::now();
    let run = prepare(source, metadata, config).await?;

    let llm_start = Instant::now();
    let units = if config.mode.carries_continuity() {
        process_in_order(&run, source, config).await
    } else {
        process_concurrent(&run, source, config).await
    };
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        let ok = units.iter().filter(|u| !u.is_degraded()).count();
        cb.on_conversion_complete(units.len(), ok);
    }

    let output = assemble_output(run, units, config, total_start, llm_duration_ms);
    info!(
        "Conversion complete: {}/{} units, {}ms total",
        output.stats.processed_units, output.stats.total_units, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Convert a PDF and write output directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    let output = convert(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), PdfweaveError> {
    let failed = |source: std::io::Error| PdfweaveError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(failed)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PdfweaveError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfweaveError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Extract PDF metadata without converting content.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentMetadata, PdfweaveError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::extract_metadata(resolved.path(), password).await
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Analysis, provider selection and unit planning.
pub(crate) async fn prepare(
    source: &dyn PageImages,
    metadata: DocumentMetadata,
    config: &ConversionConfig,
) -> Result<DocumentRun, PdfweaveError> {
    let total_pages = metadata.page_count;
    let selected = config.pages.to_pages(total_pages);
    if selected.is_empty() {
        return Err(PdfweaveError::PageOutOfRange {
            page: first_requested_page(config),
            total: total_pages,
        });
    }
    debug!("Selected {} of {} pages", selected.len(), total_pages);

    let analysis = if config.analyze_structure {
        let probe = Analysis::minimal(total_pages, config);
        let analysis_backend = resolve_backend(config, &probe.profile)?;
        analyze_document(analysis_backend.as_ref(), source, &metadata, &selected, config).await
    } else {
        Analysis::minimal(total_pages, config)
    };

    let backend = resolve_backend(config, &analysis.profile)?;
    let forest = build_section_forest(&analysis.headings, total_pages);

    let mut warnings = analysis.warnings;
    for anomaly in find_anomalies(&forest) {
        let w = anomaly_warning(&anomaly);
        warn!("{}", w);
        warnings.push(w);
    }

    let units = plan_units(&forest, total_pages, &selected, config, backend.provider_id());
    info!(
        "Planned {} units over {} pages with {} ({} top-level sections)",
        units.len(),
        selected.len(),
        backend.name(),
        forest.len()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(forest.len(), backend.name());
        cb.on_conversion_start(units.len());
    }

    Ok(DocumentRun {
        forest,
        profile: analysis.profile,
        units,
        backend,
        metadata,
        selected_pages: selected.len(),
        warnings,
        analysis_ms: analysis.duration_ms,
        analysis_degraded: analysis.degraded,
    })
}

fn first_requested_page(config: &ConversionConfig) -> usize {
    use crate::config::PageSelection;
    match &config.pages {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

fn anomaly_warning(anomaly: &SectionAnomaly) -> String {
    match anomaly {
        SectionAnomaly::InvertedRange {
            title,
            start_page,
            end_page,
        } => format!("section '{title}' ends (page {end_page}) before it starts (page {start_page})"),
        SectionAnomaly::ChildOutsideParent {
            parent,
            child,
            child_start,
            child_end,
        } => format!(
            "section '{child}' (pages {child_start}-{child_end}) lies outside its parent '{parent}'"
        ),
    }
}

/// Split the selected pages into units.
///
/// Windows come from the section forest ([`ProcessingMode::Windowed`]) or are
/// one page each. Windows with no selected page are dropped and the rest
/// re-indexed, so unit indices are always `0..n`. When the backend's provider
/// is known, windows are kept within its per-request image limit.
pub fn plan_units(
    forest: &[Section],
    total_pages: usize,
    selected: &[usize],
    config: &ConversionConfig,
    provider: Option<ProviderId>,
) -> Vec<UnitPlan> {
    let windows = match config.mode {
        ProcessingMode::Windowed => {
            let mut window = config.window;
            if let Some(id) = provider {
                let limit = id.capability().max_images_per_request.max(1);
                if window.target_pages + window.slack_pages > limit {
                    debug!("Clamping windows to {} images for {}", limit, id);
                }
                window.target_pages = window.target_pages.max(1).min(limit);
                window.slack_pages = window.slack_pages.min(limit - window.target_pages);
            }
            plan_windows(forest, total_pages, &window)
        }
        ProcessingMode::Independent | ProcessingMode::Sequential => plan_pages(forest, total_pages),
    };

    windows
        .iter()
        .filter_map(|w| {
            let pages: Vec<usize> = selected.iter().copied().filter(|&p| w.contains(p)).collect();
            let (&start_page, &end_page) = (pages.first()?, pages.last()?);
            Some((start_page, end_page, pages))
        })
        .enumerate()
        .map(|(index, (start_page, end_page, pages))| UnitPlan {
            index,
            start_page,
            end_page,
            pages,
        })
        .collect()
}

/// The context the model sees for `plan`, given the state so far.
pub(crate) fn unit_context(
    run: &DocumentRun,
    plan: &UnitPlan,
    state: &ContinuityState,
    config: &ConversionConfig,
) -> UnitContext {
    let window = describe_window(&run.forest, plan.index, plan.start_page, plan.end_page);
    assemble_context(
        &window,
        &run.profile,
        state,
        &run.forest,
        run.units.len(),
        &config.context,
    )
}

/// Convert one unit. Never fails: any error yields a degraded result.
pub(crate) async fn run_unit(
    run: &DocumentRun,
    source: &dyn PageImages,
    plan: &UnitPlan,
    state: &ContinuityState,
    config: &ConversionConfig,
) -> UnitResult {
    let start = Instant::now();
    let unit = plan.index + 1;
    let total = run.units.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_unit_start(unit, total, plan.start_page, plan.end_page);
    }

    let context = unit_context(run, plan, state, config);
    let (result, input_tokens, output_tokens, error) =
        match call_backend(run.backend.as_ref(), source, plan, &context, config).await {
            Ok(raw) => {
                let result = response::parse_unit_response(&raw.text);
                debug!(
                    "Unit {}/{}: {} chars, {} images, {} open references",
                    unit,
                    total,
                    result.markdown.len(),
                    result.images.len(),
                    result.unresolved_references.len()
                );
                (result, raw.input_tokens, raw.output_tokens, None)
            }
            Err(e) => {
                warn!("{}", e);
                (ConversionResult::degraded(plan.index, e.reason()), 0, 0, Some(e))
            }
        };

    if let Some(ref cb) = config.progress_callback {
        match &error {
            None => cb.on_unit_complete(unit, total, result.markdown.len()),
            Some(e) => cb.on_unit_error(unit, total, &e.to_string()),
        }
    }

    UnitResult {
        index: plan.index,
        start_page: plan.start_page,
        end_page: plan.end_page,
        pages: plan.pages.clone(),
        result,
        input_tokens,
        output_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

async fn call_backend(
    backend: &dyn VisionBackend,
    source: &dyn PageImages,
    plan: &UnitPlan,
    context: &UnitContext,
    config: &ConversionConfig,
) -> Result<RawResponse, UnitError> {
    let unit = plan.index + 1;
    let images = source
        .page_images(&plan.pages)
        .await
        .map_err(|detail| UnitError::RenderFailed { unit, detail })?;

    let request = UnitRequest {
        context,
        pages: &plan.pages,
        images,
    };
    let secs = config.api_timeout_secs;
    match tokio::time::timeout(Duration::from_secs(secs), backend.convert(request)).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(e)) => Err(UnitError::LlmFailed {
            unit,
            retries: e.retries,
            detail: e.detail,
        }),
        Err(_) => Err(UnitError::Timeout { unit, secs }),
    }
}

/// Units in index order, each seeing the state folded from all before it.
async fn process_in_order(
    run: &DocumentRun,
    source: &dyn PageImages,
    config: &ConversionConfig,
) -> Vec<UnitResult> {
    let mut state = ContinuityState::new();
    let mut results = Vec::with_capacity(run.units.len());
    for plan in &run.units {
        let unit = run_unit(run, source, plan, &state, config).await;
        state = fold_continuity(state, &unit.result);
        results.push(unit);
    }
    results
}

/// Units with no continuity, `concurrency` at a time, returned in index order.
async fn process_concurrent(
    run: &DocumentRun,
    source: &dyn PageImages,
    config: &ConversionConfig,
) -> Vec<UnitResult> {
    let fresh = ContinuityState::new();
    let mut results: Vec<UnitResult> = stream::iter(run.units.iter())
        .map(|plan| run_unit(run, source, plan, &fresh, config))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|u| u.index);
    results
}

// ── Assembly ─────────────────────────────────────────────────────────────

fn assemble_output(
    run: DocumentRun,
    units: Vec<UnitResult>,
    config: &ConversionConfig,
    total_start: Instant,
    llm_duration_ms: u64,
) -> ConversionOutput {
    let markdown = assemble_document(&units, config, &run.metadata);
    let failed = units.iter().filter(|u| u.is_degraded()).count();

    let stats = ConversionStats {
        total_pages: run.metadata.page_count,
        selected_pages: run.selected_pages,
        total_units: units.len(),
        processed_units: units.len() - failed,
        failed_units: failed,
        total_input_tokens: units.iter().map(|u| u.input_tokens as u64).sum(),
        total_output_tokens: units.iter().map(|u| u.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        analysis_duration_ms: run.analysis_ms,
        llm_duration_ms,
    };

    ConversionOutput {
        markdown,
        sections: run.forest.iter().map(SectionSummary::from).collect(),
        backend: run.backend.name().to_string(),
        profile: run.profile,
        metadata: run.metadata,
        degraded: failed > 0,
        analysis_degraded: run.analysis_degraded,
        warnings: run.warnings,
        units,
        stats,
    }
}

/// Join unit markdown in order, with separators and optional front matter.
/// Units with no markdown (degraded or blank pages) leave no trace.
pub(crate) fn assemble_document(
    units: &[UnitResult],
    config: &ConversionConfig,
    metadata: &DocumentMetadata,
) -> String {
    let mut out = String::new();

    if config.include_metadata {
        out.push_str(&format_yaml_front_matter(metadata));
    }

    let mut first = true;
    for unit in units.iter().filter(|u| !u.markdown().trim().is_empty()) {
        if !first {
            out.push_str(&config.page_separator.render(unit.start_page));
        }
        out.push_str(unit.markdown().trim_end());
        first = false;
    }

    if !first {
        out.push('\n');
    }
    out
}

/// Format document metadata as YAML front matter.
fn format_yaml_front_matter(meta: &DocumentMetadata) -> String {
    let mut yaml = String::from("---\n");
    let fields = [
        ("title", &meta.title),
        ("author", &meta.author),
        ("subject", &meta.subject),
        ("creator", &meta.creator),
        ("producer", &meta.producer),
    ];
    for (key, value) in fields {
        if let Some(v) = value {
            yaml.push_str(&format!("{key}: \"{}\"\n", yaml_escape(v)));
        }
    }
    yaml.push_str(&format!("pages: {}\n", meta.page_count));
    if !meta.pdf_version.is_empty() {
        yaml.push_str(&format!("pdf_version: \"{}\"\n", yaml_escape(&meta.pdf_version)));
    }
    yaml.push_str("---\n\n");
    yaml
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
