//! Streaming conversion API: emit units as they complete.
//!
//! ## Why stream?
//!
//! Large documents take minutes. A stream lets callers display partial
//! results immediately, wire up progress bars, or write units to disk
//! incrementally instead of waiting for the whole document.
//!
//! In the continuity modes units are produced one at a time, in order: the
//! stream itself owns the [`ContinuityState`] and folds each result before it
//! starts the next unit, so nothing runs ahead of the consumer. In
//! [`crate::config::ProcessingMode::Independent`] up to `concurrency` units
//! run at once and arrive in completion order (sort by `index` if order
//! matters).

use crate::config::ConversionConfig;
use crate::convert::{prepare, run_unit, DocumentRun};
use crate::error::PdfweaveError;
use crate::output::{DocumentMetadata, UnitResult};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::render::{self, PageImages, PdfRenderer};
use crate::progress::ProgressCallback;
use futures::future;
use futures::stream::{self, StreamExt};
use pdfweave_core::{fold_continuity, ContinuityState};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of unit results.
pub type UnitStream = Pin<Box<dyn Stream<Item = UnitResult> + Send>>;

/// Convert a PDF to Markdown, streaming units as they are ready.
///
/// Analysis and planning happen before this returns, so fatal errors
/// (file not found, not a PDF, no provider) surface here rather than
/// inside the stream. Unit failures arrive as degraded [`UnitResult`]s.
pub async fn convert_stream(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<UnitStream, PdfweaveError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming conversion: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    stream_resolved(resolved, config).await
}

/// Convert PDF bytes in memory to Markdown, streaming units as they complete.
///
/// The bytes live in a temp file owned by the returned stream and removed
/// when it is dropped.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfweave::{convert_stream_from_bytes, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let config = ConversionConfig::default();
/// let mut stream = convert_stream_from_bytes(&bytes, &config).await?;
/// while let Some(unit) = stream.next().await {
///     match unit.error {
///         None => println!("Pages {}-{}: {} chars", unit.start_page, unit.end_page, unit.markdown().len()),
///         Some(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<UnitStream, PdfweaveError> {
    let resolved = ResolvedInput::from_bytes(bytes)?;
    stream_resolved(resolved, config).await
}

async fn stream_resolved(
    resolved: ResolvedInput,
    config: &ConversionConfig,
) -> Result<UnitStream, PdfweaveError> {
    let metadata = render::extract_metadata(resolved.path(), config.password.as_deref()).await?;
    let source: Arc<dyn PageImages> = Arc::new(PdfRenderer::new(resolved.path(), config));
    build_stream(source, metadata, config, Some(Arc::new(resolved))).await
}

/// Stream the units of a document whose pages come from `source`.
pub async fn stream_document(
    source: Arc<dyn PageImages>,
    metadata: DocumentMetadata,
    config: &ConversionConfig,
) -> Result<UnitStream, PdfweaveError> {
    build_stream(source, metadata, config, None).await
}

/// Owned state of an in-order stream.
struct Ordered {
    run: Arc<DocumentRun>,
    source: Arc<dyn PageImages>,
    config: ConversionConfig,
    state: ContinuityState,
    next: usize,
    _input: Option<Arc<ResolvedInput>>,
}

async fn build_stream(
    source: Arc<dyn PageImages>,
    metadata: DocumentMetadata,
    config: &ConversionConfig,
    input: Option<Arc<ResolvedInput>>,
) -> Result<UnitStream, PdfweaveError> {
    let run = Arc::new(prepare(source.as_ref(), metadata, config).await?);
    let total = run.units.len();
    let callback = config.progress_callback.clone();

    if config.mode.carries_continuity() {
        let ordered = Ordered {
            run,
            source,
            config: config.clone(),
            state: ContinuityState::new(),
            next: 0,
            _input: input,
        };
        let units = stream::unfold(ordered, |mut s| async move {
            let run = Arc::clone(&s.run);
            let plan = run.units.get(s.next)?;
            let unit = run_unit(&run, s.source.as_ref(), plan, &s.state, &s.config).await;
            s.state = fold_continuity(std::mem::take(&mut s.state), &unit.result);
            s.next += 1;
            Some((unit, s))
        });
        Ok(Box::pin(report_completion(units, total, callback)))
    } else {
        let concurrency = config.concurrency.max(1);
        let config = config.clone();
        let units = stream::iter(0..total)
            .map(move |i| {
                let run = Arc::clone(&run);
                let source = Arc::clone(&source);
                let config = config.clone();
                let input = input.clone();
                async move {
                    let _input = input;
                    let fresh = ContinuityState::new();
                    run_unit(&run, source.as_ref(), &run.units[i], &fresh, &config).await
                }
            })
            .buffer_unordered(concurrency);
        Ok(Box::pin(report_completion(units, total, callback)))
    }
}

/// Fire `on_conversion_complete` as the last unit passes through.
fn report_completion<S>(
    units: S,
    total: usize,
    callback: Option<ProgressCallback>,
) -> impl Stream<Item = UnitResult> + Send
where
    S: Stream<Item = UnitResult> + Send,
{
    units.scan((0usize, 0usize), move |counts, unit| {
        counts.0 += 1;
        if !unit.is_degraded() {
            counts.1 += 1;
        }
        if counts.0 == total {
            if let Some(ref cb) = callback {
                cb.on_conversion_complete(total, counts.1);
            }
        }
        future::ready(Some(unit))
    })
}
