//! Pipeline tests with a scripted backend and synthetic page images.
//!
//! No PDF, pdfium or network is involved: the driver is exercised through
//! its `VisionBackend` and `PageImages` seams.

use async_trait::async_trait;
use edgequake_llm::ImageData;
use edgequake_pdfweave::{
    convert_document, stream_document, AnalysisRequest, BackendError, ConversionConfig,
    ConversionProgressCallback, DocumentMetadata, PageImages, PageSelection, PdfweaveError,
    ProcessingMode, ProviderId, RawResponse, UnitContext, UnitError, UnitRequest, VisionBackend,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

// ── Test doubles ─────────────────────────────────────────────────────────────

enum Reply {
    Text(String),
    Delayed(u64, String),
    Fail(&'static str),
    Hang,
}

type Script = Box<dyn Fn(&UnitContext, &[usize]) -> Reply + Send + Sync>;

struct ScriptedBackend {
    analysis: Result<String, String>,
    script: Script,
    id: Option<ProviderId>,
    seen: Mutex<Vec<(UnitContext, Vec<usize>)>>,
    analysis_pages: Mutex<Vec<usize>>,
}

impl ScriptedBackend {
    fn new(script: impl Fn(&UnitContext, &[usize]) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            analysis: Err("analysis not scripted".to_string()),
            script: Box::new(script),
            id: None,
            seen: Mutex::new(Vec::new()),
            analysis_pages: Mutex::new(Vec::new()),
        }
    }

    fn with_analysis(mut self, reply: serde_json::Value) -> Self {
        self.analysis = Ok(reply.to_string());
        self
    }

    fn contexts(&self) -> Vec<UnitContext> {
        let mut seen: Vec<_> = self.seen.lock().unwrap().iter().map(|(c, _)| c.clone()).collect();
        seen.sort_by_key(|c| c.position.unit_index);
        seen
    }
}

#[async_trait]
impl VisionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn provider_id(&self) -> Option<ProviderId> {
        self.id
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<RawResponse, BackendError> {
        *self.analysis_pages.lock().unwrap() = request.pages.to_vec();
        self.analysis
            .clone()
            .map(RawResponse::from_text)
            .map_err(|detail| BackendError { retries: 0, detail })
    }

    async fn convert(&self, request: UnitRequest<'_>) -> Result<RawResponse, BackendError> {
        assert_eq!(request.images.len(), request.pages.len());
        self.seen
            .lock()
            .unwrap()
            .push((request.context.clone(), request.pages.to_vec()));
        let reply = (self.script)(request.context, request.pages);
        match reply {
            Reply::Text(text) => Ok(RawResponse {
                text,
                input_tokens: 100,
                output_tokens: 50,
            }),
            Reply::Delayed(ms, text) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(RawResponse::from_text(text))
            }
            Reply::Fail(detail) => Err(BackendError {
                retries: 3,
                detail: detail.to_string(),
            }),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

struct FakePages {
    fail_on: Vec<usize>,
}

#[async_trait]
impl PageImages for FakePages {
    async fn page_images(&self, pages: &[usize]) -> Result<Vec<ImageData>, String> {
        if let Some(p) = pages.iter().find(|p| self.fail_on.contains(p)) {
            return Err(format!("page {p} unreadable"));
        }
        Ok(pages
            .iter()
            .map(|p| ImageData::new(format!("cGFnZS0{p}"), "image/png"))
            .collect())
    }
}

fn pages_ok() -> FakePages {
    FakePages { fail_on: vec![] }
}

fn metadata(pages: usize) -> DocumentMetadata {
    DocumentMetadata {
        title: Some("Test Document".to_string()),
        page_count: pages,
        ..Default::default()
    }
}

fn reply(markdown: &str, summary: &str, unresolved: &[&str], resolved: &[&str]) -> Reply {
    let unresolved: Vec<_> = unresolved
        .iter()
        .map(|id| json!({"id": id, "kind": "figure"}))
        .collect();
    Reply::Text(
        json!({
            "markdown": markdown,
            "summary": summary,
            "unresolved_references": unresolved,
            "resolved_references": resolved,
        })
        .to_string(),
    )
}

fn body(pages: &[usize]) -> String {
    format!("Body of page {}.", pages[0])
}

fn config(backend: &Arc<ScriptedBackend>) -> edgequake_pdfweave::ConversionConfigBuilder {
    ConversionConfig::builder()
        .backend(Arc::clone(backend) as Arc<dyn VisionBackend>)
        .analyze_structure(false)
}

// ── Continuity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_mode_threads_continuity() {
    let backend = Arc::new(ScriptedBackend::new(|ctx, pages| {
        let summary = format!("summary {}", ctx.position.unit_index + 1);
        match ctx.position.unit_index {
            0 => reply(&body(pages), &summary, &["fig1"], &[]),
            2 => reply(&body(pages), &summary, &[], &["fig1"]),
            _ => reply(&body(pages), &summary, &[], &[]),
        }
    }));
    let cfg = config(&backend).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(3), &cfg).await.unwrap();

    assert!(!out.degraded);
    assert_eq!(
        out.markdown,
        "Body of page 1.\n\nBody of page 2.\n\nBody of page 3.\n"
    );
    assert_eq!(out.stats.total_units, 3);
    assert_eq!(out.stats.total_input_tokens, 300);

    let ctx = backend.contexts();
    assert_eq!(ctx[0].continuity.previous_tail, "");
    assert!(ctx[0].continuity.pending_references.is_empty());
    assert_eq!(ctx[1].continuity.previous_tail, "Body of page 1.");
    assert_eq!(ctx[1].continuity.previous_summary, "summary 1");
    assert_eq!(ctx[1].continuity.pending_references[0].id, "fig1");
    assert_eq!(ctx[2].continuity.previous_summary, "summary 2");
    assert_eq!(ctx[2].continuity.pending_references.len(), 1);
    assert!(out.units[2].result.resolved_references.contains(&"fig1".to_string()));
}

#[tokio::test]
async fn failed_unit_degrades_without_breaking_the_chain() {
    let backend = Arc::new(ScriptedBackend::new(|ctx, pages| match ctx.position.unit_index {
        0 => reply(&body(pages), "s1", &["tab2"], &[]),
        1 => Reply::Fail("HTTP 500"),
        _ => reply(&body(pages), "s3", &[], &[]),
    }));
    let cfg = config(&backend).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(3), &cfg).await.unwrap();

    assert!(out.degraded);
    assert_eq!(out.stats.failed_units, 1);
    assert_eq!(out.markdown, "Body of page 1.\n\nBody of page 3.\n");

    let failed = &out.units[1];
    assert!(failed.is_degraded());
    assert!(failed.markdown().is_empty());
    assert!(matches!(
        failed.error,
        Some(UnitError::LlmFailed { unit: 2, retries: 3, .. })
    ));
    assert!(failed.result.warnings[0].contains("HTTP 500"));

    // The degraded fold clears the tail but keeps pending references.
    let ctx = backend.contexts();
    assert_eq!(ctx[2].continuity.previous_tail, "");
    assert_eq!(ctx[2].continuity.previous_summary, "");
    assert_eq!(ctx[2].continuity.pending_references[0].id, "tab2");

    assert!(matches!(
        out.into_result(),
        Err(PdfweaveError::PartialFailure {
            success: 2,
            failed: 1,
            total: 3
        })
    ));
}

#[tokio::test]
async fn all_units_failing_is_still_an_output() {
    let backend = Arc::new(ScriptedBackend::new(|_, _| Reply::Fail("quota exceeded")));
    let cfg = config(&backend).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(2), &cfg).await.unwrap();

    assert!(out.degraded);
    assert!(out.markdown.is_empty());
    match out.into_result() {
        Err(PdfweaveError::AllUnitsFailed { total, first_error }) => {
            assert_eq!(total, 2);
            assert!(first_error.contains("quota exceeded"));
        }
        other => panic!("expected AllUnitsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_yields_degraded_unit() {
    let backend = Arc::new(ScriptedBackend::new(|ctx, pages| {
        if ctx.position.unit_index == 0 {
            Reply::Hang
        } else {
            reply(&body(pages), "", &[], &[])
        }
    }));
    let cfg = config(&backend).api_timeout_secs(1).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(2), &cfg).await.unwrap();

    assert_eq!(out.units[0].error, Some(UnitError::Timeout { unit: 1, secs: 1 }));
    assert!(out.units[0].is_degraded());
    assert!(!out.units[1].is_degraded());
    assert_eq!(out.markdown, "Body of page 2.\n");
}

#[tokio::test]
async fn render_failure_skips_the_backend() {
    let backend = Arc::new(ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])));
    let cfg = config(&backend).build().unwrap();
    let source = FakePages { fail_on: vec![2] };

    let out = assert_ok!(convert_document(&source, metadata(3), &cfg).await);

    assert!(matches!(
        out.units[1].error,
        Some(UnitError::RenderFailed { unit: 2, .. })
    ));
    assert_eq!(backend.contexts().len(), 2);
}

#[tokio::test]
async fn unparseable_reply_keeps_raw_text_with_warning() {
    let backend = Arc::new(ScriptedBackend::new(|_, _| {
        Reply::Text("Just some prose, no JSON here.".to_string())
    }));
    let cfg = config(&backend).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(1), &cfg).await.unwrap();

    assert!(!out.degraded);
    assert_eq!(out.markdown, "Just some prose, no JSON here.\n");
    assert_eq!(out.all_warnings().count(), 1);
}

// ── Modes ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn independent_mode_returns_units_in_order_with_empty_context() {
    // Later units answer first.
    let backend = Arc::new(ScriptedBackend::new(|ctx, pages| {
        let delay = 200 - 40 * ctx.position.unit_index as u64;
        match reply(&body(pages), "s", &["x"], &[]) {
            Reply::Text(t) => Reply::Delayed(delay, t),
            other => other,
        }
    }));
    let cfg = config(&backend)
        .mode(ProcessingMode::Independent)
        .concurrency(5)
        .build()
        .unwrap();

    let out = convert_document(&pages_ok(), metadata(5), &cfg).await.unwrap();

    let order: Vec<_> = out.units.iter().map(|u| u.index).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    assert!(out.markdown.starts_with("Body of page 1."));
    for ctx in backend.contexts() {
        assert!(ctx.continuity.previous_tail.is_empty());
        assert!(ctx.continuity.pending_references.is_empty());
    }
}

#[tokio::test]
async fn windowed_mode_follows_analysed_sections() {
    let backend = Arc::new(
        ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])).with_analysis(json!({
            "profile": {"language": "en", "content_type": "technical"},
            "headings": [
                {"level": 1, "text": "Intro", "page": 1},
                {"level": 1, "text": "Method", "page": 5},
                {"level": 2, "text": "Setup", "page": 6},
                {"level": 1, "text": "Results", "page": 9}
            ]
        })),
    );
    let cfg = config(&backend)
        .analyze_structure(true)
        .analysis_sample_pages(3)
        .mode(ProcessingMode::Windowed)
        .window_pages(4)
        .build()
        .unwrap();

    let out = convert_document(&pages_ok(), metadata(12), &cfg).await.unwrap();

    assert_eq!(*backend.analysis_pages.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(out.sections.len(), 3);
    assert_eq!(out.sections[1].title, "Method");

    let seen = backend.seen.lock().unwrap().clone();
    let ranges: Vec<_> = seen.iter().map(|(_, pages)| pages.clone()).collect();
    assert_eq!(
        ranges,
        vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10, 11, 12]]
    );

    let second = &seen[1].0;
    let expected: Vec<_> = second
        .structure
        .expected_headings
        .iter()
        .map(|s| s.title.as_str())
        .collect();
    assert_eq!(expected, vec!["Method", "Setup"]);
    assert_eq!(second.document.table_of_contents.len(), 4);
    assert!(!second.structure.continues_after);
    assert!(!out.analysis_degraded);
}

#[tokio::test]
async fn noisy_analysis_headings_are_repaired_not_discarded() {
    let backend = Arc::new(
        ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])).with_analysis(json!({
            "profile": {"language": "en"},
            "headings": [
                {"level": 1, "text": "Intro", "page": 1},
                {"level": 2, "text": "Scope", "page": null},
                {"level": 1, "text": "Appendix", "page": 40}
            ]
        })),
    );
    let cfg = config(&backend)
        .analyze_structure(true)
        .mode(ProcessingMode::Windowed)
        .window_pages(4)
        .build()
        .unwrap();

    let out = convert_document(&pages_ok(), metadata(8), &cfg).await.unwrap();

    assert!(!out.analysis_degraded);
    let sections: Vec<_> = out
        .sections
        .iter()
        .map(|s| (s.title.as_str(), s.start_page, s.end_page))
        .collect();
    assert_eq!(sections, vec![("Intro", 1, 7), ("Appendix", 8, 8)]);
    assert!(out.warnings.iter().any(|w| w.contains("1 malformed analysis headings dropped")));
    assert!(out.warnings.iter().any(|w| w.contains("moved to the last page")));

    let seen = backend.seen.lock().unwrap().clone();
    let (last, pages) = seen.last().unwrap();
    assert_eq!(pages.last(), Some(&8));
    assert!(!last.structure.continues_after);
}

#[tokio::test]
async fn analysis_failure_falls_back_to_minimal_profile() {
    let backend = Arc::new(ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])));
    let cfg = config(&backend).analyze_structure(true).build().unwrap();

    let out = convert_document(&pages_ok(), metadata(2), &cfg).await.unwrap();

    assert!(!out.degraded);
    assert!(out.sections.is_empty());
    assert_eq!(out.profile.page_count, 2);
    assert!(out.warnings[0].contains("structure analysis failed"));
    assert!(out.analysis_degraded);
    assert_eq!(out.units.len(), 2);
}

#[tokio::test]
async fn page_selection_limits_units() {
    let backend = Arc::new(ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])));
    let cfg = config(&backend)
        .pages(PageSelection::Set(vec![4, 2]))
        .build()
        .unwrap();

    let out = convert_document(&pages_ok(), metadata(5), &cfg).await.unwrap();

    let starts: Vec<_> = out.units.iter().map(|u| (u.index, u.start_page)).collect();
    assert_eq!(starts, vec![(0, 2), (1, 4)]);
    assert_eq!(out.stats.selected_pages, 2);
    assert_eq!(backend.contexts()[1].position.unit_count, 2);

    let cfg = config(&backend)
        .pages(PageSelection::Single(9))
        .build()
        .unwrap();
    let err = convert_document(&pages_ok(), metadata(5), &cfg).await.err().unwrap();
    assert!(matches!(err, PdfweaveError::PageOutOfRange { page: 9, total: 5 }));
}

// ── Streaming and progress ───────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    finished: Mutex<Option<(usize, usize)>>,
}

impl ConversionProgressCallback for Counting {
    fn on_unit_start(&self, _unit: usize, _total: usize, _start: usize, _end: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_unit_complete(&self, _unit: usize, _total: usize, _len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_unit_error(&self, _unit: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, total: usize, ok: usize) {
        *self.finished.lock().unwrap() = Some((total, ok));
    }
}

#[tokio::test]
async fn stream_yields_units_in_order_and_reports_progress() {
    let backend = Arc::new(ScriptedBackend::new(|ctx, pages| {
        if ctx.position.unit_index == 2 {
            Reply::Fail("bad gateway")
        } else {
            reply(&body(pages), "running", &[], &[])
        }
    }));
    let progress = Arc::new(Counting::default());
    let cfg = config(&backend)
        .progress_callback(Arc::clone(&progress) as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    let stream = stream_document(Arc::new(pages_ok()), metadata(4), &cfg)
        .await
        .unwrap();
    let units: Vec<_> = stream.collect().await;

    let order: Vec<_> = units.iter().map(|u| u.index).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert!(units[2].is_degraded());
    assert_eq!(backend.contexts()[1].continuity.previous_summary, "running");

    assert_eq!(progress.started.load(Ordering::SeqCst), 4);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 3);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 1);
    assert_eq!(*progress.finished.lock().unwrap(), Some((4, 3)));
}

#[tokio::test]
async fn independent_stream_yields_every_unit() {
    let backend = Arc::new(ScriptedBackend::new(|_, pages| reply(&body(pages), "", &[], &[])));
    let cfg = config(&backend)
        .mode(ProcessingMode::Independent)
        .build()
        .unwrap();

    let stream = stream_document(Arc::new(pages_ok()), metadata(6), &cfg)
        .await
        .unwrap();
    let mut indices: Vec<_> = stream.map(|u| u.index).collect().await;
    indices.sort_unstable();
    assert_eq!(indices, (0..6).collect::<Vec<_>>());
}
