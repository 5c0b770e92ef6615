//! Structure analysis: one model call over the first pages of the document
//! that yields the [`DocumentProfile`] and the flat heading list the section
//! forest is built from.
//!
//! Analysis is advisory. Any failure (rendering, the call itself, a timeout,
//! a reply with no JSON object) falls back to [`DocumentProfile::minimal`] with no
//! headings, and the run continues page by page.

use crate::config::ConversionConfig;
use crate::output::DocumentMetadata;
use crate::pipeline::backend::{AnalysisRequest, VisionBackend};
use crate::pipeline::render::PageImages;
use crate::pipeline::response::parse_analysis_response;
use pdfweave_core::{DocumentProfile, Heading};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What the analysis step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub profile: DocumentProfile,
    pub headings: Vec<Heading>,
    pub warnings: Vec<String>,
    /// True when the analysis call was attempted and failed.
    pub degraded: bool,
    pub duration_ms: u64,
}

impl Analysis {
    /// The no-analysis result for a document of `page_count` pages.
    pub fn minimal(page_count: usize, config: &ConversionConfig) -> Self {
        Self {
            profile: with_hints(DocumentProfile::minimal(page_count), config),
            headings: Vec::new(),
            warnings: Vec::new(),
            degraded: false,
            duration_ms: 0,
        }
    }

    fn failed(page_count: usize, config: &ConversionConfig, reason: String, start: Instant) -> Self {
        warn!("Structure analysis failed, continuing without it: {}", reason);
        Self {
            warnings: vec![format!("structure analysis failed: {reason}")],
            degraded: true,
            duration_ms: start.elapsed().as_millis() as u64,
            ..Self::minimal(page_count, config)
        }
    }
}

/// Pages shown to the analysis call: the first `analysis_sample_pages` of the
/// selection.
pub fn sample_pages(selected: &[usize], config: &ConversionConfig) -> Vec<usize> {
    selected
        .iter()
        .copied()
        .take(config.analysis_sample_pages.max(1))
        .collect()
}

/// Run structure analysis, or return the minimal analysis when it is switched
/// off or there is nothing to look at.
pub async fn analyze_document(
    backend: &dyn VisionBackend,
    source: &dyn PageImages,
    metadata: &DocumentMetadata,
    selected_pages: &[usize],
    config: &ConversionConfig,
) -> Analysis {
    let page_count = metadata.page_count;
    if !config.analyze_structure || selected_pages.is_empty() {
        return Analysis::minimal(page_count, config);
    }

    let start = Instant::now();
    let pages = sample_pages(selected_pages, config);
    info!("Analysing structure from {} sample pages", pages.len());

    let images = match source.page_images(&pages).await {
        Ok(images) => images,
        Err(e) => return Analysis::failed(page_count, config, e, start),
    };

    let request = AnalysisRequest {
        pages: &pages,
        page_count,
        metadata,
        images,
    };
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let raw = match tokio::time::timeout(timeout, backend.analyze(request)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return Analysis::failed(page_count, config, e.detail, start),
        Err(_) => {
            let reason = format!("timed out after {}s", config.api_timeout_secs);
            return Analysis::failed(page_count, config, reason, start);
        }
    };

    match parse_analysis_response(&raw.text, page_count) {
        Ok(reply) => {
            info!(
                "Analysis: {} headings, content type {:?}, language {}",
                reply.headings.len(),
                reply.profile.content_type,
                reply.profile.language
            );
            Analysis {
                profile: with_hints(reply.profile, config),
                headings: reply.headings,
                warnings: reply.warnings,
                degraded: false,
                duration_ms: start.elapsed().as_millis() as u64,
            }
        }
        Err(e) => Analysis::failed(page_count, config, e, start),
    }
}

fn with_hints(mut profile: DocumentProfile, config: &ConversionConfig) -> DocumentProfile {
    if config.sensitive_content {
        profile.sensitive_content = true;
    }
    profile
}
