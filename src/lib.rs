//! # edgequake-pdfweave
//!
//! Convert PDF documents to Markdown with Vision Language Models, keeping the
//! document coherent across many independent model calls.
//!
//! ## Why this crate?
//!
//! A VLM reads a rendered page the way a person does, which handles
//! multi-column layouts, tables and formulae far better than text extraction.
//! But every call is stateless: page 12 does not know that page 11 ended
//! mid-sentence, that "Figure 3" is still to come, or that it sits inside
//! chapter 2. This crate threads that knowledge through the run:
//!
//! * a **section forest** rebuilt from the headings an analysis call reports,
//! * **windows** of pages cut on section boundaries where possible,
//! * a **context** per call (table of contents, breadcrumb, expected headings,
//!   previous tail, running summary, pending references),
//! * a **continuity fold** that carries each result into the next call,
//! * a **provider selector** that picks the backend suited to the document.
//!
//! The pure parts live in the [`pdfweave_core`] crate and are re-exported here.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, URL or bytes
//!  ├─ 2. Metadata  page count, title, author via pdfium
//!  ├─ 3. Analyse   first pages → profile + headings (one VLM call)
//!  ├─ 4. Select    provider for the profile
//!  ├─ 5. Plan      section forest → units (pages or windows)
//!  ├─ 6. Convert   per unit: render → context → VLM → parse → fold
//!  └─ 7. Output    assembled Markdown + per-unit results + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfweave::{convert, ConversionConfig, ProcessingMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider selected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY / …
//!     let config = ConversionConfig::builder()
//!         .mode(ProcessingMode::Windowed)
//!         .window_pages(10)
//!         .build()?;
//!     let output = convert("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} sections, {} units, degraded: {}",
//!         output.sections.len(), output.units.len(), output.degraded);
//!     Ok(())
//! }
//! ```
//!
//! ## Processing Modes
//!
//! | Mode | Unit | Continuity | Concurrency |
//! |------|------|------------|-------------|
//! | `Sequential` (default) | page | yes | one at a time |
//! | `Windowed` | window of pages | yes | one at a time |
//! | `Independent` | page | no | `concurrency` at once |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfweave` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfweave = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, FidelityTier, PageSelection, PageSeparator,
    ProcessingMode,
};
pub use convert::{
    convert, convert_document, convert_from_bytes, convert_sync, convert_to_file, inspect,
    plan_units, UnitPlan,
};
pub use error::{PdfweaveError, UnitError};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, UnitResult};
pub use pipeline::backend::{
    AnalysisRequest, BackendError, LlmBackend, RawResponse, UnitRequest, VisionBackend,
};
pub use pipeline::registry::ProviderRegistry;
pub use pipeline::render::{PageImages, PdfRenderer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, convert_stream_from_bytes, stream_document, UnitStream};

pub use pdfweave_core::{
    ContextOptions, ContinuityState, ConversionResult, DocumentProfile, Heading, ProviderId,
    Section, SectionSummary, SelectionPolicy, UnitContext, WindowPlanConfig,
};
