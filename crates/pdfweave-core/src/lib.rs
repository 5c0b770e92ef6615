//! # pdfweave-core
//!
//! The synchronous heart of `edgequake-pdfweave`: everything needed to keep a
//! document coherent when it is converted by many independent LLM calls.
//!
//! ```text
//! headings ──▶ section forest ──▶ windows ──▶ context ──▶ (LLM call) ──▶ fold
//!  (flat)       build_section_      plan_       assemble_                   fold_
//!               forest              windows     context                     continuity
//!                                                  ▲                           │
//!                                                  └──── ContinuityState ◀─────┘
//! ```
//!
//! Provider selection ([`select_provider`]) runs once per document, before
//! the first call, over the closed set of [`ProviderId`] descriptors.
//!
//! Every function here is pure and deterministic. The only mutable value is
//! [`ContinuityState`], which is moved through [`fold_continuity`] one unit at
//! a time, so no locks are needed anywhere.
//!
//! ## Example
//!
//! ```rust
//! use pdfweave_core::{build_section_forest, plan_windows, Heading, WindowPlanConfig};
//!
//! let headings = vec![
//!     Heading::new(1, "Intro", 1),
//!     Heading::new(2, "Background", 2),
//!     Heading::new(1, "Method", 5),
//! ];
//! let forest = build_section_forest(&headings, 10);
//! assert_eq!(forest.len(), 2);
//!
//! let windows = plan_windows(&forest, 10, &WindowPlanConfig::new(4));
//! assert_eq!(windows.len(), 3);
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod context;
pub mod continuity;
pub mod model;
pub mod provider;
pub mod section;
pub mod window;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use context::{assemble_context, ContextOptions, SectionSummary, TocEntry, UnitContext};
pub use continuity::{fold_continuity, ContinuityState};
pub use model::{
    ContentType, ConversionResult, DocumentProfile, Heading, ImageInfo, ImageKind,
    PendingReference, TextDensity,
};
pub use provider::{
    select_provider, select_provider_with, ProviderCapability, ProviderId, SelectionPolicy,
    UnknownProvider, DEFAULT_PRIORITY,
};
pub use section::{build_section_forest, find_anomalies, flatten_toc, Section, SectionAnomaly};
pub use window::{describe_window, plan_pages, plan_windows, WindowPlanConfig, WindowSpec};
