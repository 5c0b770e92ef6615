//! Progress-callback trait for per-unit conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline analyses the document and converts each unit.
//!
//! A unit is one page in the page-based modes and a window of pages in
//! [`crate::config::ProcessingMode::Windowed`]; every event carries the unit's
//! page range so a host can report either.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfweave::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, unit: usize, total_units: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Unit {}/{} done ({} bytes)", unit, total_units, markdown_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each unit.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `unit` arguments are 1-indexed.
///
/// # Thread safety
///
/// In [`crate::config::ProcessingMode::Independent`] the unit events may be
/// called concurrently from different tasks. Implementations must protect
/// shared mutable state (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the structure analysis has finished (or been skipped).
    ///
    /// # Arguments
    /// * `sections` — top-level sections found
    /// * `backend`  — backend chosen for conversion
    fn on_analysis_complete(&self, sections: usize, backend: &str) {
        let _ = (sections, backend);
    }

    /// Called once before the first unit is sent.
    fn on_conversion_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before the LLM request is sent for a unit.
    ///
    /// # Arguments
    /// * `unit`        — 1-indexed unit number
    /// * `total_units` — units in the plan
    /// * `start_page`, `end_page` — the unit's page range (inclusive)
    fn on_unit_start(&self, unit: usize, total_units: usize, start_page: usize, end_page: usize) {
        let _ = (unit, total_units, start_page, end_page);
    }

    /// Called when a unit converted successfully.
    fn on_unit_complete(&self, unit: usize, total_units: usize, markdown_len: usize) {
        let _ = (unit, total_units, markdown_len);
    }

    /// Called when a unit degraded (render failure, LLM failure, timeout).
    fn on_unit_error(&self, unit: usize, total_units: usize, error: &str) {
        let _ = (unit, total_units, error);
    }

    /// Called once after all units have been attempted.
    fn on_conversion_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
