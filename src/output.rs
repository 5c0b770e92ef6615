//! Output types: what a conversion hands back to the caller.
//!
//! [`ConversionOutput`] is returned `Ok` whenever the document could be
//! opened, even if every unit degraded. Callers that want degradation to be
//! an error use [`ConversionOutput::into_result`].

use crate::error::{PdfweaveError, UnitError};
use pdfweave_core::{ConversionResult, DocumentProfile, SectionSummary};
use serde::{Deserialize, Serialize};

/// Metadata read from the PDF itself, without any LLM call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Outcome of one conversion unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    /// 0-based position in the plan.
    pub index: usize,
    /// First page of the unit's window (1-indexed, inclusive).
    pub start_page: usize,
    /// Last page of the unit's window (1-indexed, inclusive).
    pub end_page: usize,
    /// Pages actually sent; a subset of the window when a page selection applies.
    pub pages: Vec<usize>,
    pub result: ConversionResult,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Why the unit degraded, if it did.
    pub error: Option<UnitError>,
}

impl UnitResult {
    pub fn markdown(&self) -> &str {
        &self.result.markdown
    }

    pub fn is_degraded(&self) -> bool {
        self.result.degraded
    }
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages selected for conversion.
    pub selected_pages: usize,
    pub total_units: usize,
    pub processed_units: usize,
    pub failed_units: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub analysis_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// The assembled result of converting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The whole document as Markdown.
    pub markdown: String,
    /// Per-unit results, in document order.
    pub units: Vec<UnitResult>,
    pub metadata: DocumentMetadata,
    pub profile: DocumentProfile,
    /// Top-level sections with their page ranges.
    pub sections: Vec<SectionSummary>,
    /// Name of the backend that converted the units.
    pub backend: String,
    pub stats: ConversionStats,
    /// Document-level warnings (analysis fallback, structure anomalies).
    pub warnings: Vec<String>,
    /// True when at least one unit degraded.
    pub degraded: bool,
    /// True when structure analysis was attempted and failed, so the run
    /// planned without headings on a minimal profile.
    #[serde(default)]
    pub analysis_degraded: bool,
}

impl ConversionOutput {
    /// Warnings from the document and from every unit, in document order.
    pub fn all_warnings(&self) -> impl Iterator<Item = &str> {
        self.warnings
            .iter()
            .chain(self.units.iter().flat_map(|u| u.result.warnings.iter()))
            .map(String::as_str)
    }

    /// Treat any degraded unit as an error.
    ///
    /// Returns [`PdfweaveError::AllUnitsFailed`] when nothing converted and
    /// [`PdfweaveError::PartialFailure`] when only some units did.
    pub fn into_result(self) -> Result<Self, PdfweaveError> {
        let total = self.units.len();
        let failed = self.units.iter().filter(|u| u.is_degraded()).count();
        if failed == 0 {
            return Ok(self);
        }
        if failed == total {
            let first_error = self
                .units
                .iter()
                .find_map(|u| u.error.as_ref().map(ToString::to_string))
                .or_else(|| self.units.iter().find_map(|u| u.result.warnings.first().cloned()))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(PdfweaveError::AllUnitsFailed { total, first_error });
        }
        Err(PdfweaveError::PartialFailure {
            success: total - failed,
            failed,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize, degraded: bool) -> UnitResult {
        let result = if degraded {
            ConversionResult::degraded(index, "HTTP 500")
        } else {
            ConversionResult::from_raw(format!("page {}", index + 1))
        };
        UnitResult {
            index,
            start_page: index + 1,
            end_page: index + 1,
            pages: vec![index + 1],
            result,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            error: degraded.then(|| UnitError::LlmFailed {
                unit: index + 1,
                retries: 3,
                detail: "HTTP 500".into(),
            }),
        }
    }

    fn output(units: Vec<UnitResult>) -> ConversionOutput {
        ConversionOutput {
            markdown: String::new(),
            degraded: units.iter().any(|u| u.is_degraded()),
            units,
            metadata: DocumentMetadata::default(),
            profile: DocumentProfile::default(),
            sections: Vec::new(),
            backend: "mock".into(),
            stats: ConversionStats::default(),
            warnings: vec!["analysis skipped".into()],
            analysis_degraded: false,
        }
    }

    #[test]
    fn clean_output_passes_through() {
        let out = output(vec![unit(0, false), unit(1, false)]);
        assert!(out.into_result().is_ok());
    }

    #[test]
    fn partial_failure_is_reported() {
        let err = output(vec![unit(0, false), unit(1, true)])
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            PdfweaveError::PartialFailure {
                success: 1,
                failed: 1,
                total: 2
            }
        ));
    }

    #[test]
    fn all_failed_carries_first_error() {
        let err = output(vec![unit(0, true), unit(1, true)])
            .into_result()
            .unwrap_err();
        match err {
            PdfweaveError::AllUnitsFailed { total, first_error } => {
                assert_eq!(total, 2);
                assert!(first_error.contains("Unit 1"), "got: {first_error}");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn warnings_are_collected_in_order() {
        let out = output(vec![unit(0, true), unit(1, false)]);
        let warnings: Vec<_> = out.all_warnings().collect();
        assert_eq!(warnings[0], "analysis skipped");
        assert!(warnings[1].starts_with("[unit 1]"));
    }
}
