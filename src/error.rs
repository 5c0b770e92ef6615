//! Error types for the edgequake-pdfweave library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfweaveError`] — **Fatal**: the conversion cannot start at all (bad
//!   input file, wrong password, no provider configured). Returned as `Err`
//!   from the top-level `convert*` functions.
//!
//! * [`UnitError`] — **Non-fatal**: one conversion unit (a page or a window)
//!   failed. The unit still produces a degraded
//!   [`ConversionResult`](pdfweave_core::ConversionResult) so the continuity
//!   chain keeps moving, and the error is stored on
//!   [`crate::output::UnitResult`] for inspection.
//!
//! Nothing that happens inside a unit is allowed to abort the document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfweave library.
#[derive(Debug, Error)]
pub enum PdfweaveError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Provider errors ───────────────────────────────────────────────────
    /// A named provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Provider selection found nothing to choose from.
    #[error(
        "No LLM provider is configured.\n\
Set one of OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, MISTRAL_API_KEY or OLLAMA_HOST,\n\
or pass --provider explicitly."
    )]
    NoProviderConfigured,

    /// Every unit degraded; the output carries no converted content.
    ///
    /// Returned by [`crate::output::ConversionOutput::into_result`].
    #[error("All {total} units failed.\nFirst error: {first_error}")]
    AllUnitsFailed { total: usize, first_error: String },

    /// Some units succeeded but at least one degraded.
    ///
    /// Returned by [`crate::output::ConversionOutput::into_result`] when
    /// the caller wants to treat any unit failure as an error.
    #[error("{failed}/{total} units failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, or point PDFIUM_LIB_PATH at an existing\n\
copy of the shared library (libpdfium.so / libpdfium.dylib / pdfium.dll).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single conversion unit.
///
/// `unit` is 1-indexed, matching what users see in progress output.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The unit's pages could not be rasterised or encoded.
    #[error("Unit {unit}: rendering pages failed: {detail}")]
    RenderFailed { unit: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Unit {unit}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        unit: usize,
        retries: u32,
        detail: String,
    },

    /// LLM call exceeded the caller's timeout.
    #[error("Unit {unit}: LLM call timed out after {secs}s")]
    Timeout { unit: usize, secs: u64 },
}

impl UnitError {
    pub fn unit(&self) -> usize {
        match self {
            UnitError::RenderFailed { unit, .. }
            | UnitError::LlmFailed { unit, .. }
            | UnitError::Timeout { unit, .. } => *unit,
        }
    }

    /// The failure without the `Unit N:` prefix.
    pub fn reason(&self) -> String {
        match self {
            UnitError::RenderFailed { detail, .. } => format!("rendering pages failed: {detail}"),
            UnitError::LlmFailed {
                retries, detail, ..
            } => format!("LLM call failed after {retries} retries: {detail}"),
            UnitError::Timeout { secs, .. } => format!("LLM call timed out after {secs}s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = PdfweaveError::PartialFailure {
            success: 9,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn no_provider_lists_env_vars() {
        let msg = PdfweaveError::NoProviderConfigured.to_string();
        assert!(msg.contains("OPENAI_API_KEY"));
        assert!(msg.contains("--provider"));
    }

    #[test]
    fn unit_timeout_display() {
        let e = UnitError::Timeout { unit: 3, secs: 60 };
        assert!(e.to_string().contains("60s"));
        assert!(e.to_string().contains("Unit 3"));
    }

    #[test]
    fn unit_llm_failure_display() {
        let e = UnitError::LlmFailed {
            unit: 2,
            retries: 3,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("3 retries"));
        assert!(e.to_string().contains("HTTP 503"));
    }
}
