//! Input resolution: normalise a user-supplied path, URL or byte buffer to a
//! local file pdfium can open.
//!
//! Downloads and in-memory buffers land in temp files owned by
//! [`ResolvedInput`]; they are removed when it is dropped. Anything handed
//! to pdfium has passed a `%PDF` magic check first.

use crate::error::PdfweaveError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

/// The resolved input: a local path or a temp file kept alive by this value.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was a byte buffer written to a temp file.
    Buffered(NamedTempFile),
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Buffered(file) => file.path(),
        }
    }

    /// Write `bytes` to a temp file after checking they look like a PDF.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfweaveError> {
        check_magic(bytes, Path::new("<memory>"))?;
        let mut tmp = NamedTempFile::new()
            .map_err(|e| PdfweaveError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| PdfweaveError::Internal(format!("tempfile write: {e}")))?;
        debug!("Buffered {} bytes to {}", bytes.len(), tmp.path().display());
        Ok(ResolvedInput::Buffered(tmp))
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, PdfweaveError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn check_magic(bytes: &[u8], path: &Path) -> Result<(), PdfweaveError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(PdfweaveError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, PdfweaveError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(PdfweaveError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() {
                check_magic(&magic, &path)?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfweaveError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PdfweaveError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, PdfweaveError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| PdfweaveError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PdfweaveError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| PdfweaveError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| PdfweaveError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
