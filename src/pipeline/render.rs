//! PDF rasterisation via pdfium, behind the [`PageImages`] seam.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and keeps
//! thread-local state. Every call here runs on Tokio's blocking pool so worker
//! threads never stall while a page renders.
//!
//! ## Why render per unit?
//!
//! Rendering the whole document up front holds every page image in memory
//! until the last call finishes. The driver asks for one unit's pages at a
//! time, so peak memory is bounded by the largest window.
//!
//! The pdfium library is bound at runtime: `PDFIUM_LIB_PATH` names the shared
//! library file if set, otherwise the system library is used.

use crate::config::ConversionConfig;
use crate::error::PdfweaveError;
use crate::output::DocumentMetadata;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of page images for conversion units.
///
/// The driver only needs "images for these pages"; tests substitute a
/// synthetic source so the pipeline runs without pdfium.
#[async_trait]
pub trait PageImages: Send + Sync {
    /// Images for `pages` (1-indexed), in the same order.
    async fn page_images(&self, pages: &[usize]) -> Result<Vec<ImageData>, String>;
}

/// Renders pages of a PDF file on disk.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    path: PathBuf,
    password: Option<String>,
    dpi: u32,
    max_pixels: u32,
}

impl PdfRenderer {
    pub fn new(path: impl Into<PathBuf>, config: &ConversionConfig) -> Self {
        Self {
            path: path.into(),
            password: config.password.clone(),
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PageImages for PdfRenderer {
    async fn page_images(&self, pages: &[usize]) -> Result<Vec<ImageData>, String> {
        let renderer = self.clone();
        let pages = pages.to_vec();
        tokio::task::spawn_blocking(move || {
            let rendered = renderer.render_blocking(&pages)?;
            encode::encode_unit(&rendered)
        })
        .await
        .map_err(|e| format!("render task panicked: {e}"))?
    }
}

impl PdfRenderer {
    fn render_blocking(&self, pages: &[usize]) -> Result<Vec<(usize, DynamicImage)>, String> {
        let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
        let document = open_document(&pdfium, &self.path, self.password.as_deref())
            .map_err(|e| e.to_string())?;
        let doc_pages = document.pages();
        let total = doc_pages.len() as usize;

        let mut out = Vec::with_capacity(pages.len());
        for &page_num in pages {
            if page_num == 0 || page_num > total {
                return Err(format!("page {page_num} out of range (1-{total})"));
            }
            let page = doc_pages
                .get((page_num - 1) as u16)
                .map_err(|e| format!("page {page_num}: {e:?}"))?;

            let target_width = (page.width().value / 72.0 * self.dpi as f32).round() as i32;
            let render_config = PdfRenderConfig::new()
                .set_target_width(target_width.clamp(1, self.max_pixels as i32))
                .set_maximum_height(self.max_pixels as i32);

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| format!("page {page_num}: {e:?}"))?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            out.push((page_num, image));
        }
        Ok(out)
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` if set, else the system library.
pub fn bind_pdfium() -> Result<Pdfium, PdfweaveError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PdfweaveError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PdfweaveError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                PdfweaveError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                PdfweaveError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            PdfweaveError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Extract document metadata from a PDF without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PdfweaveError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| PdfweaveError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PdfweaveError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let meta = DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    };
    info!("PDF loaded: {} pages", meta.page_count);
    Ok(meta)
}
