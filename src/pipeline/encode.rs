//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless, so rendered text stays crisp; `detail: "high"` asks
//! GPT-4-class models to tile the image at full resolution instead of a
//! single low-resolution overview.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode a unit's pages, keeping their order. Fails on the first page that
/// cannot be encoded, naming it.
pub fn encode_unit(pages: &[(usize, DynamicImage)]) -> Result<Vec<ImageData>, String> {
    pages
        .iter()
        .map(|(page, img)| encode_page(img).map_err(|e| format!("page {page}: {e}")))
        .collect()
}
