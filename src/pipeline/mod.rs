//! Pipeline stages around the pure core.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ analyze ──▶ backend (per unit) ──▶ response
//! (URL/path) (pdfium)  (base64)   (profile,    (VLM call,             (JSON,
//!                                  headings)    retries)               cleanup)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path, URL or bytes to a local file
//! 2. [`render`]: rasterise the pages of one unit; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap each image for the request body
//! 4. [`analyze`]: one call over the first pages for profile and headings
//! 5. [`registry`]: which providers are configured, and building the chosen one
//! 6. [`backend`]: the model call with retry/backoff; the only stage with
//!    network I/O besides downloads
//! 7. [`response`]: JSON extraction with raw-text fallback, markdown cleanup

pub mod analyze;
pub mod backend;
pub mod encode;
pub mod input;
pub mod registry;
pub mod render;
pub mod response;
