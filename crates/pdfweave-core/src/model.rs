//! Plain data shared by every stage: headings, the document profile, and the
//! per-unit conversion result.
//!
//! These types carry no behaviour beyond small constructors. They are all
//! `Serialize + Deserialize` because they cross the LLM boundary as JSON in
//! both directions (analysis responses in, conversion results out).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A heading reported by the structure-extraction step.
///
/// Headings arrive in document order. `page` is whatever the model reported
/// and is not guaranteed to be monotonic across the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading depth, 1 (`#`) to 6 (`######`).
    pub level: u8,
    pub text: String,
    /// 1-indexed page the heading appears on.
    pub page: usize,
}

impl Heading {
    pub fn new(level: u8, text: impl Into<String>, page: usize) -> Self {
        Self {
            level,
            text: text.into(),
            page,
        }
    }
}

/// Broad genre of a document, as judged by the analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Academic,
    Technical,
    Legal,
    Financial,
    Book,
    Magazine,
    Presentation,
    Form,
    #[default]
    #[serde(other)]
    Other,
}

/// How much running text a typical page carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDensity {
    Sparse,
    Dense,
    #[default]
    #[serde(other)]
    Normal,
}

/// Immutable per-document snapshot produced once by the analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentProfile {
    /// BCP-47-ish language tag, e.g. `"en"`.
    pub language: String,
    pub page_count: usize,
    pub has_toc: bool,
    pub estimated_images: usize,
    pub estimated_tables: usize,
    pub estimated_code_blocks: usize,
    pub has_math: bool,
    /// Text repeated at the top of pages (running title, chapter name).
    pub header_pattern: Option<String>,
    /// Text repeated at the bottom of pages (page numbers, copyright line).
    pub footer_pattern: Option<String>,
    pub content_type: ContentType,
    pub text_density: TextDensity,
    /// Copyrighted or otherwise sensitive material that content filters may refuse.
    pub sensitive_content: bool,
}

impl Default for DocumentProfile {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            page_count: 0,
            has_toc: false,
            estimated_images: 0,
            estimated_tables: 0,
            estimated_code_blocks: 0,
            has_math: false,
            header_pattern: None,
            footer_pattern: None,
            content_type: ContentType::default(),
            text_density: TextDensity::default(),
            sensitive_content: false,
        }
    }
}

impl DocumentProfile {
    /// The fallback profile used when no analysis is available: page count
    /// only, everything else at its default.
    pub fn minimal(page_count: usize) -> Self {
        Self {
            page_count,
            ..Self::default()
        }
    }

    /// Whether provider-side content filtering is likely to refuse this
    /// document (books and magazines are usually copyrighted).
    pub fn is_sensitive(&self) -> bool {
        self.sensitive_content
            || matches!(self.content_type, ContentType::Book | ContentType::Magazine)
    }
}

/// Category of an image found on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Photo,
    Chart,
    Diagram,
    Table,
    Logo,
    Equation,
    #[default]
    #[serde(other)]
    Other,
}

/// An image located by the model. `bbox` is `[x0, y0, x1, y1]` on a 0–1000
/// scale relative to the page, independent of render resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub bbox: [f32; 4],
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: ImageKind,
}

/// A cross-reference (figure, table, footnote, citation) that a unit
/// mentioned but whose target has not been seen yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingReference {
    pub id: String,
    pub kind: String,
}

impl PendingReference {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

/// Output of one conversion unit (a page or a window).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionResult {
    pub markdown: String,
    pub images: BTreeMap<String, ImageInfo>,
    /// Short running summary of the document up to and including this unit.
    pub summary: String,
    /// Final paragraph of `markdown`, verbatim, for the next unit to continue from.
    pub last_paragraph: String,
    /// Reference ids whose target appeared in this unit.
    pub resolved_references: Vec<String>,
    /// References mentioned in this unit whose target is still missing.
    pub unresolved_references: Vec<PendingReference>,
    pub warnings: Vec<String>,
    /// True when this result was substituted for a failed call.
    pub degraded: bool,
}

impl ConversionResult {
    /// A result carrying only raw text, used when a response could not be
    /// parsed into structured fields.
    pub fn from_raw(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            ..Self::default()
        }
    }

    /// The well-formed, content-free result folded in place of a failed unit.
    pub fn degraded(unit_index: usize, reason: impl AsRef<str>) -> Self {
        Self {
            warnings: vec![format!(
                "[unit {}] conversion failed: {}",
                unit_index + 1,
                reason.as_ref()
            )],
            degraded: true,
            ..Self::default()
        }
    }
}
