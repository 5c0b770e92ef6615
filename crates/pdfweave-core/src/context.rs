//! Context assembly: everything a single conversion call needs to know about
//! the rest of the document.
//!
//! A model converting pages 41–60 has never seen pages 1–40. The
//! [`UnitContext`] built here tells it where it is (position), what it should
//! find (expected headings, scaled content estimates), what it is continuing
//! (the open section and the previous unit's last paragraph) and what to leave
//! out (running headers and footers).
//!
//! The context is an owned snapshot. Assembly only reads the
//! [`ContinuityState`]; folding the unit's result back is
//! [`crate::continuity::fold_continuity`]'s job.

use crate::continuity::ContinuityState;
use crate::model::{DocumentProfile, PendingReference};
use crate::section::{flatten_toc, Section};
use crate::window::WindowSpec;
use serde::{Deserialize, Serialize};

/// Tuning for [`assemble_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Nesting levels of the section forest projected into the table of
    /// contents. `0` disables the table of contents.
    pub toc_max_depth: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { toc_max_depth: 3 }
    }
}

/// A section reduced to what the model needs to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub title: String,
    pub level: u8,
    pub start_page: usize,
    pub end_page: usize,
}

impl From<&Section> for SectionSummary {
    fn from(s: &Section) -> Self {
        Self {
            title: s.title.clone(),
            level: s.level,
            start_page: s.start_page,
            end_page: s.end_page,
        }
    }
}

/// One line of the table-of-contents projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub depth: usize,
    #[serde(flatten)]
    pub section: SectionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFacts {
    pub language: String,
    pub total_pages: usize,
    pub header_pattern: Option<String>,
    pub footer_pattern: Option<String>,
    pub table_of_contents: Vec<TocEntry>,
    /// Repeated page furniture that must not appear in the output.
    pub exclusion_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 0-based index of this unit.
    pub unit_index: usize,
    pub unit_count: usize,
    pub start_page: usize,
    pub end_page: usize,
    /// Share of the document's pages before this unit, 0–100.
    pub percent_complete: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub sections: Vec<SectionSummary>,
    /// Sections whose heading should appear inside this unit.
    pub expected_headings: Vec<SectionSummary>,
    pub continued_section: Option<SectionSummary>,
    /// Titles of the continued section's ancestors, outermost first.
    pub breadcrumb: Vec<String>,
    pub continues_after: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuity {
    pub previous_tail: String,
    pub previous_summary: String,
    pub pending_references: Vec<PendingReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
    pub images: usize,
    pub tables: usize,
    pub code_blocks: usize,
    pub has_code: bool,
    pub has_math: bool,
}

/// Read-only context handed to one conversion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitContext {
    pub document: DocumentFacts,
    pub position: Position,
    pub structure: Structure,
    pub continuity: Continuity,
    pub expectations: Expectations,
}

impl UnitContext {
    pub fn is_first(&self) -> bool {
        self.position.unit_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.position.unit_index + 1 >= self.position.unit_count
    }
}

/// Build the context for `window`, the `window.index`-th of `unit_count` units.
pub fn assemble_context(
    window: &WindowSpec<'_>,
    profile: &DocumentProfile,
    state: &ContinuityState,
    forest: &[Section],
    unit_count: usize,
    options: &ContextOptions,
) -> UnitContext {
    let total_pages = profile.page_count.max(window.end_page);
    let unit_pages = window.page_count();

    let exclusion_patterns = [&profile.header_pattern, &profile.footer_pattern]
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
        .cloned()
        .collect();

    let table_of_contents = flatten_toc(forest, options.toc_max_depth)
        .into_iter()
        .map(|(depth, s)| TocEntry {
            depth,
            section: s.into(),
        })
        .collect();

    let percent_complete = if total_pages == 0 {
        0.0
    } else {
        (window.start_page - 1) as f32 * 100.0 / total_pages as f32
    };

    let breadcrumb = window
        .continued_section
        .and_then(|target| ancestor_titles(forest, target))
        .unwrap_or_default();

    UnitContext {
        document: DocumentFacts {
            language: profile.language.clone(),
            total_pages,
            header_pattern: profile.header_pattern.clone(),
            footer_pattern: profile.footer_pattern.clone(),
            table_of_contents,
            exclusion_patterns,
        },
        position: Position {
            unit_index: window.index,
            unit_count,
            start_page: window.start_page,
            end_page: window.end_page,
            percent_complete,
        },
        structure: Structure {
            sections: window.sections.iter().map(|s| (*s).into()).collect(),
            expected_headings: window
                .sections
                .iter()
                .filter(|s| window.contains(s.start_page))
                .map(|s| (*s).into())
                .collect(),
            continued_section: window.continued_section.map(Into::into),
            breadcrumb,
            continues_after: window.continues_after,
        },
        continuity: Continuity {
            previous_tail: state.previous_tail.clone(),
            previous_summary: state.previous_summary.clone(),
            pending_references: state.pending_references.iter().cloned().collect(),
        },
        expectations: Expectations {
            images: scale_estimate(profile.estimated_images, unit_pages, total_pages),
            tables: scale_estimate(profile.estimated_tables, unit_pages, total_pages),
            code_blocks: scale_estimate(profile.estimated_code_blocks, unit_pages, total_pages),
            has_code: profile.estimated_code_blocks > 0,
            has_math: profile.has_math,
        },
    }
}

/// Share of a document-wide estimate falling on `pages` of `total` pages,
/// rounded up so a non-zero estimate never vanishes.
fn scale_estimate(estimate: usize, pages: usize, total: usize) -> usize {
    if estimate == 0 || total == 0 {
        return 0;
    }
    (estimate * pages).div_ceil(total)
}

/// Titles of the sections enclosing `target`, outermost first. `None` when
/// `target` is not part of `forest`.
fn ancestor_titles(forest: &[Section], target: &Section) -> Option<Vec<String>> {
    for section in forest {
        if std::ptr::eq(section, target) {
            return Some(Vec::new());
        }
        if let Some(mut below) = ancestor_titles(&section.children, target) {
            below.insert(0, section.title.clone());
            return Some(below);
        }
    }
    None
}
