//! Window planning: slice a document into contiguous page ranges, one per
//! conversion call.
//!
//! Providers that cannot take a whole document in one request get it in
//! windows. A window that stops mid-section forces the next call to pick up a
//! half-finished thought, so when a section boundary lies within
//! [`WindowPlanConfig::slack_pages`] of the ideal cut we cut there instead.
//! Otherwise the cut lands exactly on the target size.
//!
//! Windows borrow their sections from the forest: the forest outlives the plan
//! and is never copied per window.

use crate::section::{walk_forest, Section};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knobs for [`plan_windows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlanConfig {
    /// Desired pages per window. `0` is treated as `1`.
    pub target_pages: usize,
    /// How far (in pages) a cut may move from the target to land on a section
    /// boundary. Default: 0, i.e. only exact hits are taken.
    pub slack_pages: usize,
    /// Sections shallower than this depth are boundaries (roots are depth 0).
    /// Default: 1, roots only.
    pub boundary_depth: usize,
}

impl Default for WindowPlanConfig {
    fn default() -> Self {
        Self {
            target_pages: 20,
            slack_pages: 0,
            boundary_depth: 1,
        }
    }
}

impl WindowPlanConfig {
    pub fn new(target_pages: usize) -> Self {
        Self {
            target_pages,
            ..Self::default()
        }
    }

    pub fn with_slack(mut self, slack_pages: usize) -> Self {
        self.slack_pages = slack_pages;
        self
    }

    pub fn with_boundary_depth(mut self, depth: usize) -> Self {
        self.boundary_depth = depth;
        self
    }
}

/// One planned unit of work: a contiguous, inclusive page range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSpec<'a> {
    /// 0-based position in the plan.
    pub index: usize,
    pub start_page: usize,
    pub end_page: usize,
    /// Every section, at any depth, overlapping this window, in pre-order.
    pub sections: Vec<&'a Section>,
    /// Deepest section begun before this window and still running into it.
    pub continued_section: Option<&'a Section>,
    /// Some section runs past `end_page` into the next window.
    pub continues_after: bool,
}

impl WindowSpec<'_> {
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }

    pub fn contains(&self, page: usize) -> bool {
        (self.start_page..=self.end_page).contains(&page)
    }

    /// Whether the window begins part-way through a section.
    pub fn starts_mid_section(&self) -> bool {
        self.continued_section.is_some()
    }
}

/// Partition `[1, total_pages]` into windows of about `config.target_pages`.
///
/// The windows are contiguous, non-overlapping and cover every page. A
/// document no longer than the target yields a single window; an empty
/// document yields none.
pub fn plan_windows<'a>(
    forest: &'a [Section],
    total_pages: usize,
    config: &WindowPlanConfig,
) -> Vec<WindowSpec<'a>> {
    let target = config.target_pages.max(1);

    let mut boundaries: Vec<usize> = walk_forest(forest)
        .filter(|(depth, _)| *depth < config.boundary_depth)
        .map(|(_, s)| s.start_page)
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut ranges = Vec::new();
    let mut start = 1;
    while start <= total_pages {
        let remaining = total_pages - start + 1;
        if remaining <= target {
            ranges.push((start, total_pages));
            break;
        }

        let ideal = start + target - 1;
        let end = boundaries
            .iter()
            .filter(|&&page| page > start && page <= total_pages)
            .map(|&page| page - 1)
            .filter(|&cut| cut.abs_diff(ideal) <= config.slack_pages)
            .min_by_key(|&cut| (cut.abs_diff(ideal), cut))
            .unwrap_or(ideal);

        if end != ideal {
            debug!(
                "Window {}: moved cut {} → {} to land on a section boundary",
                ranges.len() + 1,
                ideal,
                end
            );
        }
        ranges.push((start, end));
        start = end + 1;
    }

    ranges
        .into_iter()
        .enumerate()
        .map(|(index, (start_page, end_page))| describe_window(forest, index, start_page, end_page))
        .collect()
}

/// One window per page, for providers that take a single page image per call.
pub fn plan_pages(forest: &[Section], total_pages: usize) -> Vec<WindowSpec<'_>> {
    plan_windows(forest, total_pages, &WindowPlanConfig::new(1))
}

/// Describe the window `[start_page, end_page]` against `forest`.
///
/// [`plan_windows`] uses this for every range it cuts; callers that keep
/// their own page ranges use it to recover the borrowed view later.
pub fn describe_window(
    forest: &[Section],
    index: usize,
    start_page: usize,
    end_page: usize,
) -> WindowSpec<'_> {
    let mut sections = Vec::new();
    let mut continued: Option<(usize, &Section)> = None;
    let mut continues_after = false;

    for (depth, section) in walk_forest(forest) {
        if !section.intersects(start_page, end_page) {
            continue;
        }
        sections.push(section);

        if section.start_page < start_page && continued.is_none_or(|(d, _)| depth >= d) {
            continued = Some((depth, section));
        }
        if section.end_page > end_page {
            continues_after = true;
        }
    }

    WindowSpec {
        index,
        start_page,
        end_page,
        sections,
        continued_section: continued.map(|(_, s)| s),
        continues_after,
    }
}
