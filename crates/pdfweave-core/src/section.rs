//! Section forest reconstruction from a flat heading list.
//!
//! The analysis step reports headings as a flat, ordered list of
//! `(level, text, page)`. Everything downstream (window planning, the table
//! of contents sent to the model, "you are continuing section X" hints)
//! needs the hierarchy instead, so we rebuild it here.
//!
//! ## Page ranges
//!
//! A section ends one page before the next heading *in list order* whose
//! level is the same or shallower, i.e. the heading that closes it on the
//! ancestor stack. Sections still open at the end of the list run to the last
//! page. List order is authoritative, not page order: when the model reports
//! pages out of order, `end_page` can fall below `start_page`. The range is
//! kept as reported and surfaced through [`find_anomalies`] instead of being
//! repaired.

use crate::model::Heading;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A node of the section forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub level: u8,
    pub start_page: usize,
    pub end_page: usize,
    pub children: Vec<Section>,
}

impl Section {
    /// True when the page range is empty because the source pages were out of order.
    pub fn is_inverted(&self) -> bool {
        self.end_page < self.start_page
    }

    /// Whether `[start_page, end_page]` overlaps `[start, end]`.
    ///
    /// Inverted sections are tested with the same formula, unrepaired.
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        self.start_page <= end && self.end_page >= start
    }

    /// Pre-order traversal yielding `(depth, section)`, roots at depth 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }
}

/// Pre-order iterator over a section and its descendants.
pub struct Walk<'a> {
    stack: Vec<(usize, &'a Section)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a Section);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, section) = self.stack.pop()?;
        self.stack
            .extend(section.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, section))
    }
}

/// Pre-order traversal of a whole forest.
pub(crate) fn walk_forest(forest: &[Section]) -> impl Iterator<Item = (usize, &Section)> {
    forest.iter().flat_map(Section::walk)
}

/// Build the section forest for a document of `total_pages` pages.
///
/// Equal-level headings are always siblings. A deeper heading nests under the
/// closest preceding shallower one. An empty heading list yields an empty
/// forest.
pub fn build_section_forest(headings: &[Heading], total_pages: usize) -> Vec<Section> {
    let mut forest: Vec<Section> = Vec::new();
    // Open ancestor chain, outermost first. A section gets its end page and
    // is attached to its parent (or the forest) when it is popped.
    let mut open: Vec<Section> = Vec::new();

    for heading in headings {
        while open.last().is_some_and(|top| top.level >= heading.level) {
            close_top(&mut open, &mut forest, heading.page.saturating_sub(1));
        }

        open.push(Section {
            title: heading.text.trim().to_string(),
            level: heading.level,
            start_page: heading.page,
            end_page: total_pages,
            children: Vec::new(),
        });
    }
    while !open.is_empty() {
        close_top(&mut open, &mut forest, total_pages);
    }

    debug!(
        "Built section forest: {} headings → {} roots",
        headings.len(),
        forest.len()
    );
    forest
}

fn close_top(open: &mut Vec<Section>, forest: &mut Vec<Section>, end_page: usize) {
    if let Some(mut done) = open.pop() {
        done.end_page = end_page;
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => forest.push(done),
        }
    }
}

/// A section whose page range breaks the nesting invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionAnomaly {
    /// `end_page < start_page`.
    InvertedRange {
        title: String,
        start_page: usize,
        end_page: usize,
    },
    /// A child starts or ends outside its parent's range.
    ChildOutsideParent {
        parent: String,
        child: String,
        child_start: usize,
        child_end: usize,
    },
}

/// List every range anomaly in the forest, in pre-order.
///
/// The builder never corrects out-of-order page data; callers use this to
/// warn about it instead.
pub fn find_anomalies(forest: &[Section]) -> Vec<SectionAnomaly> {
    let mut found = Vec::new();
    for (_, section) in walk_forest(forest) {
        if section.is_inverted() {
            found.push(SectionAnomaly::InvertedRange {
                title: section.title.clone(),
                start_page: section.start_page,
                end_page: section.end_page,
            });
        }
        for child in &section.children {
            let contained =
                child.start_page >= section.start_page && child.end_page <= section.end_page;
            if !contained {
                found.push(SectionAnomaly::ChildOutsideParent {
                    parent: section.title.clone(),
                    child: child.title.clone(),
                    child_start: child.start_page,
                    child_end: child.end_page,
                });
            }
        }
    }
    found
}

/// Flattened table-of-contents projection, limited to `max_depth` levels
/// of nesting (1 = roots only).
pub fn flatten_toc(forest: &[Section], max_depth: usize) -> Vec<(usize, &Section)> {
    walk_forest(forest)
        .filter(|(depth, _)| *depth < max_depth)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(level: u8, text: &str, page: usize) -> Heading {
        Heading::new(level, text, page)
    }

    #[test]
    fn empty_headings_give_empty_forest() {
        assert!(build_section_forest(&[], 0).is_empty());
        assert!(build_section_forest(&[], 42).is_empty());
    }

    #[test]
    fn single_heading_spans_document() {
        let forest = build_section_forest(&[h(2, "Only", 1)], 9);
        assert_eq!(forest.len(), 1);
        assert_eq!((forest[0].start_page, forest[0].end_page), (1, 9));
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn nested_and_sibling_roots() {
        let forest =
            build_section_forest(&[h(1, "A", 1), h(2, "B", 2), h(1, "C", 5)], 10);
        assert_eq!(forest.len(), 2);

        let a = &forest[0];
        assert_eq!((a.title.as_str(), a.start_page, a.end_page), ("A", 1, 4));
        assert_eq!(a.children.len(), 1);
        let b = &a.children[0];
        assert_eq!((b.title.as_str(), b.start_page, b.end_page), ("B", 2, 4));

        let c = &forest[1];
        assert_eq!((c.title.as_str(), c.start_page, c.end_page), ("C", 5, 10));
    }

    #[test]
    fn parent_runs_until_next_same_or_higher_heading() {
        let forest = build_section_forest(
            &[h(1, "A", 1), h(2, "A.1", 3), h(2, "A.2", 6), h(1, "B", 9)],
            12,
        );
        let a = &forest[0];
        assert_eq!((a.start_page, a.end_page), (1, 8));
        assert_eq!((a.children[0].start_page, a.children[0].end_page), (3, 5));
        assert_eq!((a.children[1].start_page, a.children[1].end_page), (6, 8));
        assert_eq!((forest[1].start_page, forest[1].end_page), (9, 12));
        assert!(find_anomalies(&forest).is_empty());
    }

    #[test]
    fn child_reported_before_parent_page_is_flagged() {
        let forest = build_section_forest(&[h(1, "A", 5), h(2, "B", 2), h(1, "C", 8)], 10);
        assert_eq!((forest[0].start_page, forest[0].end_page), (5, 7));
        assert_eq!(
            find_anomalies(&forest),
            vec![SectionAnomaly::ChildOutsideParent {
                parent: "A".into(),
                child: "B".into(),
                child_start: 2,
                child_end: 7
            }]
        );
    }

    #[test]
    fn equal_levels_are_siblings_regardless_of_gaps() {
        let forest = build_section_forest(&[h(2, "X", 1), h(2, "Y", 40)], 50);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].end_page, 39);
    }

    #[test]
    fn skipped_levels_still_nest() {
        let forest = build_section_forest(&[h(1, "Top", 1), h(4, "Deep", 1), h(2, "Mid", 3)], 5);
        assert_eq!(forest.len(), 1);
        let titles: Vec<_> = forest[0].children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Deep", "Mid"]);
    }

    #[test]
    fn out_of_order_pages_are_kept_and_flagged() {
        let forest = build_section_forest(&[h(1, "Late", 7), h(1, "Early", 3)], 10);
        assert_eq!(forest[0].start_page, 7);
        assert_eq!(forest[0].end_page, 2);
        assert!(forest[0].is_inverted());

        let anomalies = find_anomalies(&forest);
        assert_eq!(
            anomalies,
            vec![SectionAnomaly::InvertedRange {
                title: "Late".into(),
                start_page: 7,
                end_page: 2
            }]
        );
    }

    #[test]
    fn repeated_page_one_gives_zero_end_page() {
        let forest = build_section_forest(&[h(1, "A", 1), h(1, "B", 1)], 3);
        assert_eq!(forest[0].end_page, 0);
        assert_eq!(forest[1].end_page, 3);
    }

    #[test]
    fn walk_is_preorder_with_depth() {
        let forest = build_section_forest(
            &[h(1, "A", 1), h(2, "A.1", 2), h(3, "A.1.a", 2), h(2, "A.2", 3), h(1, "B", 4)],
            5,
        );
        let order: Vec<_> = walk_forest(&forest)
            .map(|(d, s)| (d, s.title.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, "A"), (1, "A.1"), (2, "A.1.a"), (1, "A.2"), (0, "B")]
        );
    }

    #[test]
    fn toc_respects_depth() {
        let forest = build_section_forest(&[h(1, "A", 1), h(2, "A.1", 2), h(1, "B", 4)], 5);
        let toc: Vec<_> = flatten_toc(&forest, 1).iter().map(|(_, s)| s.title.clone()).collect();
        assert_eq!(toc, vec!["A", "B"]);
        assert_eq!(flatten_toc(&forest, 2).len(), 3);
    }
}
