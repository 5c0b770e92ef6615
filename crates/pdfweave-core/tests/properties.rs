//! Property-based tests for the section forest, window planner, continuity
//! fold and provider selector.
//!
//! Case counts follow `PROPTEST_CASES` when set (default 128).

use pdfweave_core::{
    build_section_forest, find_anomalies, fold_continuity, plan_windows, select_provider,
    ContinuityState, ConversionResult, DocumentProfile, Heading, ProviderId, Section,
    SectionAnomaly, WindowPlanConfig,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(128);
    ProptestConfig::with_cases(cases)
}

/// Headings with unique titles (`h0`, `h1`, …) and pages in `1..=total`.
fn arb_headings(total: usize) -> impl Strategy<Value = Vec<Heading>> {
    prop::collection::vec((1u8..=6, 1..=total), 0..40).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (level, page))| Heading::new(level, format!("h{i}"), page))
            .collect()
    })
}

/// Headings whose pages strictly increase down the list.
fn arb_ordered_headings() -> impl Strategy<Value = (Vec<Heading>, usize)> {
    (prop::collection::btree_set(1usize..200, 1..30), prop::collection::vec(1u8..=6, 30))
        .prop_map(|(pages, levels)| {
            let headings = pages
                .iter()
                .zip(levels)
                .enumerate()
                .map(|(i, (&page, level))| Heading::new(level, format!("h{i}"), page))
                .collect();
            (headings, 200)
        })
}

fn preorder_titles(forest: &[Section]) -> Vec<String> {
    forest
        .iter()
        .flat_map(Section::walk)
        .map(|(_, s)| s.title.clone())
        .collect()
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn preorder_reproduces_input_order(
        (total, headings) in (1usize..120).prop_flat_map(|t| (Just(t), arb_headings(t)))
    ) {
        let forest = build_section_forest(&headings, total);
        let expected: Vec<String> = headings.iter().map(|h| h.text.clone()).collect();
        prop_assert_eq!(preorder_titles(&forest), expected);
    }

    #[test]
    fn empty_headings_always_give_empty_forest(total in 0usize..10_000) {
        prop_assert!(build_section_forest(&[], total).is_empty());
    }

    #[test]
    fn children_nest_when_pages_increase((headings, total) in arb_ordered_headings()) {
        let forest = build_section_forest(&headings, total);
        prop_assert!(find_anomalies(&forest).is_empty());
        for (_, parent) in forest.iter().flat_map(Section::walk) {
            for child in &parent.children {
                prop_assert!(child.start_page >= parent.start_page);
                prop_assert!(child.end_page <= parent.end_page);
                prop_assert!(child.level > parent.level);
            }
        }
    }

    #[test]
    fn escaping_children_are_always_flagged(
        (total, headings) in (1usize..60).prop_flat_map(|t| (Just(t), arb_headings(t)))
    ) {
        let forest = build_section_forest(&headings, total);
        let anomalies = find_anomalies(&forest);
        for (_, parent) in forest.iter().flat_map(Section::walk) {
            for child in &parent.children {
                let contained = child.start_page >= parent.start_page
                    && child.end_page <= parent.end_page;
                if !contained {
                    let flagged = anomalies.iter().any(|a| matches!(
                        a,
                        SectionAnomaly::ChildOutsideParent { parent: p, child: c, .. }
                            if *p == parent.title && *c == child.title
                    ));
                    prop_assert!(flagged, "{} under {} not flagged", child.title, parent.title);
                }
            }
        }
    }

    #[test]
    fn windows_tile_the_document(
        (total, headings) in (0usize..300).prop_flat_map(|t| (Just(t), arb_headings(t.max(1)))),
        target in 0usize..50,
        slack in 0usize..10,
        depth in 0usize..4,
    ) {
        let forest = build_section_forest(&headings, total);
        let cfg = WindowPlanConfig::new(target).with_slack(slack).with_boundary_depth(depth);
        let windows = plan_windows(&forest, total, &cfg);

        if total == 0 {
            prop_assert!(windows.is_empty());
            return Ok(());
        }
        prop_assert_eq!(windows[0].start_page, 1);
        prop_assert_eq!(windows[windows.len() - 1].end_page, total);
        for pair in windows.windows(2) {
            prop_assert_eq!(pair[0].end_page + 1, pair[1].start_page);
        }
        for (i, w) in windows.iter().enumerate() {
            prop_assert_eq!(w.index, i);
            prop_assert!(w.start_page <= w.end_page);
            prop_assert!(w.page_count() <= target.max(1) + slack);
            for s in &w.sections {
                prop_assert!(s.intersects(w.start_page, w.end_page));
            }
        }
        if total <= target.max(1) {
            prop_assert_eq!(windows.len(), 1);
        }
    }

    #[test]
    fn fold_depends_only_on_prefix(tails in prop::collection::vec("[a-z]{0,8}", 1..12)) {
        let results: Vec<ConversionResult> = tails
            .iter()
            .map(|t| ConversionResult {
                last_paragraph: t.clone(),
                summary: format!("up to {t}"),
                ..ConversionResult::default()
            })
            .collect();

        let run = |rs: &[ConversionResult]| {
            rs.iter().fold(ContinuityState::new(), fold_continuity)
        };
        let full = run(&results);
        prop_assert_eq!(&full, &run(&results));
        prop_assert_eq!(full.units_folded, results.len());
        prop_assert_eq!(&full.previous_tail, tails.last().unwrap());
    }

    #[test]
    fn selection_is_deterministic(
        picks in prop::collection::btree_set(0usize..5, 0..=5),
        pages in 1usize..2000,
        sensitive in any::<bool>(),
    ) {
        let all: Vec<ProviderId> = ProviderId::all().collect();
        let configured: BTreeSet<ProviderId> = picks.iter().map(|&i| all[i]).collect();
        let profile = DocumentProfile {
            sensitive_content: sensitive,
            ..DocumentProfile::minimal(pages)
        };

        let first = select_provider(&profile, &configured);
        prop_assert_eq!(first, select_provider(&profile, &configured));
        match configured.len() {
            0 => prop_assert_eq!(first, None),
            1 => prop_assert_eq!(first, configured.iter().next().copied()),
            _ => prop_assert!(first.is_some_and(|id| configured.contains(&id))),
        }
    }
}
