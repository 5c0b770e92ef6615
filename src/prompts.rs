//! Prompts for the analysis and conversion calls.
//!
//! Every string the model sees is built here so prompt changes never touch
//! retry or parsing logic, and tests can inspect prompts without a model.
//!
//! Two kinds of text are produced:
//!
//! * constant system prompts ([`CONVERSION_SYSTEM_PROMPT`],
//!   [`ANALYSIS_SYSTEM_PROMPT`]) plus the fidelity-tier addenda;
//! * per-call messages rendered from data ([`unit_context_message`],
//!   [`unit_instruction`], [`analysis_instruction`]).
//!
//! Callers can replace the conversion prompt via
//! [`crate::config::ConversionConfig::system_prompt`]. The JSON response
//! contract is only appended to the built-in prompt; a custom prompt that
//! yields plain Markdown still works because parsing falls back to raw text.

use crate::config::{ConversionConfig, FidelityTier};
use crate::output::DocumentMetadata;
use pdfweave_core::UnitContext;
use std::fmt::Write as _;

/// Built-in system prompt for converting page images to Markdown.
pub const CONVERSION_SYSTEM_PROMPT: &str = r#"You are an expert document converter. You receive one or more consecutive PDF page images from a larger document, together with a description of where they sit in that document. Convert them to clean, well-structured Markdown.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL text content completely and accurately
   - Maintain the reading order as a human would read the page
   - Correct obvious OCR-like errors only if you are completely certain

2. STRUCTURE
   - Use the heading levels given in the document context; do not invent new top-level titles
   - If the pages continue a section begun earlier, do NOT repeat its heading
   - Use - for unordered lists and 1. 2. 3. for ordered lists, continuing numbering across pages
   - Use **bold** and *italic* to match the visual emphasis

3. CONTINUITY
   - If the previous unit ended mid-sentence or mid-list, continue it seamlessly
   - Do NOT repeat the previous unit's final paragraph

4. WHAT TO IGNORE
   - Page numbers and the repeated headers/footers listed in the context
   - Decorative borders and lines that carry no content meaning

5. IMAGES
   - For each figure, chart or photo, insert ![description](image-id) where it appears
   - Report its bounding box on a 0-1000 scale relative to the page"#;

/// Additions per fidelity tier.
pub fn fidelity_rules(tier: FidelityTier) -> &'static str {
    match tier {
        FidelityTier::Tier1 => {
            "\n\n6. SIMPLIFICATION\n   - Render tables as plain lists of rows\n   - Describe formulas in words instead of LaTeX"
        }
        FidelityTier::Tier2 => {
            "\n\n6. TABLES AND CODE\n   - Convert tables to GFM pipe format\n   - Wrap code blocks in triple backticks with a language identifier"
        }
        FidelityTier::Tier3 => {
            "\n\n6. TABLES, CODE AND MATH\n   - Convert tables to GFM pipe format; use HTML table markup when cells span rows or columns\n   - Wrap code blocks in triple backticks with a language identifier\n   - Render mathematical expressions using LaTeX: $inline$ and $$display$$\n   - Keep figure captions directly below the image reference"
        }
    }
}

/// The JSON contract appended to the built-in conversion prompt.
pub const RESPONSE_FORMAT: &str = r#"

RESPONSE FORMAT
Reply with a single JSON object and nothing else:
{
  "markdown": "<the Markdown for these pages>",
  "summary": "<two or three sentences summarising the document so far, including these pages>",
  "last_paragraph": "<the final paragraph of your markdown, verbatim>",
  "images": [{"id": "fig-1", "bbox": [x0, y0, x1, y1], "description": "...", "type": "photo|chart|diagram|table|logo|equation|other"}],
  "resolved_references": ["<ids of pending references whose target appears in these pages>"],
  "unresolved_references": [{"id": "<e.g. fig-3>", "kind": "<figure|table|footnote|citation|equation>"}]
}"#;

/// Full conversion system prompt for `config`.
pub fn conversion_system_prompt(config: &ConversionConfig) -> String {
    match config.system_prompt.as_deref() {
        Some(custom) => custom.to_string(),
        None => format!(
            "{}{}{}",
            CONVERSION_SYSTEM_PROMPT,
            fidelity_rules(config.fidelity),
            RESPONSE_FORMAT
        ),
    }
}

/// System prompt for the one-off structure analysis call.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a document analyst. You receive the first pages of a PDF as images. Determine the document's overall profile and its heading structure. Use the table of contents if one is visible; otherwise report the headings you can see.

Reply with a single JSON object and nothing else:
{
  "profile": {
    "language": "<ISO 639-1 code>",
    "has_toc": true,
    "estimated_images": 0,
    "estimated_tables": 0,
    "estimated_code_blocks": 0,
    "has_math": false,
    "header_pattern": "<text repeated at the top of pages, or null>",
    "footer_pattern": "<text repeated at the bottom of pages, or null>",
    "content_type": "academic|technical|legal|financial|book|magazine|presentation|form|other",
    "text_density": "sparse|normal|dense",
    "sensitive_content": false
  },
  "headings": [{"level": 1, "text": "<heading>", "page": 1}]
}

Estimates are for the WHOLE document, not just the pages shown. Heading pages are 1-indexed PDF page numbers (not printed page labels). Set sensitive_content when the document is copyrighted published material such as a book or magazine."#;

/// User message accompanying the analysis sample images.
pub fn analysis_instruction(
    shown_pages: &[usize],
    page_count: usize,
    metadata: &DocumentMetadata,
) -> String {
    let mut s = format!(
        "The document has {} pages. The images show pages {}.",
        page_count,
        join_pages(shown_pages)
    );
    if let Some(title) = &metadata.title {
        let _ = write!(s, "\nEmbedded title: {title}");
    }
    if let Some(subject) = &metadata.subject {
        let _ = write!(s, "\nEmbedded subject: {subject}");
    }
    s
}

/// Render the assembled context as the message placed before the page images.
pub fn unit_context_message(ctx: &UnitContext) -> String {
    let mut s = String::from("DOCUMENT CONTEXT\n");
    let doc = &ctx.document;
    let pos = &ctx.position;

    let _ = writeln!(
        s,
        "Language: {}. Total pages: {}.",
        doc.language, doc.total_pages
    );
    let _ = writeln!(
        s,
        "You are converting pages {}-{} (unit {} of {}, {:.0}% of the document precedes these pages).",
        pos.start_page,
        pos.end_page,
        pos.unit_index + 1,
        pos.unit_count,
        pos.percent_complete
    );

    if !doc.table_of_contents.is_empty() {
        s.push_str("\nTable of contents:\n");
        for entry in &doc.table_of_contents {
            let _ = writeln!(
                s,
                "{}{} {} (pages {}-{})",
                "  ".repeat(entry.depth),
                "#".repeat(entry.section.level.max(1) as usize),
                entry.section.title,
                entry.section.start_page,
                entry.section.end_page
            );
        }
    }

    let structure = &ctx.structure;
    if let Some(open) = &structure.continued_section {
        let mut path = structure.breadcrumb.clone();
        path.push(open.title.clone());
        let _ = writeln!(
            s,
            "\nThese pages continue the section \"{}\" (started on page {}). Do not repeat its heading.",
            path.join(" > "),
            open.start_page
        );
    }
    if !structure.expected_headings.is_empty() {
        s.push_str("\nHeadings expected in these pages:\n");
        for h in &structure.expected_headings {
            let _ = writeln!(
                s,
                "- {} {} (page {})",
                "#".repeat(h.level.max(1) as usize),
                h.title,
                h.start_page
            );
        }
    }
    if structure.continues_after {
        s.push_str("\nThe last section continues after these pages; it is fine to stop mid-section.\n");
    }

    let cont = &ctx.continuity;
    if !cont.previous_summary.is_empty() {
        let _ = writeln!(s, "\nSummary so far: {}", cont.previous_summary);
    }
    if !cont.previous_tail.is_empty() {
        let _ = writeln!(
            s,
            "\nThe previous unit ended with:\n\"\"\"{}\"\"\"",
            cont.previous_tail
        );
    }
    if !cont.pending_references.is_empty() {
        s.push_str("\nReferences still waiting for their target:\n");
        for r in &cont.pending_references {
            let _ = writeln!(s, "- {} ({})", r.id, r.kind);
        }
    }

    let exp = &ctx.expectations;
    let mut expect = Vec::new();
    if exp.images > 0 {
        expect.push(format!("about {} image(s)", exp.images));
    }
    if exp.tables > 0 {
        expect.push(format!("about {} table(s)", exp.tables));
    }
    if exp.code_blocks > 0 {
        expect.push(format!("about {} code block(s)", exp.code_blocks));
    }
    if exp.has_math {
        expect.push("mathematical notation".to_string());
    }
    if !expect.is_empty() {
        let _ = writeln!(s, "\nExpect {}.", expect.join(", "));
    }

    if !doc.exclusion_patterns.is_empty() {
        s.push_str("\nOmit this repeated page furniture:\n");
        for p in &doc.exclusion_patterns {
            let _ = writeln!(s, "- \"{p}\"");
        }
    }

    s
}

/// Short user instruction sent with the page images.
pub fn unit_instruction(pages: &[usize]) -> String {
    match pages {
        [only] => format!("Convert page {only}."),
        _ => format!("Convert pages {}, in order.", join_pages(pages)),
    }
}

fn join_pages(pages: &[usize]) -> String {
    match pages {
        [] => String::new(),
        [only] => only.to_string(),
        [first, .., last] if last - first + 1 == pages.len() => format!("{first}-{last}"),
        _ => pages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfweave_core::{
        assemble_context, build_section_forest, fold_continuity, plan_windows, ContextOptions,
        ContinuityState, ConversionResult, DocumentProfile, Heading, PendingReference,
        WindowPlanConfig,
    };

    #[test]
    fn default_prompt_includes_tier_and_format() {
        let config = ConversionConfig::builder()
            .fidelity(FidelityTier::Tier3)
            .build()
            .unwrap();
        let prompt = conversion_system_prompt(&config);
        assert!(prompt.contains("LaTeX"));
        assert!(prompt.contains("\"last_paragraph\""));
    }

    #[test]
    fn custom_prompt_replaces_everything() {
        let config = ConversionConfig::builder()
            .system_prompt("Just transcribe.")
            .build()
            .unwrap();
        assert_eq!(conversion_system_prompt(&config), "Just transcribe.");
    }

    #[test]
    fn join_pages_compacts_ranges() {
        assert_eq!(join_pages(&[3]), "3");
        assert_eq!(join_pages(&[4, 5, 6]), "4-6");
        assert_eq!(join_pages(&[1, 3, 4]), "1, 3, 4");
        assert_eq!(unit_instruction(&[7]), "Convert page 7.");
        assert_eq!(unit_instruction(&[1, 2]), "Convert pages 1-2, in order.");
    }

    #[test]
    fn context_message_mentions_continuation_and_tail() {
        let forest = build_section_forest(
            &[Heading::new(1, "Intro", 1), Heading::new(2, "Scope", 2)],
            12,
        );
        let windows = plan_windows(&forest, 12, &WindowPlanConfig::new(6));
        let profile = DocumentProfile {
            footer_pattern: Some("ACME Corp".into()),
            ..DocumentProfile::minimal(12)
        };
        let state = fold_continuity(
            ContinuityState::new(),
            &ConversionResult {
                last_paragraph: "the results were".into(),
                unresolved_references: vec![PendingReference::new("tab-1", "table")],
                ..ConversionResult::default()
            },
        );
        let ctx = assemble_context(
            &windows[1],
            &profile,
            &state,
            &forest,
            windows.len(),
            &ContextOptions::default(),
        );

        let msg = unit_context_message(&ctx);
        assert!(msg.contains("pages 7-12"));
        assert!(msg.contains("Intro > Scope"));
        assert!(msg.contains("the results were"));
        assert!(msg.contains("tab-1 (table)"));
        assert!(msg.contains("\"ACME Corp\""));
        assert!(msg.contains("# Intro (pages 1-12)"));
    }

    #[test]
    fn analysis_instruction_lists_pages_and_title() {
        let meta = DocumentMetadata {
            title: Some("Handbook".into()),
            ..DocumentMetadata::default()
        };
        let msg = analysis_instruction(&[1, 2, 3], 90, &meta);
        assert!(msg.contains("90 pages"));
        assert!(msg.contains("pages 1-3"));
        assert!(msg.contains("Handbook"));
    }
}
