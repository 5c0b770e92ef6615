//! Turning model replies into structured results.
//!
//! Conversion replies are asked to be a JSON object (see
//! [`crate::prompts::RESPONSE_FORMAT`]), but models wrap it in fences, add
//! prose around it, or ignore the format entirely. [`parse_unit_response`]
//! never fails: when no usable object is found the whole reply becomes the
//! unit's markdown and a warning records the fact.
//!
//! [`normalize_markdown`] then applies cheap deterministic cleanup rules to
//! the markdown, in this order: outer fences, line endings, trailing
//! whitespace, blank-line runs, stray table separators, invisible characters,
//! final newline.

use once_cell::sync::Lazy;
use pdfweave_core::{ConversionResult, DocumentProfile, Heading, ImageInfo, PendingReference};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const RAW_FALLBACK_WARNING: &str = "response was not valid JSON; kept raw text";

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(\{.*\})\s*\n?```").unwrap());

/// What [`parse_analysis_response`] recovered from an analysis reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReply {
    pub profile: DocumentProfile,
    pub headings: Vec<Heading>,
    /// Entries that were dropped or repaired.
    pub warnings: Vec<String>,
}

/// Parse a conversion reply into a [`ConversionResult`].
///
/// Fields are read one at a time: a missing, `null` or oddly shaped field
/// falls back to its default without discarding the rest of the reply. Only
/// a reply with no object or no string `markdown` (or `content`) field is
/// kept as raw text.
pub fn parse_unit_response(raw: &str) -> ConversionResult {
    let fields = extract_json(raw).and_then(|v| match v {
        Value::Object(map) => Some(map),
        _ => None,
    });
    let markdown = fields.as_ref().and_then(|map| {
        ["markdown", "content"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    });

    let (Some(mut fields), Some(markdown)) = (fields, markdown) else {
        debug!("Reply is not a JSON object, keeping {} chars of raw text", raw.len());
        let markdown = normalize_markdown(raw);
        let mut result = ConversionResult::from_raw(markdown);
        result.last_paragraph = last_paragraph_of(&result.markdown);
        result.warnings.push(RAW_FALLBACK_WARNING.to_string());
        return result;
    };

    let mut warnings = Vec::new();
    let markdown = normalize_markdown(&markdown);
    let summary = text_field(&fields, "summary", &mut warnings);
    let last_paragraph = match text_field(&fields, "last_paragraph", &mut warnings) {
        given if given.is_empty() => last_paragraph_of(&markdown),
        given => given,
    };

    let images = collect_images(fields.remove("images"), &mut warnings);
    let resolved = fields.remove("resolved_references");
    let resolved_references = list_field(resolved, "resolved_references", &mut warnings)
        .into_iter()
        .filter_map(parse_reference)
        .map(|r| r.id)
        .collect();
    let unresolved = fields.remove("unresolved_references");
    let unresolved_references = list_field(unresolved, "unresolved_references", &mut warnings)
        .into_iter()
        .filter_map(parse_reference)
        .collect();

    ConversionResult {
        markdown,
        images,
        summary,
        last_paragraph,
        resolved_references,
        unresolved_references,
        warnings,
        degraded: false,
    }
}

/// A trimmed string field; absent and `null` read as empty.
fn text_field(fields: &Map<String, Value>, key: &str, warnings: &mut Vec<String>) -> String {
    match fields.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            warnings.push(format!("field '{key}' is not a string; ignored"));
            String::new()
        }
    }
}

/// An array field; absent and `null` read as empty.
fn list_field(value: Option<Value>, key: &str, warnings: &mut Vec<String>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warnings.push(format!("field '{key}' is not a list; ignored"));
            Vec::new()
        }
    }
}

/// Images arrive as a list of entries or as a map keyed by id.
fn collect_images(value: Option<Value>, warnings: &mut Vec<String>) -> BTreeMap<String, ImageInfo> {
    let entries: Vec<Value> = match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(id, mut entry)| {
                if let Value::Object(ref mut fields) = entry {
                    fields.entry("id").or_insert(Value::String(id));
                }
                entry
            })
            .collect(),
        other => list_field(other, "images", warnings),
    };

    let mut images = BTreeMap::new();
    for entry in entries {
        match serde_json::from_value::<ImageInfo>(entry) {
            Ok(mut info) if !info.id.trim().is_empty() => {
                for coord in info.bbox.iter_mut() {
                    *coord = coord.clamp(0.0, 1000.0);
                }
                images.insert(info.id.clone(), info);
            }
            Ok(_) => warnings.push("image entry without id ignored".to_string()),
            Err(e) => warnings.push(format!("malformed image entry ignored: {e}")),
        }
    }
    images
}

/// References arrive as `{"id", "kind"}` objects or bare id strings.
fn parse_reference(value: Value) -> Option<PendingReference> {
    match value {
        Value::String(id) if !id.trim().is_empty() => {
            Some(PendingReference::new(id.trim(), "reference"))
        }
        Value::Object(map) => {
            let id = map.get("id")?.as_str()?.trim();
            if id.is_empty() {
                return None;
            }
            let kind = map
                .get("kind")
                .or_else(|| map.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("reference");
            Some(PendingReference::new(id, kind))
        }
        _ => None,
    }
}

/// Parse the structure-analysis reply into a profile and a heading list.
///
/// Only a reply with no JSON object is an error. A malformed profile falls
/// back to the default; headings are taken one by one, with levels clamped
/// to 1–6, page 0 moved to page 1 and pages past the end moved to the last
/// page. Headings without text or a usable page are dropped. The profile's
/// `page_count` is always `page_count`.
pub fn parse_analysis_response(raw: &str, page_count: usize) -> Result<AnalysisReply, String> {
    let Some(Value::Object(mut fields)) = extract_json(raw) else {
        return Err("analysis reply contained no JSON object".to_string());
    };
    let mut warnings = Vec::new();

    let mut profile = match fields.remove("profile") {
        None | Some(Value::Null) => DocumentProfile::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warnings.push(format!("analysis profile malformed, using defaults: {e}"));
            DocumentProfile::default()
        }),
    };
    profile.page_count = page_count;

    let mut headings = Vec::new();
    let mut dropped = 0usize;
    let mut clamped = 0usize;
    for entry in list_field(fields.remove("headings"), "headings", &mut warnings) {
        match read_heading(&entry) {
            Some((level, text, page)) => {
                let page = page.max(1);
                let page = if page_count > 0 && page > page_count {
                    clamped += 1;
                    page_count
                } else {
                    page
                };
                headings.push(Heading::new(level, text, page));
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warnings.push(format!("{dropped} malformed analysis headings dropped"));
    }
    if clamped > 0 {
        warnings.push(format!(
            "{clamped} analysis headings past page {page_count} moved to the last page"
        ));
    }
    for w in &warnings {
        warn!("{}", w);
    }

    Ok(AnalysisReply {
        profile,
        headings,
        warnings,
    })
}

/// `(level, text, page)` of one heading entry, if it has all three.
fn read_heading(entry: &Value) -> Option<(u8, &str, usize)> {
    let text = entry.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let level = entry.get("level").and_then(Value::as_i64).unwrap_or(1).clamp(1, 6) as u8;
    let page = entry.get("page")?.as_i64()?.max(0) as usize;
    Some((level, text, page))
}

/// Find the JSON object in a reply: the whole text, a fenced block, or the
/// span from the first `{` to the last `}`.
fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    if let Some(caps) = RE_FENCED_JSON.captures(trimmed) {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(v);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Last non-empty block of `markdown`, verbatim.
pub fn last_paragraph_of(markdown: &str) -> String {
    markdown
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Deterministic cleanup of model-written markdown. Empty input stays empty.
pub fn normalize_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_mid_table_separators(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    is_table_row(line)
        && line.contains('-')
        && line
            .trim()
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Keep a table's separator only in second position.
fn remove_mid_table_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row = 0usize;
    for line in input.lines() {
        if is_table_row(line) {
            row += 1;
            if is_separator_row(line) && row != 2 {
                continue;
            }
        } else {
            row = 0;
        }
        out.push(line);
    }
    out.join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
