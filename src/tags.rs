//! Tag canonicalization and parsing.
//!
//! Tags flow in from several places (the operation payloads, pasted
//! spreadsheet cells, live documents) in inconsistent shapes. Everything is
//! funneled through `normalize_tags` before comparison or storage.

use serde::Deserialize;

/// Maximum number of tags a document may carry.
pub const MAX_TAGS: usize = 8;

/// Canonicalize a tag list: lowercase, trim, drop empties, dedupe preserving
/// first-seen order, cap at [`MAX_TAGS`].
///
/// Single pass: scanning stops as soon as the cap is reached, so input order
/// decides which tags survive truncation.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if !out.contains(&tag) {
            out.push(tag);
            if out.len() == MAX_TAGS {
                break;
            }
        }
    }
    out
}

/// A tag cell as it arrives off the wire: either a proper list or a string
/// that still needs splitting.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsCell {
    List(Vec<String>),
    Text(String),
}

/// Parse a heterogeneous tag cell into a normalized tag list.
///
/// String cells that look like a JSON array (spreadsheet exports sometimes
/// round-trip them that way) are parsed as JSON; on parse failure we fall
/// through to delimiter splitting rather than erroring. Otherwise the cell
/// splits on `|` when present, else on `,`.
pub fn parse_tags_cell(cell: &TagsCell) -> Vec<String> {
    match cell {
        TagsCell::List(list) => normalize_tags(list),
        TagsCell::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Vec::new();
            }
            if text.starts_with('[') && text.ends_with(']') {
                if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(text) {
                    let items: Vec<String> = values
                        .iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    return normalize_tags(&items);
                }
            }
            let parts: Vec<&str> = if text.contains('|') {
                text.split('|').collect()
            } else {
                text.split(',').collect()
            };
            normalize_tags(&parts)
        }
    }
}
