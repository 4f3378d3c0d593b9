//! Output formatting for search results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use rankfuse_core::{Document, DocumentKey, RankedList};
use serde::Serialize;
use serde_json::Value;

/// Maximum characters to show in text snippet
const SNIPPET_MAX_LEN: usize = 120;

/// JSON output structure: one entry per query, in input order
#[derive(Serialize)]
pub struct JsonOutput<'a> {
    pub queries: Vec<JsonQueryResult<'a>>,
}

/// Results of one query
#[derive(Serialize)]
pub struct JsonQueryResult<'a> {
    pub query: &'a str,
    pub results: Vec<JsonHit<'a>>,
}

/// One ranked document
#[derive(Serialize)]
pub struct JsonHit<'a> {
    /// 1-indexed position in the ranked list
    pub rank: usize,
    pub key: &'a DocumentKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<&'a Document>,
}

/// Formats search results as JSON.
pub fn format_json(queries: &[String], results: &[RankedList]) -> String {
    let output = JsonOutput {
        queries: queries
            .iter()
            .zip(results)
            .map(|(query, list)| JsonQueryResult {
                query,
                results: list
                    .iter()
                    .enumerate()
                    .map(|(idx, entry)| JsonHit {
                        rank: idx + 1,
                        key: &entry.key,
                        score: entry.score,
                        document: entry.fields.as_ref(),
                    })
                    .collect(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search results for human-readable terminal output.
///
/// The snippet of each hit is taken from the first of `fields` holding text.
pub fn format_human(queries: &[String], results: &[RankedList], fields: &[String]) -> String {
    let mut output = String::new();

    for (query, list) in queries.iter().zip(results) {
        if list.is_empty() {
            output.push_str(&format!("No results found for \"{}\"\n\n", query));
            continue;
        }

        output.push_str(&format!(
            "Found {} result{} for \"{}\":\n\n",
            list.len(),
            if list.len() == 1 { "" } else { "s" },
            query
        ));

        for (i, entry) in list.iter().enumerate() {
            match entry.score {
                Some(score) => output.push_str(&format!(
                    "{}. {} (score: {:.2})\n",
                    i + 1,
                    entry.key,
                    score
                )),
                None => output.push_str(&format!("{}. {}\n", i + 1, entry.key)),
            }

            if let Some(snippet) = entry.fields.as_ref().and_then(|doc| snippet(doc, fields)) {
                output.push_str(&format!("   {}\n", snippet));
            }
        }
        output.push('\n');
    }

    output.trim_end().to_string()
}

fn snippet(document: &Document, fields: &[String]) -> Option<String> {
    fields.iter().find_map(|field| match document.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => {
            Some(truncate_text(text, SNIPPET_MAX_LEN))
        }
        _ => None,
    })
}

/// Truncates text to a maximum number of characters, adding ellipsis if needed.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(max_len) else {
        return text.to_string();
    };

    // Find a word boundary near max_len
    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}
