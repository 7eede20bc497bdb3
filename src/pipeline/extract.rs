//! Graph extraction: recover the concept-graph JSON from raw model output.
//!
//! Models asked for "only JSON" still wrap it in prose, Markdown fences, or
//! repeat the object twice. Instead of demanding exact compliance, we scan
//! the text for top-level balanced `{ … }` spans and try each one:
//!
//! ```text
//! Sure! Here is the graph:  ```json { "nodes": [...], "links": [...] } ```
//!                                   └──────────── candidate ─────────┘
//! ```
//!
//! A span becomes a candidate when it parses as JSON and has both a `nodes`
//! and a `links` key. Spans that fail either check are skipped silently and
//! scanning continues. The **first** candidate in document order is the
//! answer: it is decoded into a [`ConceptGraph`] (missing `group` and `type`
//! fields default), and if that decode fails extraction fails. A later
//! candidate is never substituted for it.
//!
//! Brace counting is purely lexical: braces inside JSON strings count too.
//! A string containing an unmatched brace therefore shifts the span, the
//! span fails to parse, and it is skipped like any other malformed span.

use crate::error::Pdf2GraphError;
use crate::graph::ConceptGraph;
use serde_json::Value;
use tracing::{debug, error};

/// Extract the first graph-shaped object from `raw`.
///
/// # Errors
/// [`Pdf2GraphError::NoGraphFound`] when no span qualifies, or when the first
/// qualifying span does not decode into a graph.
pub fn extract_graph(raw: &str) -> Result<ConceptGraph, Pdf2GraphError> {
    debug!("Extracting graph JSON from {} chars of model output", raw.len());

    let Some(value) = candidates(raw).next() else {
        error!("No valid graph JSON found in response");
        return Err(Pdf2GraphError::NoGraphFound { len: raw.len() });
    };

    serde_json::from_value(value).map_err(|e| {
        error!("First graph-shaped object has invalid fields: {}", e);
        Pdf2GraphError::NoGraphFound { len: raw.len() }
    })
}

/// Every graph-shaped object that decodes, in document order.
pub fn find_candidates(raw: &str) -> Vec<ConceptGraph> {
    candidates(raw)
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

fn candidates(raw: &str) -> impl Iterator<Item = Value> + '_ {
    balanced_spans(raw).filter_map(parse_candidate)
}

/// Iterate over the top-level balanced `{ … }` spans of `text`.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;

    text.char_indices().filter_map(move |(i, c)| match c {
        '{' => {
            if depth == 0 {
                start = Some(i);
            }
            depth += 1;
            None
        }
        '}' if depth > 0 => {
            depth -= 1;
            if depth == 0 {
                // `}` is one byte, so `i + 1` is a char boundary.
                start.take().map(|s| &text[s..=i])
            } else {
                None
            }
        }
        _ => None,
    })
}

fn parse_candidate(span: &str) -> Option<Value> {
    let value: Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => {
            debug!("Skipping malformed JSON span ({} chars): {}", span.len(), e);
            return None;
        }
    };

    let obj = value.as_object()?;
    if !(obj.contains_key("nodes") && obj.contains_key("links")) {
        debug!("Skipping JSON object without nodes/links keys");
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{"nodes":[{"id":"n1","name":"Photosynthesis","group":1},{"id":"n2","name":"Glucose","group":2}],"links":[{"source":"n1","target":"n2","type":"causal","description":"produces"}]}"#;

    fn expected() -> ConceptGraph {
        serde_json::from_str(GRAPH).unwrap()
    }

    #[test]
    fn bare_object() {
        assert_eq!(extract_graph(GRAPH).unwrap(), expected());
    }

    #[test]
    fn wrapped_in_prose_and_fences() {
        let raw = format!("Sure! Here is the concept graph:\n\n```json\n{GRAPH}\n```\n\nLet me know if you need more.");
        assert_eq!(extract_graph(&raw).unwrap(), expected());
    }

    #[test]
    fn first_of_two_wins() {
        let second = r#"{"nodes":[{"id":"z","name":"Zeta","group":9}],"links":[]}"#;
        let raw = format!("{GRAPH}\n\nAlternatively:\n{second}");
        assert_eq!(extract_graph(&raw).unwrap(), expected());
        assert_eq!(find_candidates(&raw).len(), 2);

        let reversed = format!("{second} then {GRAPH}");
        assert_eq!(extract_graph(&reversed).unwrap().nodes[0].id, "z");
    }

    #[test]
    fn first_graph_with_missing_group_still_wins() {
        let first = r#"{"nodes":[{"id":"a","name":"A"}],"links":[{"source":"a","target":"a"}]}"#;
        let second = r#"{"nodes":[{"id":"z","name":"Zeta","group":1}],"links":[]}"#;
        let g = extract_graph(&format!("{first}\n{second}")).unwrap();
        assert_eq!(g.nodes[0].id, "a");
        assert_eq!(g.nodes[0].group, 0);
        assert_eq!(g.links[0].kind, "");
    }

    #[test]
    fn undecodable_first_graph_fails_instead_of_falling_through() {
        let first = r#"{"nodes":"not a list","links":[]}"#;
        let raw = format!("{first} {GRAPH}");
        assert!(matches!(
            extract_graph(&raw),
            Err(Pdf2GraphError::NoGraphFound { .. })
        ));
        assert_eq!(find_candidates(&raw), vec![expected()]);
    }

    #[test]
    fn leading_object_without_keys_is_skipped() {
        let raw = format!(r#"{{"note": "draft"}} {GRAPH}"#);
        assert_eq!(extract_graph(&raw).unwrap(), expected());
    }

    #[test]
    fn malformed_span_is_skipped() {
        let raw = format!(r#"{{"nodes": [,], "links": }} and then {GRAPH}"#);
        assert_eq!(extract_graph(&raw).unwrap(), expected());
    }

    #[test]
    fn dangling_open_brace_fails() {
        let raw = format!("{{ {GRAPH}");
        assert!(matches!(
            extract_graph(&raw),
            Err(Pdf2GraphError::NoGraphFound { .. })
        ));
    }

    #[test]
    fn no_braces_fails() {
        assert!(matches!(
            extract_graph("I could not produce a graph for this text."),
            Err(Pdf2GraphError::NoGraphFound { .. })
        ));
        assert!(matches!(
            extract_graph(""),
            Err(Pdf2GraphError::NoGraphFound { .. })
        ));
    }

    #[test]
    fn stray_closing_brace_is_ignored() {
        let raw = format!("}} oops }} {GRAPH}");
        assert_eq!(extract_graph(&raw).unwrap(), expected());
    }

    #[test]
    fn extraction_is_idempotent() {
        let raw = format!("prefix {GRAPH} suffix {{");
        let a = extract_graph(&raw).unwrap();
        let b = extract_graph(&raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_text_around_object() {
        let raw = format!("Voilà — le graphe : {GRAPH} ✓");
        assert_eq!(extract_graph(&raw).unwrap(), expected());
    }

    #[test]
    fn nested_objects_do_not_split_candidate() {
        let raw = r#"{"nodes":[{"id":"a","name":"A","group":1}],"links":[],"meta":{"v":{"x":1}}}"#;
        let g = extract_graph(raw).unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert!(g.links.is_empty());
    }
}
