//! Diagram translation: [`ConceptGraph`] → Mermaid flowchart text.
//!
//! Output layout:
//!
//! ```text
//! graph TD
//!     n1["Photosynthesis"]
//!     n2["Glucose"]
//!     n1 -->|causal| n2
//! ```
//!
//! Mermaid identifiers cannot contain spaces, hyphens or parentheses, so
//! every id goes through [`sanitize_id`] in both node and edge lines. Labels
//! are quoted; embedded quotes become `#quot;` and pipes in edge labels
//! become `/` so they cannot terminate the label early.

use crate::config::EdgeLabel;
use crate::graph::{ConceptGraph, Link};
use std::fmt::Write as _;

/// Mermaid flowchart header (top-down).
pub const MERMAID_HEADER: &str = "graph TD";

/// Make a node id safe for use as a Mermaid identifier.
///
/// Spaces and hyphens become `_`, parentheses are dropped. Idempotent:
/// `"Node (A)"` → `"Node_A"` → `"Node_A"`.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter_map(|c| match c {
            ' ' | '-' => Some('_'),
            '(' | ')' => None,
            other => Some(other),
        })
        .collect()
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

fn edge_label(link: &Link, mode: EdgeLabel) -> String {
    let text = match mode {
        EdgeLabel::Type => link.kind.as_str(),
        EdgeLabel::Description if link.description.trim().is_empty() => link.kind.as_str(),
        EdgeLabel::Description => link.description.as_str(),
    };
    escape_label(text).replace('|', "/")
}

/// Translate a concept graph into Mermaid flowchart text.
pub fn to_mermaid(graph: &ConceptGraph, mode: EdgeLabel) -> String {
    let mut out = String::from(MERMAID_HEADER);

    for node in &graph.nodes {
        let _ = write!(
            out,
            "\n    {}[\"{}\"]",
            sanitize_id(&node.id),
            escape_label(&node.name)
        );
    }

    for link in &graph.links {
        let _ = write!(
            out,
            "\n    {} -->|{}| {}",
            sanitize_id(&link.source),
            edge_label(link, mode),
            sanitize_id(&link.target)
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn node(id: &str, name: &str) -> Node {
        Node {
            id: id.into(),
            name: name.into(),
            group: 1,
        }
    }

    fn link(source: &str, target: &str, kind: &str, description: &str) -> Link {
        Link {
            source: source.into(),
            target: target.into(),
            kind: kind.into(),
            description: description.into(),
        }
    }

    #[test]
    fn sanitize_examples() {
        assert_eq!(sanitize_id("Node (A)"), "Node_A");
        assert_eq!(sanitize_id("light-dependent reactions"), "light_dependent_reactions");
        assert_eq!(sanitize_id("plain"), "plain");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for id in ["Node (A)", "a-b c(d)", "(( ))", "already_safe", ""] {
            let once = sanitize_id(id);
            assert_eq!(sanitize_id(&once), once, "not idempotent for {id:?}");
        }
    }

    #[test]
    fn single_node_graph() {
        let graph = ConceptGraph {
            nodes: vec![node("n1", "Photosynthesis")],
            links: vec![],
        };
        assert_eq!(
            to_mermaid(&graph, EdgeLabel::Type),
            "graph TD\n    n1[\"Photosynthesis\"]"
        );
    }

    #[test]
    fn edges_use_sanitized_ids_and_type() {
        let graph = ConceptGraph {
            nodes: vec![node("Cell (plant)", "Plant cell"), node("chloro-plast", "Chloroplast")],
            links: vec![link("Cell (plant)", "chloro-plast", "hierarchical", "contains")],
        };
        let text = to_mermaid(&graph, EdgeLabel::Type);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "graph TD");
        assert_eq!(lines[1], "    Cell_plant[\"Plant cell\"]");
        assert_eq!(lines[2], "    chloro_plast[\"Chloroplast\"]");
        assert_eq!(lines[3], "    Cell_plant -->|hierarchical| chloro_plast");
    }

    #[test]
    fn description_mode_prefers_description() {
        let graph = ConceptGraph {
            nodes: vec![node("a", "A"), node("b", "B")],
            links: vec![
                link("a", "b", "causal", "drives the | growth of"),
                link("b", "a", "functional", ""),
            ],
        };
        let text = to_mermaid(&graph, EdgeLabel::Description);
        assert!(text.contains("a -->|drives the / growth of| b"));
        assert!(text.contains("b -->|functional| a"));
    }

    #[test]
    fn quotes_in_labels_are_escaped() {
        let graph = ConceptGraph {
            nodes: vec![node("q", "The \"dark\" reactions")],
            links: vec![],
        };
        assert!(to_mermaid(&graph, EdgeLabel::Type).contains("q[\"The #quot;dark#quot; reactions\"]"));
    }
}
