//! Concept-graph data model.
//!
//! [`ConceptGraph`] is the wire-compatible `{ "nodes": [...], "links": [...] }`
//! object that the LLM is asked to produce, that the store persists as JSON,
//! and that the HTTP API returns verbatim. Serialisation always emits the
//! canonical shape; deserialisation is slightly forgiving because models do
//! not always respect the requested field types (numeric ids, `"2"` groups).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A node-link structure of concepts and typed relationships.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConceptGraph {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

/// A single concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within one graph.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display label.
    pub name: String,
    /// Clustering tag. Opaque to the pipeline; 0 when the model omits it.
    #[serde(default, deserialize_with = "integer_like")]
    pub group: i64,
}

/// A typed, directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(deserialize_with = "string_or_number")]
    pub source: String,
    #[serde(deserialize_with = "string_or_number")]
    pub target: String,
    /// Relationship category, e.g. "causal" or "hierarchical".
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Human-readable relationship text.
    #[serde(default)]
    pub description: String,
}

impl ConceptGraph {
    /// Links whose `source` or `target` names no node in this graph.
    ///
    /// Dangling links are tolerated: the Mermaid output simply declares the
    /// missing endpoint implicitly. Callers log them.
    pub fn dangling_links(&self) -> Vec<&Link> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.links
            .iter()
            .filter(|l| !ids.contains(l.source.as_str()) || !ids.contains(l.target.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// A persisted pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub id: Uuid,
    pub title: String,
    /// The provider's narrative for the document.
    pub summary_text: Option<String>,
    pub graph_data: ConceptGraph,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGraphRecord {
    pub title: String,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub graph_data: ConceptGraph,
    /// Defaults to the insert time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewGraphRecord {
    pub fn new(title: impl Into<String>, summary_text: impl Into<String>, graph: ConceptGraph) -> Self {
        Self {
            title: title.into(),
            summary_text: Some(summary_text.into()),
            graph_data: graph,
            created_at: None,
        }
    }
}

// ── Lenient field decoding ───────────────────────────────────────────────

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn integer_like<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("expected integer group, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_canonical_shape() {
        let graph = ConceptGraph {
            nodes: vec![Node {
                id: "n1".into(),
                name: "Photosynthesis".into(),
                group: 1,
            }],
            links: vec![Link {
                source: "n1".into(),
                target: "n1".into(),
                kind: "causal".into(),
                description: "sustains itself through".into(),
            }],
        };
        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            value,
            json!({
                "nodes": [{"id": "n1", "name": "Photosynthesis", "group": 1}],
                "links": [{
                    "source": "n1",
                    "target": "n1",
                    "type": "causal",
                    "description": "sustains itself through"
                }]
            })
        );
    }

    #[test]
    fn accepts_numeric_ids_and_string_groups() {
        let graph: ConceptGraph = serde_json::from_value(json!({
            "nodes": [{"id": 7, "name": "Light", "group": "2"}, {"id": "b", "name": "Leaf", "group": 1.0}],
            "links": [{"source": 7, "target": "b", "type": "functional"}]
        }))
        .unwrap();
        assert_eq!(graph.nodes[0].id, "7");
        assert_eq!(graph.nodes[0].group, 2);
        assert_eq!(graph.nodes[1].group, 1);
        assert_eq!(graph.links[0].source, "7");
        assert_eq!(graph.links[0].description, "");
    }

    #[test]
    fn missing_group_and_type_default() {
        let graph: ConceptGraph = serde_json::from_value(json!({
            "nodes": [{"id": "a", "name": "A"}],
            "links": [{"source": "a", "target": "a"}]
        }))
        .unwrap();
        assert_eq!(graph.nodes[0].group, 0);
        assert_eq!(graph.links[0].kind, "");
    }

    #[test]
    fn rejects_missing_links_key() {
        let result = serde_json::from_value::<ConceptGraph>(json!({"nodes": []}));
        assert!(result.is_err());
    }

    #[test]
    fn reports_dangling_links() {
        let graph: ConceptGraph = serde_json::from_value(json!({
            "nodes": [{"id": "a", "name": "A", "group": 1}],
            "links": [
                {"source": "a", "target": "a", "type": "self", "description": ""},
                {"source": "a", "target": "ghost", "type": "causal", "description": ""}
            ]
        }))
        .unwrap();
        let dangling = graph.dangling_links();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].target, "ghost");
    }
}
