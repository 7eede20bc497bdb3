//! Persistence of pipeline results.
//!
//! [`SqliteGraphStore`] keeps one row per run in `graphs` and mirrors the
//! searchable text (title and narrative) into an FTS5 table, ranked with
//! BM25 on search. The graph itself is stored as its canonical JSON.
//!
//! Records are immutable; there is no update or delete.

use crate::error::Pdf2GraphError;
use crate::graph::{ConceptGraph, GraphRecord, NewGraphRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default page size for [`GraphStore::list`].
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Upper bound on search hits.
pub const SEARCH_LIMIT: usize = 50;

/// Storage backend for [`GraphRecord`]s.
pub trait GraphStore: Send + Sync {
    /// Persist a new record; assigns the id and (if absent) the timestamp.
    fn insert(&self, record: NewGraphRecord) -> Result<GraphRecord, Pdf2GraphError>;

    /// Newest first.
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<GraphRecord>, Pdf2GraphError>;

    /// # Errors
    /// [`Pdf2GraphError::NotFound`] for an unknown id.
    fn get(&self, id: Uuid) -> Result<GraphRecord, Pdf2GraphError>;

    /// Full-text search over title and narrative, best match first.
    ///
    /// # Errors
    /// [`Pdf2GraphError::InvalidQuery`] when the query is empty after
    /// [`sanitize_query`].
    fn search(&self, query: &str) -> Result<Vec<GraphRecord>, Pdf2GraphError>;
}

static RE_QUERY_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s\-'"]"#).unwrap());

/// Drop everything except word characters, whitespace, `-`, `'` and `"`.
pub fn sanitize_query(query: &str) -> String {
    RE_QUERY_DISALLOWED.replace_all(query, "").trim().to_string()
}

/// Quote every term so FTS5 treats it as a literal; terms are ANDed.
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn storage(context: &str) -> impl Fn(rusqlite::Error) -> Pdf2GraphError + '_ {
    move |e| Pdf2GraphError::Storage(format!("{context}: {e}"))
}

/// SQLite-backed [`GraphStore`].
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Pdf2GraphError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Pdf2GraphError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let conn = Connection::open(path).map_err(storage("open database"))?;
        info!("Opened graph store at {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, Pdf2GraphError> {
        let conn = Connection::open_in_memory().map_err(storage("open in-memory database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, Pdf2GraphError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS graphs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                summary_text TEXT,
                graph_data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_graphs_created
                ON graphs(created_at DESC);

            CREATE VIRTUAL TABLE IF NOT EXISTS graphs_fts USING fts5(
                graph_id UNINDEXED,
                title,
                summary_text
            );
        "#,
        )
        .map_err(storage("create tables"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Pdf2GraphError> {
        self.conn
            .lock()
            .map_err(|_| Pdf2GraphError::Storage("connection mutex poisoned".into()))
    }
}

const SELECT_COLUMNS: &str = "SELECT g.id, g.title, g.summary_text, g.graph_data, g.created_at FROM graphs g";

/// Raw column values; decoded outside the rusqlite closure so JSON and
/// timestamp errors surface as `Storage` errors.
struct RawRow {
    id: String,
    title: String,
    summary_text: Option<String>,
    graph_data: String,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            summary_text: row.get(2)?,
            graph_data: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<GraphRecord, Pdf2GraphError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Pdf2GraphError::Storage(format!("bad id '{}': {e}", self.id)))?;
        let graph_data: ConceptGraph = serde_json::from_str(&self.graph_data)
            .map_err(|e| Pdf2GraphError::Storage(format!("bad graph_data for {id}: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| Pdf2GraphError::Storage(format!("bad created_at for {id}: {e}")))?
            .with_timezone(&Utc);
        Ok(GraphRecord {
            id,
            title: self.title,
            summary_text: self.summary_text,
            graph_data,
            created_at,
        })
    }
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl GraphStore for SqliteGraphStore {
    fn insert(&self, record: NewGraphRecord) -> Result<GraphRecord, Pdf2GraphError> {
        let stored = GraphRecord {
            id: Uuid::new_v4(),
            title: record.title,
            summary_text: record.summary_text,
            graph_data: record.graph_data,
            created_at: record.created_at.unwrap_or_else(Utc::now),
        };
        let graph_json = serde_json::to_string(&stored.graph_data)
            .map_err(|e| Pdf2GraphError::Internal(format!("serialise graph: {e}")))?;
        let id = stored.id.to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage("begin insert"))?;
        tx.execute(
            "INSERT INTO graphs (id, title, summary_text, graph_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                stored.title,
                stored.summary_text,
                graph_json,
                timestamp(&stored.created_at)
            ],
        )
        .map_err(storage("insert graph"))?;
        tx.execute(
            "INSERT INTO graphs_fts (graph_id, title, summary_text) VALUES (?1, ?2, ?3)",
            params![id, stored.title, stored.summary_text],
        )
        .map_err(storage("index graph"))?;
        tx.commit().map_err(storage("commit insert"))?;

        debug!("Stored graph {} ('{}')", stored.id, stored.title);
        Ok(stored)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<GraphRecord>, Pdf2GraphError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY g.created_at DESC, g.rowid DESC LIMIT ?1 OFFSET ?2"
            ))
            .map_err(storage("prepare list"))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], RawRow::from_row)
            .map_err(storage("execute list"))?;

        rows.map(|r| r.map_err(storage("list row")).and_then(RawRow::decode))
            .collect()
    }

    fn get(&self, id: Uuid) -> Result<GraphRecord, Pdf2GraphError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE g.id = ?1"),
                params![id.to_string()],
                RawRow::from_row,
            )
            .optional()
            .map_err(storage("get graph"))?;

        match raw {
            Some(raw) => raw.decode(),
            None => Err(Pdf2GraphError::NotFound(format!("graph {id}"))),
        }
    }

    fn search(&self, query: &str) -> Result<Vec<GraphRecord>, Pdf2GraphError> {
        if query.trim().is_empty() {
            return Err(Pdf2GraphError::InvalidQuery("search query cannot be empty".into()));
        }
        let sanitized = sanitize_query(query);
        if sanitized.is_empty() {
            return Err(Pdf2GraphError::InvalidQuery(format!("'{query}'")));
        }
        let fts_query = escape_fts5_query(&sanitized);
        debug!("Searching graphs for {}", fts_query);

        let conn = self.lock()?;
        run_match(&conn, &fts_query)
    }
}

/// Ranked MATCH over the FTS index. A query FTS5 cannot parse yields no hits.
///
/// SQLite reports MATCH parse errors when the statement is stepped, not when
/// it is prepared, so the check sits on the row iterator.
fn run_match(conn: &Connection, fts_query: &str) -> Result<Vec<GraphRecord>, Pdf2GraphError> {
    let mut stmt = conn
        .prepare(&format!(
            "{SELECT_COLUMNS}
             JOIN graphs_fts ON graphs_fts.graph_id = g.id
             WHERE graphs_fts MATCH ?1
             ORDER BY bm25(graphs_fts), g.created_at DESC
             LIMIT ?2"
        ))
        .map_err(storage("prepare search"))?;
    let rows = stmt
        .query_map(params![fts_query, SEARCH_LIMIT as i64], RawRow::from_row)
        .map_err(storage("execute search"))?;

    let mut raws = Vec::new();
    for row in rows {
        match row {
            Ok(raw) => raws.push(raw),
            Err(e) if e.to_string().contains("fts5: syntax error") => {
                warn!(error = %e, "FTS5 syntax error, returning empty results");
                return Ok(Vec::new());
            }
            Err(e) => return Err(storage("search row")(e)),
        }
    }
    raws.into_iter().map(RawRow::decode).collect()
}

/// Run a store call on the blocking pool.
///
/// Every [`GraphStore`] method is synchronous (SQLite behind a mutex), so
/// async callers go through here instead of blocking a runtime worker.
pub async fn run_blocking<T, F>(store: &Arc<dyn GraphStore>, call: F) -> Result<T, Pdf2GraphError>
where
    T: Send + 'static,
    F: FnOnce(&dyn GraphStore) -> Result<T, Pdf2GraphError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| Pdf2GraphError::Internal(format!("Store task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use chrono::TimeZone;

    fn graph(name: &str) -> ConceptGraph {
        ConceptGraph {
            nodes: vec![Node {
                id: "n1".into(),
                name: name.into(),
                group: 1,
            }],
            links: vec![],
        }
    }

    fn record(title: &str, summary: &str, day: u32) -> NewGraphRecord {
        NewGraphRecord {
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
            ..NewGraphRecord::new(title, summary, graph(title))
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let stored = store
            .insert(record("Photosynthesis", "Light becomes sugar.", 1))
            .unwrap();
        let fetched = store.get(stored.id).unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.graph_data.nodes[0].name, "Photosynthesis");
    }

    #[test]
    fn insert_defaults_timestamp() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let before = Utc::now();
        let stored = store
            .insert(NewGraphRecord::new("t", "s", ConceptGraph::default()))
            .unwrap();
        assert!(stored.created_at >= before);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(Pdf2GraphError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_newest_first_with_paging() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        for (title, day) in [("a", 1), ("c", 3), ("b", 2)] {
            store.insert(record(title, "", day)).unwrap();
        }
        let titles: Vec<String> = store.list(10, 0).unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["c", "b", "a"]);

        let page: Vec<String> = store.list(1, 1).unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(page, ["b"]);
    }

    #[test]
    fn search_matches_title_and_summary() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store
            .insert(record("Photosynthesis", "Chlorophyll captures light energy.", 1))
            .unwrap();
        store
            .insert(record("Mitosis", "Cells divide into two daughter cells.", 2))
            .unwrap();

        let hits = store.search("chlorophyll").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Photosynthesis");

        let hits = store.search("mitosis!").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Mitosis");

        assert!(store.search("ribosome").unwrap().is_empty());
    }

    #[test]
    fn search_rejects_empty_queries() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        assert!(matches!(store.search("   "), Err(Pdf2GraphError::InvalidQuery(_))));
        assert!(matches!(store.search("?!*"), Err(Pdf2GraphError::InvalidQuery(_))));
    }

    #[test]
    fn unparsable_match_yields_no_hits() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        store.insert(record("AND gates", "Logic AND gates", 1)).unwrap();
        let conn = store.lock().unwrap();
        assert!(run_match(&conn, "AND").unwrap().is_empty());
        assert_eq!(run_match(&conn, "\"gates\"").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blocking_calls_reach_the_store() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        let stored = run_blocking(&store, |s| s.insert(record("Cells", "Cells divide", 2)))
            .await
            .unwrap();
        let fetched = run_blocking(&store, move |s| s.get(stored.id)).await.unwrap();
        assert_eq!(fetched.title, "Cells");
        assert!(matches!(
            run_blocking(&store, |s| s.search("  ")).await,
            Err(Pdf2GraphError::InvalidQuery(_))
        ));
    }

    #[test]
    fn sanitize_keeps_words_quotes_and_hyphens() {
        assert_eq!(sanitize_query("light-dependent; DROP TABLE"), "light-dependent DROP TABLE");
        assert_eq!(sanitize_query("\"Calvin cycle\"?"), "\"Calvin cycle\"");
    }

    #[test]
    fn fts_terms_are_quoted() {
        assert_eq!(escape_fts5_query("light-dependent NOT"), "\"light-dependent\" \"NOT\"");
        assert_eq!(escape_fts5_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/graphs.db");
        let id = {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.insert(record("Osmosis", "Water moves.", 4)).unwrap().id
        };
        let reopened = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(reopened.get(id).unwrap().title, "Osmosis");
    }
}
