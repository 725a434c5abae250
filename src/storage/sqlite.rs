//! SQLite storage backend

use super::traits::{
    DeleteReport, GraphStore, OpenStore, StorageError, StorageResult, StoreWriter, Upsert,
};
use crate::graph::{Edge, Node, NodeId, NodeKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Ids reachable from `?1` along `contains` edges, never entering Concepts
const BOOK_SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id) AS (
        SELECT id FROM nodes WHERE id = ?1 AND kind = 'Book'
        UNION
        SELECT e.target_id
        FROM edges e
        JOIN subtree s ON e.source_id = s.id
        JOIN nodes n ON n.id = e.target_id
        WHERE e.direction = 'contains' AND n.kind != 'Concept'
    )
"#;

const NODE_COLUMNS: &str = "id, kind, title, text, ord, source_ref, properties_json";
const EDGE_COLUMNS: &str = "source_id, target_id, label, direction";

/// SQLite-backed graph store
///
/// One database file with a `nodes` and an `edges` table. Thread-safe via an
/// internal mutex on the connection. Edges reference nodes with
/// `ON DELETE CASCADE`, so removing a node removes every edge touching it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_node(row: &Row) -> StorageResult<Node> {
        let kind: String = row.get(1)?;
        let properties: String = row.get(6)?;
        Ok(Node {
            id: NodeId::from_string(row.get::<_, String>(0)?),
            kind: kind.parse().map_err(StorageError::Corrupt)?,
            title: row.get(2)?,
            text: row.get(3)?,
            order: row.get(4)?,
            source_ref: row.get(5)?,
            properties: serde_json::from_str(&properties)?,
        })
    }

    fn row_to_edge(row: &Row) -> StorageResult<Edge> {
        let direction: String = row.get(3)?;
        Ok(Edge {
            source: NodeId::from_string(row.get::<_, String>(0)?),
            target: NodeId::from_string(row.get::<_, String>(1)?),
            label: row.get(2)?,
            direction: direction.parse().map_err(StorageError::Corrupt)?,
        })
    }

    fn query_edges(&self, column: &str, id: &NodeId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM edges WHERE {} = ?1 ORDER BY label, source_id, target_id",
            EDGE_COLUMNS, column
        ))?;
        let mut rows = stmt.query(params![id.as_str()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(Self::row_to_edge(row)?);
        }
        Ok(edges)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

/// Writer bound to an open SQLite transaction
struct SqliteWriter<'a> {
    tx: &'a Connection,
}

impl StoreWriter for SqliteWriter<'_> {
    fn upsert_node(&mut self, node: &Node) -> StorageResult<Upsert> {
        let exists = self
            .tx
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![node.id.as_str()], |_| Ok(()))
            .optional()?
            .is_some();

        self.tx.execute(
            r#"
            INSERT INTO nodes (id, kind, title, text, ord, source_ref, properties_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                text = excluded.text,
                ord = excluded.ord,
                source_ref = excluded.source_ref,
                properties_json = excluded.properties_json
            "#,
            params![
                node.id.as_str(),
                node.kind.as_str(),
                node.title,
                node.text,
                node.order,
                node.source_ref,
                serde_json::to_string(&node.properties)?,
            ],
        )?;

        Ok(if exists { Upsert::Updated } else { Upsert::Created })
    }

    fn create_edge_if_absent(&mut self, edge: &Edge) -> StorageResult<bool> {
        let rows = self.tx.execute(
            r#"
            INSERT INTO edges (source_id, label, target_id, direction)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(source_id, label, target_id) DO NOTHING
            "#,
            params![
                edge.source.as_str(),
                edge.label,
                edge.target.as_str(),
                edge.direction.as_str(),
            ],
        )?;
        Ok(rows > 0)
    }
}

impl GraphStore for SqliteStore {
    // === Schema ===

    fn setup_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                text TEXT NOT NULL DEFAULT '',
                ord INTEGER NOT NULL DEFAULT 0,
                source_ref TEXT NOT NULL DEFAULT '',
                properties_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);

            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                target_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                direction TEXT NOT NULL CHECK (direction IN ('contains', 'belongs_to')),
                PRIMARY KEY (source_id, label, target_id)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_label ON edges(label);
            "#,
        )?;
        info!("graph schema ready");
        Ok(())
    }

    fn schema_ready(&self) -> StorageResult<bool> {
        let conn = self.conn()?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('nodes', 'edges')",
            [],
            |row| row.get(0),
        )?;
        Ok(tables == 2)
    }

    // === Writes ===

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut writer = SqliteWriter { tx: &*tx };
            // dropping tx without commit rolls back
            work(&mut writer)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_book(&self, book_id: &NodeId) -> StorageResult<DeleteReport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let edges: i64 = tx.query_row(
            &format!(
                "{} SELECT COUNT(*) FROM edges
                 WHERE source_id IN (SELECT id FROM subtree) OR target_id IN (SELECT id FROM subtree)",
                BOOK_SUBTREE_CTE
            ),
            params![book_id.as_str()],
            |row| row.get(0),
        )?;
        let nodes = tx.execute(
            &format!(
                "{} DELETE FROM nodes WHERE id IN (SELECT id FROM subtree)",
                BOOK_SUBTREE_CTE
            ),
            params![book_id.as_str()],
        )?;
        tx.commit()?;

        debug!("deleted {} nodes and {} edges under {}", nodes, edges, book_id);
        Ok(DeleteReport {
            nodes,
            edges: edges as usize,
        })
    }

    fn prune_orphan_concepts(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            r#"
            DELETE FROM nodes
            WHERE kind = 'Concept'
              AND NOT EXISTS (
                  SELECT 1 FROM edges
                  WHERE edges.target_id = nodes.id AND edges.direction = 'contains'
              )
            "#,
            [],
        )?;
        Ok(removed)
    }

    // === Inspection ===

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS))?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_node(row)?)),
            None => Ok(None),
        }
    }

    fn edges_from(&self, id: &NodeId) -> StorageResult<Vec<Edge>> {
        self.query_edges("source_id", id)
    }

    fn edges_to(&self, id: &NodeId) -> StorageResult<Vec<Edge>> {
        self.query_edges("target_id", id)
    }

    fn book_subtree(&self, book_id: &NodeId) -> StorageResult<Vec<NodeId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} SELECT id FROM subtree ORDER BY id",
            BOOK_SUBTREE_CTE
        ))?;
        let ids = stmt
            .query_map(params![book_id.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(NodeId::from_string).collect())
    }

    fn book_nodes(&self, book_id: &NodeId) -> StorageResult<Vec<NodeId>> {
        let conn = self.conn()?;
        // substr instead of LIKE: ids may contain `_` and `%`
        let mut stmt = conn.prepare(
            "SELECT id FROM nodes
             WHERE kind != 'Concept'
               AND (id = ?1 OR substr(id, 1, length(?1) + 1) = ?1 || '/')
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![book_id.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(NodeId::from_string).collect())
    }

    fn list_books(&self) -> StorageResult<Vec<Node>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM nodes WHERE kind = 'Book' ORDER BY id",
            NODE_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;
        let mut books = Vec::new();
        while let Some(row) = rows.next()? {
            books.push(Self::row_to_node(row)?);
        }
        Ok(books)
    }

    fn node_counts(&self) -> StorageResult<BTreeMap<NodeKind, usize>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(kind.parse().map_err(StorageError::Corrupt)?, count as usize);
        }
        Ok(counts)
    }

    fn edge_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT label, COUNT(*) FROM edges GROUP BY label")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schema::edge_pair;
    use crate::graph::PropertyValue;

    fn create_test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.setup_schema().unwrap();
        store
    }

    fn node(id: &str, kind: NodeKind) -> Node {
        Node::new(NodeId::from(id), kind).with_title(id)
    }

    /// Book → Chapter → Document → Paragraph → Sentence → Concept
    fn write_chain(store: &SqliteStore, book: &str) -> Vec<Node> {
        let chain = vec![
            node(book, NodeKind::Book),
            node(&format!("{}/chapter-1", book), NodeKind::Chapter),
            node(&format!("{}/chapter-1/document-1", book), NodeKind::Document),
            node(&format!("{}/chapter-1/document-1/paragraph-1", book), NodeKind::Paragraph),
            node(&format!("{}/chapter-1/document-1/paragraph-1/sentence-1", book), NodeKind::Sentence),
            node("concept:Q9647", NodeKind::Concept),
        ];
        store
            .transaction(&mut |w| {
                for n in &chain {
                    w.upsert_node(n)?;
                }
                for pair in chain.windows(2) {
                    for edge in edge_pair(&pair[0], &pair[1]).unwrap() {
                        w.create_edge_if_absent(&edge)?;
                    }
                }
                Ok(())
            })
            .unwrap();
        chain
    }

    #[test]
    fn test_schema_setup_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.schema_ready().unwrap());
        store.setup_schema().unwrap();
        store.setup_schema().unwrap();
        assert!(store.schema_ready().unwrap());
    }

    #[test]
    fn test_upsert_reports_created_then_updated() {
        let store = create_test_store();
        let n = node("bio", NodeKind::Book)
            .with_property("collection", PropertyValue::String("bio".into()));
        let mut outcomes = Vec::new();
        store
            .transaction(&mut |w| {
                outcomes.push(w.upsert_node(&n)?);
                outcomes.push(w.upsert_node(&n.clone().with_title("Biology"))?);
                Ok(())
            })
            .unwrap();
        assert_eq!(outcomes, vec![Upsert::Created, Upsert::Updated]);

        let loaded = store.load_node(&n.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Biology");
        assert_eq!(loaded.properties, n.properties);
    }

    #[test]
    fn test_edges_are_created_once() {
        let store = create_test_store();
        let chain = write_chain(&store, "bio");
        let [forward, _] = edge_pair(&chain[0], &chain[1]).unwrap();
        let mut created = true;
        store
            .transaction(&mut |w| {
                created = w.create_edge_if_absent(&forward)?;
                Ok(())
            })
            .unwrap();
        assert!(!created);
        assert_eq!(store.edges_from(&chain[0].id).unwrap().len(), 1);
        assert_eq!(store.edges_to(&chain[0].id).unwrap()[0].label, "CHAPTER_BELONGS_TO_BOOK");
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = create_test_store();
        let result = store.transaction(&mut |w| {
            w.upsert_node(&node("bio", NodeKind::Book))?;
            Err(StorageError::Rejected("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.load_node(&NodeId::from("bio")).unwrap().is_none());
    }

    #[test]
    fn test_edge_to_missing_node_is_rejected() {
        let store = create_test_store();
        let book = node("bio", NodeKind::Book);
        let chapter = node("bio/chapter-1", NodeKind::Chapter);
        let result = store.transaction(&mut |w| {
            w.upsert_node(&book)?;
            for edge in edge_pair(&book, &chapter).unwrap() {
                w.create_edge_if_absent(&edge)?;
            }
            Ok(())
        });
        assert!(matches!(result, Err(StorageError::Database(_))));
        assert!(store.load_node(&book.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_book_keeps_concepts_and_other_books() {
        let store = create_test_store();
        write_chain(&store, "bio");
        write_chain(&store, "chem");

        let report = store.delete_book(&NodeId::from("bio")).unwrap();
        assert_eq!(report.nodes, 5);
        assert_eq!(report.edges, 10);

        assert!(store.load_node(&NodeId::from("bio")).unwrap().is_none());
        assert!(store.load_node(&NodeId::from("chem")).unwrap().is_some());
        let concept = NodeId::concept("Q9647");
        assert!(store.load_node(&concept).unwrap().is_some());
        // chem's sentence still links the concept
        assert_eq!(store.edges_to(&concept).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_unknown_book_is_noop() {
        let store = create_test_store();
        write_chain(&store, "bio");
        let report = store.delete_book(&NodeId::from("bio/chapter-1")).unwrap();
        assert_eq!(report, DeleteReport::default());
    }

    #[test]
    fn test_prune_removes_only_unlinked_concepts() {
        let store = create_test_store();
        write_chain(&store, "bio");
        store
            .transaction(&mut |w| {
                w.upsert_node(&node("concept:Q1", NodeKind::Concept))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.prune_orphan_concepts().unwrap(), 1);
        store.delete_book(&NodeId::from("bio")).unwrap();
        assert_eq!(store.prune_orphan_concepts().unwrap(), 1);
        assert!(store.load_node(&NodeId::concept("Q9647")).unwrap().is_none());
    }

    #[test]
    fn test_counts_and_books() {
        let store = create_test_store();
        write_chain(&store, "bio");
        let nodes = store.node_counts().unwrap();
        assert_eq!(nodes[&NodeKind::Sentence], 1);
        assert_eq!(nodes[&NodeKind::Concept], 1);
        let edges = store.edge_counts().unwrap();
        assert_eq!(edges["SENTENCE_CONTAINS_CONCEPT"], 1);
        assert_eq!(edges.values().sum::<usize>(), 10);
        assert_eq!(store.list_books().unwrap().len(), 1);
        assert_eq!(store.book_subtree(&NodeId::from("bio")).unwrap().len(), 5);
    }

    #[test]
    fn test_book_nodes_match_by_id_prefix() {
        let store = create_test_store();
        write_chain(&store, "bio");
        write_chain(&store, "bio_2");
        store
            .transaction(&mut |w| {
                w.upsert_node(&node("bio/chapter-7", NodeKind::Chapter))?;
                Ok(())
            })
            .unwrap();

        let ids = store.book_nodes(&NodeId::from("bio")).unwrap();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&NodeId::from("bio/chapter-7")));
        assert!(ids.iter().all(|id| id.as_str() == "bio" || id.as_str().starts_with("bio/")));
        // the unlinked chapter is not reachable by containment
        assert_eq!(store.book_subtree(&NodeId::from("bio")).unwrap().len(), 5);
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }
}
