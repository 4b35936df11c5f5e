use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::VectorStore;
use trellis_core::types::{DocumentRecord, RetrievedRecord};

use crate::embeddings::cosine_similarity;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        page_content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        PRIMARY KEY (collection, doc_id)
    );

    CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);";

fn db_err(e: impl std::fmt::Display) -> TrellisError {
    TrellisError::VectorStore(e.to_string())
}

/// SQLite-backed vector store holding any number of named collections.
///
/// Embeddings are stored as little-endian `f32` BLOBs and ranked by
/// cosine similarity at query time.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrellisError::VectorStore(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Vector store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Store documents with their embeddings, one vector per document.
    ///
    /// Documents without an id get a fresh one; an existing id in the
    /// same collection is replaced. Returns the ids in input order.
    pub fn insert(
        &self,
        collection: &str,
        docs: &[DocumentRecord],
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        if docs.len() != embeddings.len() {
            return Err(TrellisError::VectorStore(format!(
                "{} document(s) but {} embedding(s)",
                docs.len(),
                embeddings.len()
            )));
        }

        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        let mut ids = Vec::with_capacity(docs.len());
        for (doc, embedding) in docs.iter().zip(embeddings) {
            let id = doc
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let metadata = serde_json::to_string(&doc.metadata)?;
            let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
            tx.execute(
                "INSERT OR REPLACE INTO documents (collection, doc_id, page_content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![collection, id, doc.page_content, metadata, blob],
            )
            .map_err(db_err)?;
            ids.push(id);
        }
        tx.commit().map_err(db_err)?;

        debug!(collection, documents = ids.len(), "Stored documents");
        Ok(ids)
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(n as usize)
    }

    /// A search handle scoped to one collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        }
    }
}

/// One collection of a [`SqliteVectorStore`].
pub struct Collection {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn load(conn: &Mutex<Connection>, collection: &str) -> Result<Vec<(Vec<f32>, RetrievedRecord)>> {
    let conn = conn.lock().map_err(db_err)?;
    let mut stmt = conn
        .prepare(
            "SELECT doc_id, page_content, metadata, embedding
             FROM documents WHERE collection = ?1",
        )
        .map_err(db_err)?;

    let rows = stmt
        .query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let page_content: String = row.get(1)?;
            let metadata: String = row.get(2)?;
            let blob: Vec<u8> = row.get(3)?;
            Ok((id, page_content, metadata, blob))
        })
        .map_err(db_err)?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, page_content, metadata, blob) = row.map_err(db_err)?;
        let embedding: Vec<f32> = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let metadata = serde_json::from_str(&metadata)
            .map_err(|e| db_err(format!("bad metadata for '{}': {}", id, e)))?;
        docs.push((
            embedding,
            RetrievedRecord {
                id,
                page_content,
                metadata,
                score: 0.0,
            },
        ));
    }
    Ok(docs)
}

/// Rank `docs` against `query`, best first, keeping at most `k`.
fn rank(docs: &[(Vec<f32>, RetrievedRecord)], query: &[f32], k: usize) -> Vec<RetrievedRecord> {
    let mut scored: Vec<RetrievedRecord> = docs
        .iter()
        .map(|(embedding, record)| RetrievedRecord {
            score: cosine_similarity(query, embedding),
            ..record.clone()
        })
        .collect();

    // Sort by similarity descending
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

impl VectorStore for Collection {
    fn similarity_search(
        &self,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<Vec<RetrievedRecord>>>> {
        let queries = embeddings.to_vec();
        Box::pin(async move {
            let conn = Arc::clone(&self.conn);
            let name = self.name.clone();
            let docs = tokio::task::spawn_blocking(move || load(&conn, &name))
                .await
                .map_err(db_err)??;

            Ok(queries.iter().map(|q| rank(&docs, q, k)).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, text: &str) -> DocumentRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source".into(), json!("arxiv"));
        DocumentRecord {
            id: Some(id.to_string()),
            page_content: text.to_string(),
            metadata,
        }
    }

    fn seeded() -> SqliteVectorStore {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .insert(
                "Arxiv",
                &[doc("x", "about x"), doc("y", "about y"), doc("xy", "about both")],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .unwrap();
        store
            .insert("Other", &[doc("z", "elsewhere")], &[vec![1.0, 0.0]])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_ranks_and_truncates() {
        let store = seeded();
        let results = store
            .collection("Arxiv")
            .similarity_search(&[vec![1.0, 0.1]], 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let ids: Vec<&str> = results[0].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert!(results[0][0].score >= results[0][1].score);
        assert_eq!(results[0][0].metadata.get("source"), Some(&json!("arxiv")));
    }

    #[tokio::test]
    async fn test_one_result_set_per_query() {
        let store = seeded();
        let results = store
            .collection("Arxiv")
            .similarity_search(&[vec![1.0, 0.0], vec![0.0, 1.0]], 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].id, "x");
        assert_eq!(results[1][0].id, "y");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = seeded();
        assert_eq!(store.count("Arxiv").unwrap(), 3);
        assert_eq!(store.count("Other").unwrap(), 1);

        let results = store
            .collection("Missing")
            .similarity_search(&[vec![1.0, 0.0]], 4)
            .await
            .unwrap();
        assert!(results[0].is_empty());
    }

    #[test]
    fn test_insert_replaces_and_assigns_ids() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.insert("c", &[doc("a", "v1")], &[vec![1.0]]).unwrap();
        store.insert("c", &[doc("a", "v2")], &[vec![1.0]]).unwrap();
        assert_eq!(store.count("c").unwrap(), 1);
        assert_eq!(load(&store.conn, "c").unwrap()[0].1.page_content, "v2");

        let anonymous = DocumentRecord {
            id: None,
            page_content: "no id".into(),
            metadata: Default::default(),
        };
        let ids = store.insert("c", &[anonymous], &[vec![0.5]]).unwrap();
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], "a");
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let store = seeded();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE documents SET metadata = '{not json' WHERE doc_id = 'y'",
                [],
            )
            .unwrap();

        match store
            .collection("Arxiv")
            .similarity_search(&[vec![1.0, 0.0]], 3)
            .await
        {
            Err(TrellisError::VectorStore(msg)) => assert!(msg.contains("'y'")),
            other => panic!("expected VectorStore error, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_length_mismatch() {
        let store = SqliteVectorStore::in_memory().unwrap();
        assert!(matches!(
            store.insert("c", &[doc("a", "v")], &[]),
            Err(TrellisError::VectorStore(_))
        ));
    }

    #[test]
    fn test_open_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vectors.db");
        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store.insert("c", &[doc("a", "kept")], &[vec![1.0]]).unwrap();
        }
        let store = SqliteVectorStore::open(&path).unwrap();
        assert_eq!(store.count("c").unwrap(), 1);
    }
}
