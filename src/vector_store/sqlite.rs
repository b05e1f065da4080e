//! SQLite-based vector store implementation.
//!
//! Vectors live in a BLOB column and cosine similarity is computed in Rust.
//! Filters are pushed into the SQL `WHERE` clause, so filtering happens
//! before the top-N cut. For large catalogs, use a dedicated ANN index behind
//! the same trait.

use super::{
    cosine_similarity, sort_by_similarity, FilterSupport, SearchFilter, VectorMatch, VectorStore,
};
use crate::catalog::{ItemId, SectionKind};
use crate::error::{MarqueeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id TEXT NOT NULL UNIQUE,
        item_id INTEGER NOT NULL,
        section_kind TEXT NOT NULL,
        embedding BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (item_id, section_kind)
    );

    CREATE INDEX IF NOT EXISTS idx_embeddings_section_kind ON embeddings(section_kind);
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a vector store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MarqueeError::Retrieval(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    /// Build the `WHERE` clause and its bound values for a filter.
    fn where_clause(filter: Option<&SearchFilter>) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(filter) = filter {
            if let Some(ids) = &filter.item_ids {
                let placeholders = vec!["?"; ids.len()].join(", ");
                clauses.push(format!("item_id IN ({})", placeholders));
                values.extend(ids.iter().map(|id| Value::Integer(*id)));
            }
            if let Some(kinds) = &filter.section_kinds {
                let placeholders = vec!["?"; kinds.len()].join(", ");
                clauses.push(format!("section_kind IN ({})", placeholders));
                values.extend(kinds.iter().map(|k| Value::Text(k.as_str().to_string())));
            }
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, vector))]
    async fn upsert(&self, item_id: ItemId, kind: SectionKind, vector: &[f32]) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO embeddings (id, item_id, section_kind, embedding, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(item_id, section_kind) DO UPDATE SET
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                item_id,
                kind.as_str(),
                Self::embedding_to_bytes(vector),
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!("Upserted embedding for item {} ({})", item_id, kind);
        Ok(())
    }

    #[instrument(skip(self, query, filter))]
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let conn = self.lock()?;

        let (where_sql, values) = Self::where_clause(filter);
        let sql = format!(
            "SELECT id, item_id, section_kind, embedding FROM embeddings {} ORDER BY item_id, section_kind",
            where_sql
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let id: String = row.get(0)?;
            let item_id: ItemId = row.get(1)?;
            let kind: String = row.get(2)?;
            let bytes: Vec<u8> = row.get(3)?;
            Ok((id, item_id, kind, bytes))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, item_id, kind, bytes) = row?;
            let section_kind = match kind.parse::<SectionKind>() {
                Ok(k) => k,
                Err(e) => {
                    warn!("Skipping embedding {}: {}", id, e);
                    continue;
                }
            };
            results.push(VectorMatch {
                document_id: id,
                item_id,
                section_kind,
                similarity: cosine_similarity(query, &Self::bytes_to_embedding(&bytes)),
            });
        }

        sort_by_similarity(&mut results);
        results.truncate(limit);

        debug!("Found {} matching embeddings", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn delete_by_item(&self, item_id: ItemId) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM embeddings WHERE item_id = ?1", params![item_id])?;
        info!("Deleted {} embeddings for item {}", deleted, item_id);
        Ok(deleted)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn filter_support(&self) -> FilterSupport {
        FilterSupport::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_vector_store() {
        let store = SqliteVectorStore::in_memory().unwrap();

        store.upsert(1, SectionKind::Themes, &[1.0, 0.0, 0.0]).await.unwrap();
        store.upsert(2, SectionKind::PlotStructure, &[0.0, 1.0, 0.0]).await.unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item_id, 1);
        assert!((results[0].similarity - 1.0).abs() < 0.001);

        let filtered = store
            .search(&[1.0, 0.0, 0.0], 10, Some(&SearchFilter::item(2)))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].section_kind, SectionKind::PlotStructure);

        let by_kind = SearchFilter {
            item_ids: None,
            section_kinds: Some(vec![SectionKind::Themes]),
        };
        let filtered = store.search(&[0.0, 1.0, 0.0], 10, Some(&by_kind)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].item_id, 1);

        assert_eq!(store.delete_by_item(1).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_vector_and_keeps_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::new(&dir.path().join("vectors.db")).unwrap();

        store.upsert(5, SectionKind::Reception, &[1.0, 0.0]).await.unwrap();
        let before = store.search(&[1.0, 0.0], 1, None).await.unwrap();

        store.upsert(5, SectionKind::Reception, &[0.0, 1.0]).await.unwrap();
        let after = store.search(&[0.0, 1.0], 1, None).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(before[0].document_id, after[0].document_id);
        assert!((after[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = SqliteVectorStore::embedding_to_bytes(&v);
        assert_eq!(SqliteVectorStore::bytes_to_embedding(&bytes), v);
    }
}
