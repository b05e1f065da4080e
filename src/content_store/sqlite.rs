//! SQLite-based content store implementation.

use super::ContentStore;
use crate::catalog::{Item, ItemId, Section, SectionKind};
use crate::error::{MarqueeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        year INTEGER
    );

    CREATE TABLE IF NOT EXISTS sections (
        item_id INTEGER NOT NULL REFERENCES items(id),
        section_kind TEXT NOT NULL,
        content TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (item_id, section_kind)
    );

    CREATE INDEX IF NOT EXISTS idx_items_title ON items(title COLLATE NOCASE);
"#;

/// SQLite-based content store.
pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    /// Open (or create) a content store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite content store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory content store (useful for testing).
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
            .map_err(|e| MarqueeError::ContentStore(format!("Failed to acquire lock: {}", e)))
    }

    fn row_to_section(
        item_id: ItemId,
        kind: &str,
        content: String,
        word_count: u32,
        title: String,
        year: Option<i32>,
    ) -> Option<Section> {
        match kind.parse::<SectionKind>() {
            Ok(kind) => Some(Section {
                item_id,
                kind,
                content,
                word_count,
                item_title: title,
                item_year: year,
            }),
            Err(e) => {
                warn!("Skipping section of item {}: {}", item_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    #[instrument(skip(self, section), fields(item_id = section.item_id, kind = %section.kind))]
    async fn put_section(&self, section: &Section) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO items (id, title, year) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title, year = excluded.year
            "#,
            params![section.item_id, section.item_title, section.item_year],
        )?;
        tx.execute(
            r#"
            INSERT INTO sections (item_id, section_kind, content, word_count, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(item_id, section_kind) DO UPDATE SET
                content = excluded.content,
                word_count = excluded.word_count,
                updated_at = excluded.updated_at
            "#,
            params![
                section.item_id,
                section.kind.as_str(),
                section.content,
                section.word_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        debug!("Stored section");
        Ok(())
    }

    async fn get_section(&self, item_id: ItemId, kind: SectionKind) -> Result<Option<Section>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                r#"
                SELECT s.content, s.word_count, i.title, i.year
                FROM sections s JOIN items i ON i.id = s.item_id
                WHERE s.item_id = ?1 AND s.section_kind = ?2
                "#,
                params![item_id, kind.as_str()],
                |row| {
                    Ok(Section {
                        item_id,
                        kind,
                        content: row.get(0)?,
                        word_count: row.get(1)?,
                        item_title: row.get(2)?,
                        item_year: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(row)
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let conn = self.lock()?;
        let item = conn
            .query_row(
                "SELECT id, title, year FROM items WHERE id = ?1",
                params![item_id],
                |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        year: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    async fn sections_for_item(&self, item_id: ItemId) -> Result<Vec<Section>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT s.section_kind, s.content, s.word_count, i.title, i.year
            FROM sections s JOIN items i ON i.id = s.item_id
            WHERE s.item_id = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![item_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i32>>(4)?,
            ))
        })?;

        let mut sections = Vec::new();
        for row in rows {
            let (kind, content, word_count, title, year) = row?;
            if let Some(section) =
                Self::row_to_section(item_id, &kind, content, word_count, title, year)
            {
                sections.push(section);
            }
        }
        sections.sort_by_key(|s| s.kind);

        Ok(sections)
    }

    async fn get_items_by_ids(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock()?;
        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let sql = format!("SELECT id, title FROM items WHERE id IN ({})", placeholders);
        let mut stmt = conn.prepare(&sql)?;

        let values: Vec<Value> = item_ids.iter().map(|id| Value::Integer(*id)).collect();
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, ItemId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut titles = HashMap::new();
        for row in rows {
            let (id, title) = row?;
            titles.insert(id, title);
        }
        Ok(titles)
    }

    async fn find_items_by_titles(&self, titles: &[String]) -> Result<HashMap<String, ItemId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM items WHERE title = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
        )?;

        let mut found = HashMap::new();
        for title in titles {
            let id: Option<ItemId> = stmt.query_row(params![title], |row| row.get(0)).optional()?;
            if let Some(id) = id {
                found.insert(title.clone(), id);
            }
        }
        Ok(found)
    }

    async fn count_sections(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sections", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
