//! Entity linking: global (text, label) dedup plus per-chunk mention edges.
//!
//! Find-or-create is an explicit insert-then-select guarded by the
//! `UNIQUE(text, label)` constraint, so two concurrent creations of the
//! same pair collapse to one row. A run-scoped cache fronts the lookup;
//! it is an optimization only, correctness comes from the constraint.

use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::Result;
use crate::models::{EntityMention, EntityRecord};
use crate::oracle::EntityRecognizer;

pub struct EntityLinker {
    pool: SqlitePool,
    recognizer: Arc<dyn EntityRecognizer>,
    // (text, label) -> entity_id, valid for the lifetime of this linker.
    cache: Mutex<HashMap<(String, String), i64>>,
}

impl EntityLinker {
    pub fn new(pool: SqlitePool, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            pool,
            recognizer,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Recognize entities in `chunk_text` and link them to `chunk_id`.
    ///
    /// Returns the number of links actually created. Repeated mentions of
    /// one entity inside the chunk keep only the first occurrence's
    /// offsets; the rest are dropped, not merged. Entity rows may be
    /// created as a side effect even when the link already exists.
    pub async fn link(&self, chunk_id: i64, chunk_text: &str) -> Result<usize> {
        let spans = self.recognizer.recognize(chunk_text).await?;

        let mut seen: HashSet<i64> = HashSet::new();
        let mut new_links = 0usize;

        for span in spans {
            let text = span.text.trim();
            if text.is_empty() {
                continue;
            }

            let entity_id = self.find_or_create(text, &span.label).await?;
            if !seen.insert(entity_id) {
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO entity_mentions (entity_id, chunk_id, start_offset, end_offset)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(entity_id, chunk_id) DO NOTHING
                "#,
            )
            .bind(entity_id)
            .bind(chunk_id)
            .bind(span.start as i64)
            .bind(span.end as i64)
            .execute(&self.pool)
            .await?;

            new_links += result.rows_affected() as usize;
        }

        Ok(new_links)
    }

    async fn find_or_create(&self, text: &str, label: &str) -> Result<i64> {
        let key = (text.to_string(), label.to_string());
        if let Some(&id) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(id);
        }

        sqlx::query("INSERT INTO entities (text, label) VALUES (?, ?) ON CONFLICT(text, label) DO NOTHING")
            .bind(text)
            .bind(label)
            .execute(&self.pool)
            .await?;

        let id: i64 =
            sqlx::query_scalar("SELECT entity_id FROM entities WHERE text = ? AND label = ?")
                .bind(text)
                .bind(label)
                .fetch_one(&self.pool)
                .await?;

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, id);
        Ok(id)
    }
}

/// Entities mentioned in a chunk, for provenance/highlighting.
pub async fn entities_for_chunk(pool: &SqlitePool, chunk_id: i64) -> Result<Vec<EntityRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT e.entity_id, e.text, e.label
        FROM entities e
        JOIN entity_mentions m ON m.entity_id = e.entity_id
        WHERE m.chunk_id = ?
        ORDER BY e.entity_id
        "#,
    )
    .bind(chunk_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| EntityRecord {
            entity_id: row.get("entity_id"),
            text: row.get("text"),
            label: row.get("label"),
        })
        .collect())
}

/// All mention edges for an entity, with per-chunk char offsets.
pub async fn mentions_for_entity(pool: &SqlitePool, entity_id: i64) -> Result<Vec<EntityMention>> {
    let rows = sqlx::query(
        r#"
        SELECT entity_id, chunk_id, start_offset, end_offset
        FROM entity_mentions
        WHERE entity_id = ?
        ORDER BY chunk_id
        "#,
    )
    .bind(entity_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| EntityMention {
            entity_id: row.get("entity_id"),
            chunk_id: row.get("chunk_id"),
            start_offset: row.get("start_offset"),
            end_offset: row.get("end_offset"),
        })
        .collect())
}
