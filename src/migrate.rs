use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per distinct file content; content_hash is the dedup identity.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            file_id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_hash TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            mtime INTEGER,
            status TEXT NOT NULL DEFAULT 'new',
            extracted_text TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB,
            UNIQUE(file_id, chunk_index),
            FOREIGN KEY (file_id) REFERENCES files(file_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Entities are deduplicated corpus-wide on (text, label).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            label TEXT NOT NULL,
            UNIQUE(text, label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Offsets are char positions into the owning chunk's text.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_mentions (
            entity_id INTEGER NOT NULL,
            chunk_id INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            PRIMARY KEY (entity_id, chunk_id),
            FOREIGN KEY (entity_id) REFERENCES entities(entity_id) ON DELETE CASCADE,
            FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Position-to-chunk mapping for the current index epoch. Cleared and
    // rewritten wholesale on every rebuild, never patched.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_map (
            position INTEGER PRIMARY KEY,
            chunk_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single row tying the mapping table to the on-disk artifact: the epoch
    // UUID here must match the one in the artifact header.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            epoch TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector_count INTEGER NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_status ON files(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_mentions_chunk ON entity_mentions(chunk_id)")
        .execute(pool)
        .await?;

    Ok(())
}
