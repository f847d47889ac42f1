//! Content-addressed ingestion ledger.
//!
//! One [`FileRecord`](crate::models::FileRecord) per distinct byte content,
//! keyed by SHA-256. Re-ingesting identical bytes — from any path — is a
//! no-op against the existing record, which is the pipeline's idempotence
//! guarantee. The ledger also owns the chunk rows and their embedding
//! blobs, since chunks are exclusively owned by their file record.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::io::Read;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{ChunkRecord, FileRecord, FileStatus};

/// Outcome of offering a candidate file to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Content hash not seen before; a new record was created with status `new`.
    Accepted { file_id: i64 },
    /// Identical content already tracked. Nothing was written; the stored
    /// path is not updated even if this candidate arrived under another one.
    Skipped { file_id: i64 },
}

/// SHA-256 hex digest of a byte slice, fed to the hasher in fixed-size
/// windows so the slice and reader entry points share one code path.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for window in bytes.chunks(64 * 1024) {
        hasher.update(window);
    }
    format!("{:x}", hasher.finalize())
}

/// Streaming SHA-256 hex digest; bounded memory regardless of input size.
pub fn content_hash_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Offer file content to the ledger. Dedup happens here and nowhere else.
pub async fn ingest_candidate(
    pool: &SqlitePool,
    path: &str,
    bytes: &[u8],
    mtime: Option<i64>,
) -> Result<IngestOutcome> {
    let hash = content_hash(bytes);

    if let Some(file_id) = find_by_hash(pool, &hash).await? {
        tracing::debug!(path, file_id, "duplicate content, skipping");
        return Ok(IngestOutcome::Skipped { file_id });
    }

    let result = sqlx::query(
        r#"
        INSERT INTO files (content_hash, path, size_bytes, mtime, status)
        VALUES (?, ?, ?, ?, 'new')
        ON CONFLICT(content_hash) DO NOTHING
        "#,
    )
    .bind(&hash)
    .bind(path)
    .bind(bytes.len() as i64)
    .bind(mtime)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Lost a race with another writer inserting the same hash.
        let file_id = find_by_hash(pool, &hash)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound)?;
        return Ok(IngestOutcome::Skipped { file_id });
    }

    Ok(IngestOutcome::Accepted {
        file_id: result.last_insert_rowid(),
    })
}

async fn find_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT file_id FROM files WHERE content_hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

pub async fn get_file(pool: &SqlitePool, file_id: i64) -> Result<Option<FileRecord>> {
    let row = sqlx::query(
        "SELECT file_id, content_hash, path, size_bytes, mtime, status, extracted_text
         FROM files WHERE file_id = ?",
    )
    .bind(file_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let status: String = row.get("status");
            Ok(Some(FileRecord {
                file_id: row.get("file_id"),
                content_hash: row.get("content_hash"),
                path: row.get("path"),
                size_bytes: row.get("size_bytes"),
                mtime: row.get("mtime"),
                status: FileStatus::parse(&status)?,
                extracted_text: row.get("extracted_text"),
            }))
        }
        None => Ok(None),
    }
}

/// Store extracted text and advance the file to `extracted`.
pub async fn mark_extracted(pool: &SqlitePool, file_id: i64, text: &str) -> Result<()> {
    sqlx::query("UPDATE files SET extracted_text = ?, status = 'extracted' WHERE file_id = ?")
        .bind(text)
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_status(pool: &SqlitePool, file_id: i64, status: FileStatus) -> Result<()> {
    sqlx::query("UPDATE files SET status = ? WHERE file_id = ?")
        .bind(status.as_str())
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert chunk texts in source order, in one transaction. Returns the
/// assigned chunk ids, which are monotonic by construction.
pub async fn insert_chunks(
    pool: &SqlitePool,
    file_id: i64,
    texts: &[String],
) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(texts.len());

    for (index, text) in texts.iter().enumerate() {
        let result = sqlx::query(
            "INSERT INTO chunks (file_id, chunk_index, text) VALUES (?, ?, ?)",
        )
        .bind(file_id)
        .bind(index as i64)
        .bind(text)
        .execute(&mut *tx)
        .await?;
        ids.push(result.last_insert_rowid());
    }

    tx.commit().await?;
    Ok(ids)
}

pub async fn store_embedding(pool: &SqlitePool, chunk_id: i64, vector: &[f32]) -> Result<()> {
    sqlx::query("UPDATE chunks SET embedding = ? WHERE chunk_id = ?")
        .bind(vec_to_blob(vector))
        .bind(chunk_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_chunk(pool: &SqlitePool, chunk_id: i64) -> Result<Option<ChunkRecord>> {
    let row = sqlx::query(
        "SELECT chunk_id, file_id, chunk_index, text, embedding FROM chunks WHERE chunk_id = ?",
    )
    .bind(chunk_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let blob: Option<Vec<u8>> = row.get("embedding");
        ChunkRecord {
            chunk_id: row.get("chunk_id"),
            file_id: row.get("file_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            embedding: blob.map(|b| blob_to_vec(&b)),
        }
    }))
}

pub async fn chunks_for_file(pool: &SqlitePool, file_id: i64) -> Result<Vec<ChunkRecord>> {
    let rows = sqlx::query(
        "SELECT chunk_id, file_id, chunk_index, text, embedding
         FROM chunks WHERE file_id = ? ORDER BY chunk_index",
    )
    .bind(file_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let blob: Option<Vec<u8>> = row.get("embedding");
            ChunkRecord {
                chunk_id: row.get("chunk_id"),
                file_id: row.get("file_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                embedding: blob.map(|b| blob_to_vec(&b)),
            }
        })
        .collect())
}

/// Every stored embedding, in ascending chunk-id order. This fixed order is
/// what the index build records as its position mapping, and the rebuild is
/// the only bulk read of embeddings off disk.
///
/// Chunks of `failed` files are excluded: a file that failed partway
/// through embedding may have a partial set stored, and those must never
/// become retrievable.
pub async fn all_embeddings(pool: &SqlitePool) -> Result<Vec<(i64, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT c.chunk_id, c.embedding
         FROM chunks c
         JOIN files f ON f.file_id = c.file_id
         WHERE c.embedding IS NOT NULL AND f.status != 'failed'
         ORDER BY c.chunk_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            (row.get::<i64, _>("chunk_id"), blob_to_vec(&blob))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_and_reader_hashes_agree() {
        let data = vec![7u8; 200_000];
        let from_slice = content_hash(&data);
        let from_reader = content_hash_reader(data.as_slice()).unwrap();
        assert_eq!(from_slice, from_reader);
    }

    #[test]
    fn hash_is_content_only() {
        assert_eq!(content_hash(b"same bytes"), content_hash(b"same bytes"));
        assert_ne!(content_hash(b"same bytes"), content_hash(b"other bytes"));
    }

    #[test]
    fn empty_input_hashes() {
        // SHA-256 of the empty stream.
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
