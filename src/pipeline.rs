//! Ingestion pipeline orchestration.
//!
//! Sequences ledger → extraction → chunking → embedding → entity linking
//! for each file, then drives index rebuilds. Files are processed
//! sequentially; per-file failures are recorded and skipped, never fatal
//! to the run. All oracles are constructed by the caller and handed in —
//! the pipeline holds no hidden global state.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::chunk;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::entity::EntityLinker;
use crate::error::Result;
use crate::index::{shared_index, IndexBuilder, RebuildOutcome, SharedIndex};
use crate::ledger::{self, IngestOutcome};
use crate::models::{FileStatus, SourceFile};
use crate::oracle::{EntityRecognizer, SentenceSplitter, TextExtractor};
use crate::retrieve::Retriever;

/// Per-file result of one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Identical content already in the ledger; nothing was done.
    Skipped { file_id: i64 },
    /// Extraction or embedding failed; the file is parked at `failed`.
    Failed { file_id: i64 },
    Ingested {
        file_id: i64,
        chunks: usize,
        entity_links: usize,
    },
}

/// Tally for a batch ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
    pub entity_links: usize,
}

pub struct Pipeline {
    pool: SqlitePool,
    config: Config,
    extractor: Arc<dyn TextExtractor>,
    splitter: Arc<dyn SentenceSplitter>,
    embedder: Arc<dyn Embedder>,
    linker: EntityLinker,
    shared: SharedIndex,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        config: Config,
        extractor: Arc<dyn TextExtractor>,
        splitter: Arc<dyn SentenceSplitter>,
        embedder: Arc<dyn Embedder>,
        recognizer: Arc<dyn EntityRecognizer>,
    ) -> Self {
        let linker = EntityLinker::new(pool.clone(), recognizer);
        Self {
            pool,
            config,
            extractor,
            splitter,
            embedder,
            linker,
            shared: shared_index(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ingest one candidate file end to end (everything except the index
    /// rebuild, which is batched across files).
    pub async fn ingest_file(
        &self,
        path: &str,
        bytes: &[u8],
        mtime: Option<i64>,
    ) -> Result<FileOutcome> {
        let file_id = match ledger::ingest_candidate(&self.pool, path, bytes, mtime).await? {
            IngestOutcome::Skipped { file_id } => {
                return Ok(FileOutcome::Skipped { file_id });
            }
            IngestOutcome::Accepted { file_id } => file_id,
        };

        let text = match self.extractor.extract(path, bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path, file_id, error = %e, "extraction failed, skipping file");
                ledger::set_status(&self.pool, file_id, FileStatus::Failed).await?;
                return Ok(FileOutcome::Failed { file_id });
            }
        };
        ledger::mark_extracted(&self.pool, file_id, &text).await?;

        let chunk_texts = chunk::split(
            self.splitter.as_ref(),
            &text,
            self.config.chunking.target_chars,
            self.config.chunking.overlap_sentences,
        )?;

        if chunk_texts.is_empty() {
            // Empty extraction is not an error: the file is tracked with an
            // empty chunk set and becomes indexed at the next rebuild.
            ledger::set_status(&self.pool, file_id, FileStatus::Chunked).await?;
            tracing::info!(path, file_id, "no text content, recorded with zero chunks");
            return Ok(FileOutcome::Ingested {
                file_id,
                chunks: 0,
                entity_links: 0,
            });
        }

        let chunk_ids = ledger::insert_chunks(&self.pool, file_id, &chunk_texts).await?;
        ledger::set_status(&self.pool, file_id, FileStatus::Chunked).await?;

        // Embed in provider-sized batches; a failure here parks the file
        // like an extraction failure, the run continues.
        let batch_size = self.config.embedding.batch_size.max(1);
        for (ids, texts) in chunk_ids
            .chunks(batch_size)
            .zip(chunk_texts.chunks(batch_size))
        {
            let vectors = match self.embedder.embed(texts).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    tracing::warn!(path, file_id, error = %e, "embedding failed, skipping file");
                    ledger::set_status(&self.pool, file_id, FileStatus::Failed).await?;
                    return Ok(FileOutcome::Failed { file_id });
                }
            };
            if vectors.len() != texts.len() {
                tracing::warn!(
                    path,
                    file_id,
                    requested = texts.len(),
                    returned = vectors.len(),
                    "embedding batch came back short, skipping file"
                );
                ledger::set_status(&self.pool, file_id, FileStatus::Failed).await?;
                return Ok(FileOutcome::Failed { file_id });
            }
            for (chunk_id, vector) in ids.iter().zip(vectors.iter()) {
                ledger::store_embedding(&self.pool, *chunk_id, vector).await?;
            }
        }

        let mut entity_links = 0usize;
        for (chunk_id, chunk_text) in chunk_ids.iter().zip(chunk_texts.iter()) {
            entity_links += self.linker.link(*chunk_id, chunk_text).await?;
        }

        tracing::info!(
            path,
            file_id,
            chunks = chunk_ids.len(),
            entity_links,
            "file ingested"
        );
        Ok(FileOutcome::Ingested {
            file_id,
            chunks: chunk_ids.len(),
            entity_links,
        })
    }

    /// Ingest a batch sequentially: one file fully commits before the next
    /// starts. Returns the run tally.
    pub async fn ingest_batch(&self, files: &[SourceFile]) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for file in files {
            match self.ingest_file(&file.path, &file.bytes, file.mtime).await? {
                FileOutcome::Skipped { .. } => stats.skipped += 1,
                FileOutcome::Failed { .. } => stats.failed += 1,
                FileOutcome::Ingested {
                    chunks,
                    entity_links,
                    ..
                } => {
                    stats.accepted += 1;
                    stats.chunks += chunks;
                    stats.entity_links += entity_links;
                }
            }
        }

        tracing::info!(
            accepted = stats.accepted,
            skipped = stats.skipped,
            failed = stats.failed,
            chunks = stats.chunks,
            "ingestion run complete"
        );
        Ok(stats)
    }

    /// Full-corpus index rebuild: every stored embedding is read back,
    /// normalized, and inserted in chunk-id order; the finished epoch is
    /// swapped in atomically. Files that have completed chunking advance to
    /// `indexed`, including zero-chunk files.
    pub async fn rebuild_index(&self) -> Result<RebuildOutcome> {
        let embeddings = ledger::all_embeddings(&self.pool).await?;
        let builder = IndexBuilder::new(
            self.pool.clone(),
            self.config.index.artifact_path.clone(),
            Arc::clone(&self.shared),
        );
        let outcome = builder.rebuild(&embeddings).await?;

        sqlx::query("UPDATE files SET status = 'indexed' WHERE status = 'chunked'")
            .execute(&self.pool)
            .await?;

        Ok(outcome)
    }

    /// Restore the persisted epoch (artifact + mapping) after a restart.
    /// Returns whether a consistent epoch was published.
    pub async fn load_index(&self) -> Result<bool> {
        let builder = IndexBuilder::new(
            self.pool.clone(),
            self.config.index.artifact_path.clone(),
            Arc::clone(&self.shared),
        );
        builder.load_epoch().await
    }

    /// A retriever sharing this pipeline's published epoch slot: it
    /// observes rebuilds atomically.
    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.pool.clone(), Arc::clone(&self.shared))
    }
}
