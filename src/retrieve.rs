//! Ranked nearest-neighbor retrieval.
//!
//! Resolves against whichever epoch is currently published. Retrieval never
//! mutates the store and never observes a half-swapped epoch: index and
//! mapping travel together behind one `Arc`.

use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::index::{current_epoch, SharedIndex};
use crate::ledger;
use crate::models::{ScoredChunk, SearchHit};

pub struct Retriever {
    pool: SqlitePool,
    shared: SharedIndex,
}

impl Retriever {
    pub fn new(pool: SqlitePool, shared: SharedIndex) -> Self {
        Self { pool, shared }
    }

    /// The `top_k` nearest chunks for an already-embedded query, best first
    /// (ascending distance; ties keep the index's insertion order).
    ///
    /// No index built yet → empty result with a warning, not an error.
    /// Positions without a mapping entry are dropped, so the result may be
    /// shorter than `top_k`.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let Some(epoch) = current_epoch(&self.shared) else {
            tracing::warn!("no vector index available, returning empty result");
            return Ok(Vec::new());
        };

        if query_vector.len() != epoch.index.dims() {
            return Err(Error::DimensionMismatch {
                expected: epoch.index.dims(),
                actual: query_vector.len(),
            });
        }

        let query = crate::embedding::l2_normalize(query_vector);
        let hits = epoch
            .index
            .search(&query, top_k)
            .into_iter()
            .filter_map(|(position, distance)| {
                epoch
                    .mapping
                    .get(position)
                    .map(|&chunk_id| SearchHit { chunk_id, distance })
            })
            .collect();

        Ok(hits)
    }

    /// Resolve hits to chunk records, preserving rank order exactly. A hit
    /// whose chunk no longer exists in the store is silently dropped.
    pub async fn resolve(&self, hits: &[SearchHit]) -> Result<Vec<ScoredChunk>> {
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(chunk) = ledger::get_chunk(&self.pool, hit.chunk_id).await? {
                out.push(ScoredChunk {
                    chunk_id: chunk.chunk_id,
                    file_id: chunk.file_id,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                    distance: hit.distance,
                });
            } else {
                tracing::debug!(chunk_id = hit.chunk_id, "hit resolves to no chunk, dropped");
            }
        }
        Ok(out)
    }

    /// Search and resolve in one call.
    pub async fn search_chunks(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let hits = self.search(query_vector, top_k)?;
        self.resolve(&hits).await
    }
}
