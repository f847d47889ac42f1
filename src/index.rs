//! Flat vector index: exhaustive exact nearest-neighbor over unit vectors.
//!
//! A rebuild scans the whole corpus, normalizes every embedding, and
//! produces one *epoch*: a [`FlatIndex`] plus the position→chunk mapping
//! born in the same pass. The pair is published atomically — new index and
//! mapping are built off to the side, the artifact lands via temp-file +
//! rename, the mapping table is cleared and rewritten in one transaction,
//! and only then is the shared `Arc` swapped. A concurrent reader sees
//! epoch N or epoch N+1 in full, never a mix.
//!
//! Artifact layout (little-endian):
//!   magic `CDIX` (4) | version u16 | epoch len u16 | epoch bytes |
//!   dims u32 | count u32 | count × dims × f32

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::embedding::l2_normalize;
use crate::error::{Error, Result};

pub const ARTIFACT_MAGIC: [u8; 4] = *b"CDIX";
pub const ARTIFACT_VERSION: u16 = 1;

/// Exhaustive, exact similarity index over unit-normalized vectors.
///
/// Stores vectors row-major in insertion order; that order *is* the
/// position identity the mapping refers to.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dims: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.vectors.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an already-normalized vector. Caller guarantees the length.
    pub fn push(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dims);
        self.vectors.extend_from_slice(vector);
    }

    pub fn vector_at(&self, position: usize) -> &[f32] {
        let start = position * self.dims;
        &self.vectors[start..start + self.dims]
    }

    /// The `k` nearest positions by Euclidean distance, ascending. Ties
    /// keep insertion order (stable sort over positions in order), which is
    /// the only tie-break callers may rely on.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|pos| {
                let d2: f32 = self
                    .vector_at(pos)
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (pos, d2.sqrt())
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// One complete, mutually consistent (index, mapping) generation.
#[derive(Debug)]
pub struct IndexEpoch {
    pub epoch: String,
    pub index: FlatIndex,
    /// Position i holds the chunk id inserted at position i.
    pub mapping: Vec<i64>,
}

/// The single published reference readers resolve. `None` until a build
/// has completed or been loaded.
pub type SharedIndex = Arc<RwLock<Option<Arc<IndexEpoch>>>>;

pub fn shared_index() -> SharedIndex {
    Arc::new(RwLock::new(None))
}

fn read_slot(shared: &SharedIndex) -> Option<Arc<IndexEpoch>> {
    shared
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .map(Arc::clone)
}

pub(crate) fn current_epoch(shared: &SharedIndex) -> Option<Arc<IndexEpoch>> {
    read_slot(shared)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built { epoch: String, vectors: usize },
    /// Empty corpus: nothing written, previous epoch (if any) left as-is.
    Empty,
}

/// Builds index epochs from the full set of stored embeddings and owns the
/// publish step.
pub struct IndexBuilder {
    pool: SqlitePool,
    artifact_path: PathBuf,
    shared: SharedIndex,
}

impl IndexBuilder {
    pub fn new(pool: SqlitePool, artifact_path: PathBuf, shared: SharedIndex) -> Self {
        Self {
            pool,
            artifact_path,
            shared,
        }
    }

    /// Rebuild from `(chunk_id, vector)` pairs in caller-determined order.
    ///
    /// Fails with [`Error::DimensionMismatch`] before any write if the
    /// vectors do not share one dimension. On success the previous epoch is
    /// replaced wholesale.
    pub async fn rebuild(&self, embeddings: &[(i64, Vec<f32>)]) -> Result<RebuildOutcome> {
        if embeddings.is_empty() {
            tracing::info!("index rebuild: no embeddings in corpus, nothing to build");
            return Ok(RebuildOutcome::Empty);
        }

        let dims = embeddings[0].1.len();
        if dims == 0 {
            return Err(Error::Embedding("zero-dimension embedding".to_string()));
        }
        for (chunk_id, vector) in embeddings {
            if vector.len() != dims {
                tracing::warn!(
                    chunk_id,
                    expected = dims,
                    actual = vector.len(),
                    "dimension mismatch, aborting rebuild"
                );
                return Err(Error::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                });
            }
        }

        let mut index = FlatIndex::new(dims);
        let mut mapping = Vec::with_capacity(embeddings.len());
        for (chunk_id, vector) in embeddings {
            index.push(&l2_normalize(vector));
            mapping.push(*chunk_id);
        }

        let epoch = Uuid::new_v4().to_string();
        write_artifact(&self.artifact_path, &epoch, &index)?;

        // Mapping and meta change together or not at all.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_map").execute(&mut *tx).await?;
        for (position, chunk_id) in mapping.iter().enumerate() {
            sqlx::query("INSERT INTO index_map (position, chunk_id) VALUES (?, ?)")
                .bind(position as i64)
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            r#"
            INSERT INTO index_meta (id, epoch, dims, vector_count, built_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                epoch = excluded.epoch,
                dims = excluded.dims,
                vector_count = excluded.vector_count,
                built_at = excluded.built_at
            "#,
        )
        .bind(&epoch)
        .bind(dims as i64)
        .bind(mapping.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let vectors = mapping.len();
        let published = Arc::new(IndexEpoch {
            epoch: epoch.clone(),
            index,
            mapping,
        });
        *self.shared.write().unwrap_or_else(|e| e.into_inner()) = Some(published);

        tracing::info!(epoch = %epoch, vectors, dims, "index rebuilt");
        Ok(RebuildOutcome::Built { epoch, vectors })
    }

    /// Load the persisted epoch into the shared slot, if artifact, meta row,
    /// and mapping all describe the same build pass. Returns `false` (with a
    /// warning) when anything is absent or inconsistent — the slot is left
    /// unchanged and retrieval degrades to empty results.
    pub async fn load_epoch(&self) -> Result<bool> {
        let meta: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT epoch, dims, vector_count FROM index_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        let Some((meta_epoch, meta_dims, meta_count)) = meta else {
            tracing::warn!("no index epoch recorded in store");
            return Ok(false);
        };

        if !self.artifact_path.exists() {
            tracing::warn!(path = %self.artifact_path.display(), "index artifact missing");
            return Ok(false);
        }

        let (artifact_epoch, index) = match read_artifact(&self.artifact_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(error = %e, "index artifact unreadable, treating as missing");
                return Ok(false);
            }
        };

        let mapping: Vec<i64> =
            sqlx::query_scalar("SELECT chunk_id FROM index_map ORDER BY position")
                .fetch_all(&self.pool)
                .await?;

        let consistent = artifact_epoch == meta_epoch
            && index.dims() as i64 == meta_dims
            && index.len() as i64 == meta_count
            && mapping.len() as i64 == meta_count;

        if !consistent {
            tracing::warn!(
                artifact_epoch = %artifact_epoch,
                meta_epoch = %meta_epoch,
                "index artifact and mapping describe different epochs"
            );
            return Ok(false);
        }

        let published = Arc::new(IndexEpoch {
            epoch: meta_epoch,
            index,
            mapping,
        });
        *self.shared.write().unwrap_or_else(|e| e.into_inner()) = Some(published);
        Ok(true)
    }
}

/// Serialize to `<path>.tmp`, then atomically rename into place.
fn write_artifact(path: &Path, epoch: &str, index: &FlatIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut bytes = Vec::with_capacity(16 + epoch.len() + index.vectors.len() * 4);
    bytes.extend_from_slice(&ARTIFACT_MAGIC);
    bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(epoch.len() as u16).to_le_bytes());
    bytes.extend_from_slice(epoch.as_bytes());
    bytes.extend_from_slice(&(index.dims() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u32).to_le_bytes());
    for v in &index.vectors {
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read an artifact back; every structural violation is [`Error::IndexCorrupt`].
pub fn read_artifact(path: &Path) -> Result<(String, FlatIndex)> {
    let bytes = std::fs::read(path)?;
    let mut cursor = Cursor::new(&bytes);

    let magic = cursor.take_bytes(4)?;
    if magic != ARTIFACT_MAGIC {
        return Err(Error::IndexCorrupt("bad magic".to_string()));
    }
    let version = u16::from_le_bytes(cursor.take_array::<2>()?);
    if version != ARTIFACT_VERSION {
        return Err(Error::IndexCorrupt(format!(
            "unsupported version {version}"
        )));
    }

    let epoch_len = u16::from_le_bytes(cursor.take_array::<2>()?) as usize;
    let epoch_bytes = cursor.take_bytes(epoch_len)?;
    let epoch = std::str::from_utf8(epoch_bytes)
        .map_err(|_| Error::IndexCorrupt("epoch not UTF-8".to_string()))?
        .to_string();

    let dims = u32::from_le_bytes(cursor.take_array::<4>()?) as usize;
    let count = u32::from_le_bytes(cursor.take_array::<4>()?) as usize;

    let expected = dims
        .checked_mul(count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| Error::IndexCorrupt("vector section overflow".to_string()))?;
    let data = cursor.take_bytes(expected)?;
    if cursor.remaining() != 0 {
        return Err(Error::IndexCorrupt("trailing bytes".to_string()));
    }

    let mut index = FlatIndex::new(dims);
    index.vectors = data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok((epoch, index))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::IndexCorrupt("truncated artifact".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_normalize;
    use tempfile::TempDir;

    fn unit(v: &[f32]) -> Vec<f32> {
        l2_normalize(v)
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let mut index = FlatIndex::new(2);
        index.push(&unit(&[1.0, 0.0]));
        index.push(&unit(&[0.0, 1.0]));
        index.push(&unit(&[1.0, 0.2]));

        let hits = index.search(&unit(&[1.0, 0.0]), 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        let mut index = FlatIndex::new(2);
        index.push(&unit(&[1.0, 0.0]));
        index.push(&unit(&[0.0, 1.0]));
        let hits = index.search(&unit(&[1.0, 1.0]), 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = FlatIndex::new(2);
        let v = unit(&[1.0, 1.0]);
        index.push(&v);
        index.push(&v);
        index.push(&v);
        let hits = index.search(&unit(&[1.0, 0.0]), 3);
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = FlatIndex::new(3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn artifact_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corpus.cdix");

        let mut index = FlatIndex::new(3);
        index.push(&unit(&[1.0, 2.0, 3.0]));
        index.push(&unit(&[-1.0, 0.5, 0.0]));

        write_artifact(&path, "epoch-a", &index).unwrap();
        let (epoch, loaded) = read_artifact(&path).unwrap();
        assert_eq!(epoch, "epoch-a");
        assert_eq!(loaded.dims(), 3);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.vector_at(0), index.vector_at(0));
        assert_eq!(loaded.vector_at(1), index.vector_at(1));
    }

    #[test]
    fn artifact_bad_magic_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bogus.cdix");
        std::fs::write(&path, b"NOPE rest of file").unwrap();
        let err = read_artifact(&path).unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[test]
    fn artifact_truncated_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("short.cdix");

        let mut index = FlatIndex::new(4);
        index.push(&unit(&[1.0, 0.0, 0.0, 0.0]));
        write_artifact(&path, "epoch-b", &index).unwrap();

        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() - 3]).unwrap();
        let err = read_artifact(&path).unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }
}
