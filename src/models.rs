//! Core data types for the ingestion ledger and retrieval pipeline.

use crate::error::{Error, Result};

/// Lifecycle state of an ingested file.
///
/// Normal progression is `New → Extracted → Chunked → Indexed`. Extraction
/// failures park the file at `Failed`; it is never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Extracted,
    Chunked,
    Indexed,
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Extracted => "extracted",
            FileStatus::Chunked => "chunked",
            FileStatus::Indexed => "indexed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(FileStatus::New),
            "extracted" => Ok(FileStatus::Extracted),
            "chunked" => Ok(FileStatus::Chunked),
            "indexed" => Ok(FileStatus::Indexed),
            "failed" => Ok(FileStatus::Failed),
            other => Err(Error::Config(format!("unknown file status: {other}"))),
        }
    }
}

/// One record per distinct file content, keyed by SHA-256 of the byte stream.
///
/// `path` is the first-seen canonical path and is not updated when the same
/// content reappears elsewhere.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_id: i64,
    pub content_hash: String,
    pub path: String,
    pub size_bytes: i64,
    pub mtime: Option<i64>,
    pub status: FileStatus,
    pub extracted_text: Option<String>,
}

/// A sentence-aligned slice of a file's extracted text; the unit of
/// embedding and retrieval. Ids are assigned monotonically by the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: i64,
    pub file_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// A globally deduplicated (text, label) entity. One row means "this string
/// with this label appears somewhere in the corpus", not one per mention.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity_id: i64,
    pub text: String,
    pub label: String,
}

/// Edge between an entity and a chunk, with char offsets into the chunk's
/// text for provenance. At most one per (entity, chunk) pair.
#[derive(Debug, Clone)]
pub struct EntityMention {
    pub entity_id: i64,
    pub chunk_id: i64,
    pub start_offset: i64,
    pub end_offset: i64,
}

/// Raw input handed to the pipeline by the (external) discovery layer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub bytes: Vec<u8>,
    pub mtime: Option<i64>,
}

/// A raw retrieval hit: index position resolved to a chunk id, with the
/// Euclidean distance between unit-normalized vectors (ascending = better).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub distance: f32,
}

/// A hit resolved against the store, in rank order.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub file_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub distance: f32,
}
