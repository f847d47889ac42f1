//! # Corpus Distiller
//!
//! A content-addressed ingestion ledger and exact vector retrieval core.
//!
//! Corpus Distiller ingests heterogeneous documents, splits extracted text
//! into sentence-aligned overlapping chunks, attaches embeddings and named
//! entities to those chunks, and serves ranked nearest-neighbor retrieval
//! over a flat (exhaustive, exact) vector index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────┐   ┌───────────────┐
//! │  bytes   │──▶│ Ledger → Chunk → Embed  │──▶│    SQLite     │
//! │ (caller) │   │        → Entities       │   │ + .cdix index │
//! └──────────┘   └─────────────────────────┘   └──────┬────────┘
//!                                                     │ epoch swap
//!                                              ┌──────▼────────┐
//!                                              │   Retriever   │
//!                                              └───────────────┘
//! ```
//!
//! Dedup is by SHA-256 of the full byte stream: re-ingesting identical
//! content from any path is a no-op. The vector index and its
//! position→chunk mapping are rebuilt wholesale and published as one
//! atomic epoch; readers never see a mixed generation.
//!
//! Format parsing, sentence segmentation, embedding, and entity
//! recognition are consumed as oracle traits ([`oracle`], [`embedding`])
//! owned by the caller and passed into [`pipeline::Pipeline`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ledger`] | Content-addressed dedup and chunk/embedding storage |
//! | [`chunk`] | Sentence-respecting overlap chunker |
//! | [`oracle`] | External collaborator traits |
//! | [`embedding`] | Embedder trait, HTTP provider, vector utilities |
//! | [`entity`] | Entity dedup and per-chunk mention links |
//! | [`index`] | Flat vector index, artifact codec, epoch publishing |
//! | [`retrieve`] | Ranked retrieval |
//! | [`pipeline`] | Ingestion orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod index;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod retrieve;

pub use error::{Error, Result};
