//! Sentence-boundary text chunker.
//!
//! Splits extracted text into overlapping chunks that never break
//! mid-sentence. Sentences come from the [`SentenceSplitter`] oracle; this
//! module only decides where chunk seams fall. Whole sentences are
//! accumulated greedily until the chunk reaches `target_chars`, then the
//! chunk is closed and the next one is seeded with the trailing
//! `overlap_sentences` sentences to preserve context across the seam.

use crate::error::{Error, Result};
use crate::oracle::SentenceSplitter;

/// Split `text` into ordered chunk texts.
///
/// Degenerate inputs (empty or all-whitespace) yield an empty sequence.
/// `target_chars == 0` is a caller contract violation and is rejected, not
/// clamped. A final partial accumulation is emitted only if it contains at
/// least one sentence beyond the carried-over overlap seed.
pub fn split(
    splitter: &dyn SentenceSplitter,
    text: &str,
    target_chars: usize,
    overlap_sentences: usize,
) -> Result<Vec<String>> {
    if target_chars == 0 {
        return Err(Error::InvalidChunkParams(
            "target_chars must be > 0".to_string(),
        ));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let sentences = splitter.split(text);
    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    // True once `current` holds a sentence that is not pure overlap seed.
    let mut has_fresh = false;

    for sentence in sentences {
        current.push(sentence);
        has_fresh = true;

        if joined_len(&current) >= target_chars {
            let carry_from = current.len().saturating_sub(overlap_sentences);
            chunks.push(current.join(" "));
            let seed: Vec<String> = if overlap_sentences == 0 {
                Vec::new()
            } else {
                current[carry_from..].to_vec()
            };
            current = seed;
            has_fresh = false;
        }
    }

    if has_fresh && !current.is_empty() {
        chunks.push(current.join(" "));
    }

    Ok(chunks)
}

/// Char length of the sentences joined by single spaces.
fn joined_len(sentences: &[String]) -> usize {
    if sentences.is_empty() {
        return 0;
    }
    let chars: usize = sentences.iter().map(|s| s.chars().count()).sum();
    chars + sentences.len() - 1
}
