//! External collaborator contracts.
//!
//! Text extraction, sentence segmentation, and entity recognition are
//! consumed as black-box capabilities: the pipeline owns the handles and
//! passes them into each component call. Baseline implementations good
//! enough for plain text live here; real deployments swap in format-aware
//! extractors and model-backed recognizers behind the same traits.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// One recognized mention: `(text, label)` plus char offsets into the
/// analyzed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Per-format text extraction. Failures are per-file: the pipeline marks
/// the file failed and moves on, never aborting the run.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &str, bytes: &[u8]) -> Result<String>;
}

/// Sentence boundary segmentation. The chunker never splits mid-sentence.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Named-entity recognition over one chunk's text.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>>;
}

/// Treats bytes as UTF-8 text; rejects input that is not valid UTF-8.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &str, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Extraction(format!("{path}: not valid UTF-8: {e}")))
    }
}

/// Splits on `.`, `!`, `?` followed by whitespace (or end of input),
/// keeping the terminator with its sentence. A trailing run without a
/// terminator counts as a final sentence.
pub struct PunctuationSplitter;

impl SentenceSplitter for PunctuationSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }

        let tail = current.trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }

        sentences
    }
}

/// Dictionary-backed recognizer: reports every occurrence of each
/// configured `(term, label)` pair, with char offsets. Useful as a test
/// double and for fixed-vocabulary corpora.
pub struct KeywordRecognizer {
    terms: Vec<(String, String)>,
}

impl KeywordRecognizer {
    pub fn new(terms: Vec<(String, String)>) -> Self {
        Self { terms }
    }
}

#[async_trait]
impl EntityRecognizer for KeywordRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let mut spans = Vec::new();
        for (term, label) in &self.terms {
            if term.is_empty() {
                continue;
            }
            for (byte_start, matched) in text.match_indices(term.as_str()) {
                // match_indices yields byte offsets; spans carry char offsets.
                let start = text[..byte_start].chars().count();
                let end = start + matched.chars().count();
                spans.push(EntitySpan {
                    text: matched.to_string(),
                    label: label.clone(),
                    start,
                    end,
                });
            }
        }
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_keeps_terminators() {
        let s = PunctuationSplitter.split("One. Two! Three?");
        assert_eq!(s, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn splitter_unterminated_tail() {
        let s = PunctuationSplitter.split("First sentence. trailing words");
        assert_eq!(s, vec!["First sentence.", "trailing words"]);
    }

    #[test]
    fn splitter_abbreviation_like_dot_inside_token_not_split() {
        // A dot not followed by whitespace stays inside the sentence.
        let s = PunctuationSplitter.split("See v1.2 for details. Done.");
        assert_eq!(s, vec!["See v1.2 for details.", "Done."]);
    }

    #[test]
    fn splitter_empty_input() {
        assert!(PunctuationSplitter.split("").is_empty());
        assert!(PunctuationSplitter.split("   \n ").is_empty());
    }

    #[test]
    fn plain_text_extractor_rejects_invalid_utf8() {
        let err = PlainTextExtractor.extract("a.bin", &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn keyword_recognizer_char_offsets() {
        let rec = KeywordRecognizer::new(vec![("Åre".to_string(), "LOC".to_string())]);
        // "Åre" after a two-char prefix; byte offsets would differ.
        let spans = rec.recognize("i Åre").await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 2);
        assert_eq!(spans[0].end, 5);
    }
}
