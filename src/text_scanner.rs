// =============================================================================
// text_scanner.rs — THE BUZZWORD DETECTOR
// =============================================================================
//
// This module answers one question per paragraph: "did they say AI?"
//
// 1. Aho-Corasick — one automaton holding every keyword, run once over the
//    lower-cased paragraph. We use overlapping search so that a paragraph
//    mentioning both "llms" and "machine learning" reports every keyword
//    it contains, and we keep the one with the lowest list index. Position
//    in the text does not matter; position in the keyword list does.
//
// 2. A word-count floor applied before classification. The segmenter is
//    generous about what it calls a paragraph, and a table cell reading
//    "Machine learning" is not a disclosure.
//
// 3. Rayon parallel iterators — a 10-K can produce thousands of paragraph
//    candidates, and every core gets a share.
// =============================================================================

use aho_corasick::{AhoCorasick, BuildError};
use rayon::prelude::*;
use tracing::debug;

/// A keyword matcher over a fixed, ordered keyword list.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
    automaton: AhoCorasick,
}

impl KeywordClassifier {
    /// Build the automaton. Keywords are lower-cased; empty entries are
    /// dropped, since an empty pattern matches everything.
    pub fn new<I, S>(keywords: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let automaton = AhoCorasick::new(&keywords)?;
        Ok(Self { keywords, automaton })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// The first keyword (in list order) that occurs anywhere in the
    /// paragraph as a case-insensitive substring, or `None`.
    pub fn classify(&self, paragraph: &str) -> Option<&str> {
        let lower = paragraph.to_lowercase();
        let mut best: Option<usize> = None;

        for m in self.automaton.find_overlapping_iter(&lower) {
            let idx = m.pattern().as_usize();
            if best.map_or(true, |b| idx < b) {
                best = Some(idx);
                if idx == 0 {
                    break;
                }
            }
        }

        best.map(|idx| self.keywords[idx].as_str())
    }

    /// Classify a batch of paragraph candidates in parallel. Candidates below
    /// the word floor are dropped before classification. Output keeps the
    /// input order.
    pub fn scan_paragraphs<'a>(
        &self,
        paragraphs: &'a [String],
        min_words: usize,
    ) -> Vec<(&'a str, &str)> {
        let hits: Vec<(&'a str, &str)> = paragraphs
            .par_iter()
            .filter(|p| meets_word_floor(p, min_words))
            .filter_map(|p| self.classify(p).map(|kw| (p.as_str(), kw)))
            .collect();

        debug!(
            candidates = paragraphs.len(),
            matches = hits.len(),
            "Paragraph scan complete"
        );
        hits
    }
}

/// Does the paragraph have at least `min_words` whitespace-separated words?
pub fn meets_word_floor(paragraph: &str, min_words: usize) -> bool {
    paragraph.split_whitespace().count() >= min_words
}
