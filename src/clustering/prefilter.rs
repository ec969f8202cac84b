use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::article::Article;
use crate::TARGET_PREFILTER;

use super::types::ArticleKey;

/// Minimum token length kept by the tokenizer.
const MIN_TOKEN_CHARS: usize = 2;

/// A cluster's current reference article as seen by the pre-filter.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    pub key: ArticleKey,
    pub article: &'a Article,
}

/// A reference lexically close enough to be sent to the judge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub reference: ArticleKey,
    pub similarity: f64,
}

/// Cheap TF-IDF cosine filter in front of the semantic judge.
#[derive(Debug, Clone, Copy)]
pub struct LexicalPrefilter {
    threshold: f64,
}

impl LexicalPrefilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the references whose similarity to `candidate` is at least the
    /// threshold, most similar first.
    ///
    /// The vector space is built over every reference text plus the candidate
    /// text, so it reflects the current reference set. References from the
    /// candidate's own document are never returned. Ties keep reference order.
    pub fn candidates(&self, candidate: &Article, references: &[Reference<'_>]) -> Vec<Candidate> {
        if references.is_empty() {
            return Vec::new();
        }

        let mut texts = Vec::with_capacity(references.len() + 1);
        texts.push(candidate.comparable_text());
        texts.extend(references.iter().map(|r| r.article.comparable_text()));

        let Some(space) = TfIdfSpace::build(&texts) else {
            debug!(
                target: TARGET_PREFILTER,
                "Empty vocabulary for {} against {} references, no candidates",
                candidate.label(), references.len()
            );
            return Vec::new();
        };

        if space.is_zero(0) {
            debug!(
                target: TARGET_PREFILTER,
                "No usable terms in {}, no candidates", candidate.label()
            );
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = references
            .iter()
            .enumerate()
            .filter(|(_, r)| r.article.document_name != candidate.document_name)
            .map(|(i, r)| Candidate {
                reference: r.key,
                similarity: space.cosine(0, i + 1),
            })
            .filter(|c| c.similarity >= self.threshold)
            .collect();

        // Stable sort, equal scores stay in cluster creation order
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        debug!(
            target: TARGET_PREFILTER,
            "{}: {} of {} references passed threshold {:.2}",
            candidate.label(), candidates.len(), references.len(), self.threshold
        );

        candidates
    }
}

/// Lowercased Unicode words of at least two characters, after NFKC
/// normalization.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    normalized
        .unicode_words()
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// L2-normalized sparse TF-IDF vectors for a small corpus.
///
/// Each vector is sorted by term index so that identical texts produce
/// bit-identical similarities.
struct TfIdfSpace {
    vectors: Vec<Vec<(usize, f64)>>,
}

impl TfIdfSpace {
    /// Returns `None` when no text yields a single token.
    fn build(texts: &[String]) -> Option<Self> {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        let mut term_counts: Vec<Vec<(usize, usize)>> = Vec::with_capacity(texts.len());

        for text in texts {
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for token in tokenize(text) {
                let next = vocabulary.len();
                let index = *vocabulary.entry(token).or_insert_with(|| {
                    doc_freq.push(0);
                    next
                });
                *counts.entry(index).or_insert(0) += 1;
            }
            let mut counts: Vec<(usize, usize)> = counts.into_iter().collect();
            counts.sort_unstable_by_key(|(index, _)| *index);
            for (index, _) in &counts {
                doc_freq[*index] += 1;
            }
            term_counts.push(counts);
        }

        if vocabulary.is_empty() {
            return None;
        }

        // Smoothed idf: ln((1 + n) / (1 + df)) + 1
        let n = texts.len() as f64;
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let vectors = term_counts
            .into_iter()
            .map(|counts| {
                let mut vector: Vec<(usize, f64)> = counts
                    .into_iter()
                    .map(|(index, count)| (index, count as f64 * idf[index]))
                    .collect();
                let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, weight) in vector.iter_mut() {
                        *weight /= norm;
                    }
                }
                vector
            })
            .collect();

        Some(Self { vectors })
    }

    fn is_zero(&self, doc: usize) -> bool {
        self.vectors[doc].is_empty()
    }

    fn cosine(&self, a: usize, b: usize) -> f64 {
        let (left, right) = (&self.vectors[a], &self.vectors[b]);
        let (mut i, mut j) = (0, 0);
        let mut dot = 0.0;
        while i < left.len() && j < right.len() {
            match left[i].0.cmp(&right[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    dot += left[i].1 * right[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot
    }
}
