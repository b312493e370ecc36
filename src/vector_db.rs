use crate::error::{ChatError, Result};
use lazy_static::lazy_static;
use ndarray::Array1;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

pub type Metadata = BTreeMap<String, String>;

lazy_static! {
    static ref STOP_WORDS: FxHashSet<&'static str> = {
        let words = vec![
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from",
            "has", "he", "in", "is", "it", "its", "of", "on", "that", "the",
            "to", "was", "were", "will", "with"
        ];
        words.into_iter().collect()
    };
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").expect("static regex is valid");
}

/// Metadata predicate applied before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals { key: String, value: String },
}

impl Filter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Equals { key, value } => metadata.get(key) == Some(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Array1<f32>,
    term_freq: FxHashMap<String, f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredDocument<'a> {
    pub document: &'a Document,
    pub score: f32,
}

/// In-memory TF-IDF index. Every batch insert recomputes the IDF table and all
/// stored embeddings so document and query vectors share one vocabulary.
#[derive(Default)]
pub struct VectorDB {
    documents: Vec<Document>,
    ids: FxHashSet<String>,
    vocabulary: FxHashMap<String, usize>,
    idf_values: FxHashMap<String, f32>,
}

impl VectorDB {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Inserts a batch. The batch is rejected as a whole if the sequences differ
    /// in length or any id is already present.
    pub fn add(
        &mut self,
        ids: Vec<String>,
        contents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()> {
        if ids.len() != contents.len() || ids.len() != metadatas.len() {
            return Err(ChatError::Index(format!(
                "batch length mismatch: {} ids, {} contents, {} metadatas",
                ids.len(),
                contents.len(),
                metadatas.len()
            )));
        }

        let mut batch_ids = FxHashSet::default();
        for id in &ids {
            if self.ids.contains(id) || !batch_ids.insert(id.as_str()) {
                return Err(ChatError::Index(format!("duplicate document id '{id}'")));
            }
        }

        for ((id, content), metadata) in ids.into_iter().zip(contents).zip(metadatas) {
            let tokens = tokenize(&content);
            for token in &tokens {
                let next = self.vocabulary.len();
                self.vocabulary.entry(token.clone()).or_insert(next);
            }

            self.ids.insert(id.clone());
            self.documents.push(Document {
                id,
                content,
                metadata,
                embedding: Array1::zeros(0),
                term_freq: term_frequencies(&tokens),
            });
        }

        self.reindex();
        Ok(())
    }

    /// Ranks documents passing `filter` by cosine similarity to `text`,
    /// descending, ties broken by ascending id.
    pub fn query(&self, text: &str, k: usize, filter: Option<&Filter>) -> Vec<ScoredDocument<'_>> {
        if k == 0 || self.documents.is_empty() {
            return Vec::new();
        }

        let query_embedding = self.embed(&term_frequencies(&tokenize(text)));

        let mut similarities: Vec<ScoredDocument<'_>> = self
            .documents
            .iter()
            .filter(|doc| filter.map_or(true, |f| f.matches(&doc.metadata)))
            .map(|doc| ScoredDocument {
                document: doc,
                score: cosine_similarity(&doc.embedding, &query_embedding),
            })
            .collect();

        similarities.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| compare_ids(&a.document.id, &b.document.id))
        });
        similarities.truncate(k);
        similarities
    }

    fn reindex(&mut self) {
        let doc_count = self.documents.len() as f32;

        for term in self.vocabulary.keys() {
            let doc_freq = self
                .documents
                .iter()
                .filter(|doc| doc.term_freq.contains_key(term))
                .count() as f32;

            let idf = (1.0 + doc_count / (1.0 + doc_freq)).ln();
            self.idf_values.insert(term.clone(), idf);
        }

        let embeddings: Vec<Array1<f32>> = self
            .documents
            .iter()
            .map(|doc| self.embed(&doc.term_freq))
            .collect();
        for (doc, embedding) in self.documents.iter_mut().zip(embeddings) {
            doc.embedding = embedding;
        }
    }

    fn embed(&self, term_freq: &FxHashMap<String, f32>) -> Array1<f32> {
        let mut tfidf = Array1::zeros(self.vocabulary.len());

        for (term, tf) in term_freq {
            if let (Some(&i), Some(idf)) = (self.vocabulary.get(term), self.idf_values.get(term)) {
                tfidf[i] = tf * idf;
            }
        }

        tfidf
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let text = text.nfc().collect::<String>().to_lowercase();
    let text = PUNCTUATION.replace_all(&text, " ");

    text.split_whitespace()
        .filter(|&token| !STOP_WORDS.contains(token))
        .map(|token| token.to_string())
        .collect()
}

fn term_frequencies(tokens: &[String]) -> FxHashMap<String, f32> {
    let mut term_freq = FxHashMap::default();
    if tokens.is_empty() {
        return term_freq;
    }

    for token in tokens {
        *term_freq.entry(token.clone()).or_insert(0.0) += 1.0;
    }

    let tokens_count = tokens.len() as f32;
    for freq in term_freq.values_mut() {
        *freq /= tokens_count;
    }

    term_freq
}

fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Numeric order for positional ids, byte order otherwise.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
