use crate::error::{ChatError, Result};
use crate::utils::read_optional_bytes;
use crate::vector_db::{Filter, Metadata, VectorDB};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

pub const ANSWER_MARKER: &str = "A: ";
const QUESTION_KEY: &str = "question";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    /// Text indexed for semantic search and injected as context.
    pub fn formatted(&self) -> String {
        format!("Q: {}\n{}{}", self.question, ANSWER_MARKER, self.answer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Deserialize)]
struct Record {
    messages: Vec<RecordMessage>,
}

#[derive(Deserialize)]
struct RecordMessage {
    content: String,
}

/// Curated question/answer pairs with an exact-match fast path and a
/// semantic index over the formatted `Q:`/`A:` text. Read-only once built.
pub struct KnowledgeStore {
    entries: Vec<KnowledgeEntry>,
    index: VectorDB,
}

impl KnowledgeStore {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            index: VectorDB::new(),
        }
    }

    /// Loads a JSONL knowledge base. A missing or unreadable file yields an
    /// empty store; the caller then runs in generation-only mode.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match read_optional_bytes(path) {
            Ok(Some(data)) => {
                let store = Self::from_jsonl(&data);
                info!(path = %path.display(), entries = store.len(), "Knowledge base loaded");
                store
            }
            Ok(None) => {
                warn!(path = %path.display(), "Knowledge base not found; answering from generation only");
                Self::empty()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read knowledge base; answering from generation only");
                Self::empty()
            }
        }
    }

    /// Parses one record per line. Lines are decoded individually so a bad
    /// line only loses its own record. Entry ids are zero-based line
    /// positions, so skipped lines leave gaps rather than shifting later ids.
    pub fn from_jsonl(data: &[u8]) -> Self {
        let mut entries = Vec::new();

        for (idx, line) in data.split(|&b| b == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.trim_ascii().is_empty() {
                continue;
            }
            match parse_record(line) {
                Ok((question, answer)) => entries.push(KnowledgeEntry {
                    id: idx.to_string(),
                    question,
                    answer,
                }),
                Err(e) => warn!(line = idx + 1, error = %e, "Skipping knowledge record"),
            }
        }

        match Self::from_entries(entries) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Failed to index knowledge base; answering from generation only");
                Self::empty()
            }
        }
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Result<Self> {
        let mut index = VectorDB::new();
        index.add(
            entries.iter().map(|e| e.id.clone()).collect(),
            entries.iter().map(KnowledgeEntry::formatted).collect(),
            entries
                .iter()
                .map(|e| Metadata::from([(QUESTION_KEY.to_string(), e.question.clone())]))
                .collect(),
        )?;
        Ok(Self { entries, index })
    }

    #[cfg(test)]
    pub(crate) fn from_index(entries: Vec<KnowledgeEntry>, index: VectorDB) -> Self {
        Self { entries, index }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Byte-for-byte question lookup. No case or whitespace normalisation.
    pub fn exact_match(&self, question: &str) -> Option<String> {
        let filter = Filter::equals(QUESTION_KEY, question);
        let hit = self.index.query(question, 1, Some(&filter)).into_iter().next()?;

        let answer = extract_answer(&hit.document.content, question);
        if answer.is_none() {
            debug!(id = %hit.document.id, "Exact match lacks answer marker; falling through");
        }
        answer
    }

    pub fn semantic_search(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        self.index
            .query(query, k, None)
            .into_iter()
            .map(|scored| RetrievalHit {
                id: scored.document.id.clone(),
                text: scored.document.content.clone(),
                score: scored.score,
            })
            .collect()
    }
}

fn parse_record(line: &[u8]) -> Result<(String, String)> {
    let line = std::str::from_utf8(line)
        .map_err(|e| ChatError::InvalidRecord(format!("invalid UTF-8: {e}")))?;
    let record: Record = serde_json::from_str(line)?;
    let mut messages = record.messages.into_iter();
    let (Some(question), Some(answer)) = (messages.next(), messages.next()) else {
        return Err(ChatError::InvalidRecord("fewer than two messages".to_string()));
    };
    if question.content.trim().is_empty() || answer.content.trim().is_empty() {
        return Err(ChatError::InvalidRecord("empty question or answer".to_string()));
    }
    Ok((question.content, answer.content))
}

fn extract_answer(content: &str, question: &str) -> Option<String> {
    let answer = content
        .strip_prefix("Q: ")?
        .strip_prefix(question)?
        .strip_prefix('\n')?
        .strip_prefix(ANSWER_MARKER)?
        .trim();
    (!answer.is_empty()).then(|| answer.to_string())
}
