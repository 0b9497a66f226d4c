use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which retrieval path produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Cosine over TF-IDF vectors, scores in [0, 1]
    Lexical,
    /// Cosine over dense embeddings via HNSW, scores in [-1, 1]
    Vector,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Lexical => "lexical",
            RetrievalMode::Vector => "vector",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" | "tfidf" => Ok(RetrievalMode::Lexical),
            "vector" | "dense" => Ok(RetrievalMode::Vector),
            other => Err(format!("unknown retrieval mode '{}', expected 'lexical' or 'vector'", other)),
        }
    }
}

/// A scored catalog entry, before metadata and rationale are attached
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub code: String,
    /// Catalog row, used as the tie-break key
    pub row: usize,
    pub similarity: f32,
}

/// A query-time retrieval path over a loaded catalog
pub trait Retriever: Send + Sync {
    fn mode(&self) -> RetrievalMode;

    /// Return at most `top_k` candidates ordered by non-increasing similarity.
    /// `top_k` must be at least 1.
    fn retrieve(&self, note: &str, top_k: usize) -> Result<Vec<Candidate>>;
}

pub(crate) fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(crate::Error::InvalidInput("top_k must be at least 1".into()));
    }
    Ok(())
}
