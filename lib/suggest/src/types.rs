use icdx_core::RetrievalMode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 5;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// A suggestion query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestRequest {
    pub note: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Overrides the service's default retrieval path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RetrievalMode>,
}

impl SuggestRequest {
    pub fn new(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            top_k: DEFAULT_TOP_K,
            mode: None,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// One suggested code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub code: String,
    pub title: String,
    pub description: String,
    /// Raw similarity of the retriever that produced the result
    pub confidence: f32,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub query: String,
    pub results: Vec<SuggestionResult>,
    /// Wall time of the request in whole milliseconds
    pub latency_ms: u64,
    /// Retrieval path that produced `confidence`
    pub retriever: RetrievalMode,
}
