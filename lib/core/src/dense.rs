//! Dense vector retrieval over an HNSW graph of catalog embeddings.

use crate::catalog::CatalogMetadata;
use crate::embedder::{EmbeddingModel, TextEmbedder};
use crate::hnsw::{HnswIndex, HnswParams};
use crate::retriever::{check_top_k, Candidate, RetrievalMode, Retriever};
use crate::vector::Vector;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// HNSW graph over the embeddings of catalog entries, in catalog order.
pub struct VectorIndex {
    model: EmbeddingModel,
    hnsw: HnswIndex,
    orphans_dropped: usize,
}

impl VectorIndex {
    /// Build the graph from `(code, embedding)` pairs.
    ///
    /// Pairs are inserted in catalog row order regardless of input order, so
    /// the graph only depends on catalog content. Embeddings for codes that are
    /// not in `metadata` are dropped and can never be returned.
    pub fn build(
        model: EmbeddingModel,
        embeddings: Vec<(String, Vector)>,
        metadata: &CatalogMetadata,
        params: HnswParams,
    ) -> Result<Self> {
        let total = embeddings.len();
        let mut by_row: Vec<(usize, String, Vector)> = embeddings
            .into_iter()
            .filter_map(|(code, vector)| metadata.row_of(&code).map(|row| (row, code, vector)))
            .collect();
        by_row.sort_by_key(|(row, _, _)| *row);
        by_row.dedup_by_key(|(row, _, _)| *row);

        let orphans_dropped = total - by_row.len();
        if orphans_dropped > 0 {
            warn!(orphans = orphans_dropped, "dropping embeddings with no catalog entry");
        }

        let mut hnsw = HnswIndex::new(model.dim(), params);
        for (_, code, vector) in by_row {
            hnsw.insert(code, &vector.normalized())?;
        }

        Ok(Self {
            model,
            hnsw,
            orphans_dropped,
        })
    }

    #[inline]
    pub fn model(&self) -> EmbeddingModel {
        self.model
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.hnsw.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hnsw.is_empty()
    }

    #[inline]
    pub fn orphans_dropped(&self) -> usize {
        self.orphans_dropped
    }

    pub fn contains(&self, code: &str) -> bool {
        self.hnsw.contains(code)
    }

    pub fn search(&self, query: &Vector, k: usize) -> Vec<(&str, f32)> {
        self.hnsw.search(query, k, None)
    }
}

/// Why the vector path cannot serve queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// No embedding store was built or it could not be opened
    StoreUnavailable(String),
    /// The configured embedding model cannot embed queries for this index
    ModelUnavailable(String),
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::StoreUnavailable(msg) => write!(f, "vector store unavailable: {}", msg),
            DegradedReason::ModelUnavailable(msg) => write!(f, "embedding model unavailable: {}", msg),
        }
    }
}

enum VectorBackend {
    Ready {
        embedder: Arc<dyn TextEmbedder>,
        index: VectorIndex,
    },
    Unavailable(DegradedReason),
}

/// Query-time vector retrieval. Degrades to empty results when its
/// embedder or index is missing instead of failing the request.
pub struct VectorRetriever {
    backend: VectorBackend,
    metadata_rows: Arc<CatalogMetadata>,
}

impl VectorRetriever {
    /// Pair an index with the embedder used at query time.
    ///
    /// A model mismatch between the two leaves the retriever degraded, since
    /// query and catalog vectors would live in different spaces.
    pub fn new(embedder: Arc<dyn TextEmbedder>, index: VectorIndex, metadata: Arc<CatalogMetadata>) -> Self {
        if embedder.model() != index.model() {
            let reason = DegradedReason::ModelUnavailable(format!(
                "index was built with {}, query embedder is {}",
                index.model(),
                embedder.model()
            ));
            warn!(%reason, "vector retrieval disabled");
            return Self::unavailable(reason, metadata);
        }
        Self {
            backend: VectorBackend::Ready { embedder, index },
            metadata_rows: metadata,
        }
    }

    pub fn unavailable(reason: DegradedReason, metadata: Arc<CatalogMetadata>) -> Self {
        Self {
            backend: VectorBackend::Unavailable(reason),
            metadata_rows: metadata,
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        matches!(self.backend, VectorBackend::Ready { .. })
    }

    pub fn degraded_reason(&self) -> Option<&DegradedReason> {
        match &self.backend {
            VectorBackend::Ready { .. } => None,
            VectorBackend::Unavailable(reason) => Some(reason),
        }
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        match &self.backend {
            VectorBackend::Ready { index, .. } => Some(index),
            VectorBackend::Unavailable(_) => None,
        }
    }

    /// `(code, similarity)` pairs, best first
    pub fn retrieve_codes(&self, note: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        check_top_k(top_k)?;
        let (embedder, index) = match &self.backend {
            VectorBackend::Ready { embedder, index } => (embedder, index),
            VectorBackend::Unavailable(reason) => {
                debug!(%reason, "vector retrieval skipped");
                return Ok(Vec::new());
            }
        };

        let query = match embedder.embed(note) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to embed note, returning no vector results");
                return Ok(Vec::new());
            }
        };

        Ok(index
            .search(&query, top_k)
            .into_iter()
            .map(|(code, similarity)| (code.to_string(), similarity))
            .collect())
    }
}

impl Retriever for VectorRetriever {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Vector
    }

    fn retrieve(&self, note: &str, top_k: usize) -> Result<Vec<Candidate>> {
        let hits = self.retrieve_codes(note, top_k)?;
        Ok(hits
            .into_iter()
            .filter_map(|(code, similarity)| {
                let row = self.metadata_rows.row_of(&code)?;
                Some(Candidate { code, row, similarity })
            })
            .collect())
    }
}
