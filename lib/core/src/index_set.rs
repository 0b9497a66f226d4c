//! The immutable bundle of loaded indexes that serves queries.

use crate::builder::BuiltIndexes;
use crate::catalog::CatalogMetadata;
use crate::dense::{DegradedReason, VectorIndex, VectorRetriever};
use crate::embedder::{HashingEmbedder, TextEmbedder};
use crate::hnsw::HnswParams;
use crate::lexical::LexicalIndex;
use crate::retriever::{RetrievalMode, Retriever};
use crate::Result;
use std::sync::Arc;

/// Metadata, lexical index and vector retriever loaded from one build.
///
/// Never mutated after construction. Services share it behind an `Arc` and
/// replace it wholesale on reload.
pub struct IndexSet {
    metadata: Arc<CatalogMetadata>,
    lexical: LexicalIndex,
    vector: VectorRetriever,
}

impl IndexSet {
    /// Pair a lexical index with its metadata list. The vector path starts
    /// unavailable until [`IndexSet::with_vector_index`] is called.
    ///
    /// Fails with a configuration error when the two are not from the same build.
    pub fn new(metadata: CatalogMetadata, lexical: LexicalIndex) -> Result<Self> {
        lexical.check_alignment(&metadata)?;
        let metadata = Arc::new(metadata);
        let vector = VectorRetriever::unavailable(
            DegradedReason::StoreUnavailable("no embedding store loaded".into()),
            metadata.clone(),
        );
        Ok(Self {
            metadata,
            lexical,
            vector,
        })
    }

    pub fn with_vector_index(mut self, index: VectorIndex, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.vector = VectorRetriever::new(embedder, index, self.metadata.clone());
        self
    }

    pub fn with_degraded_vector(mut self, reason: DegradedReason) -> Self {
        self.vector = VectorRetriever::unavailable(reason, self.metadata.clone());
        self
    }

    /// Assemble a set straight from a fresh build, without touching disk
    pub fn from_built(built: BuiltIndexes, params: HnswParams) -> Result<Self> {
        let set = Self::new(built.metadata, built.lexical)?;
        match built.embedding_model {
            Some(model) => {
                let index = VectorIndex::build(model, built.embeddings, &set.metadata, params)?;
                Ok(set.with_vector_index(index, Arc::new(HashingEmbedder::new(model))))
            }
            None => Ok(set.with_degraded_vector(DegradedReason::StoreUnavailable(
                "index was built without embeddings".into(),
            ))),
        }
    }

    #[inline]
    pub fn metadata(&self) -> &Arc<CatalogMetadata> {
        &self.metadata
    }

    #[inline]
    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    #[inline]
    pub fn vector(&self) -> &VectorRetriever {
        &self.vector
    }

    pub fn retriever(&self, mode: RetrievalMode) -> &dyn Retriever {
        match mode {
            RetrievalMode::Lexical => &self.lexical,
            RetrievalMode::Vector => &self.vector,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}
