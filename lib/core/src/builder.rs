//! Offline index construction from a catalog.

use crate::catalog::{validate_entries, CatalogEntry, CatalogMetadata};
use crate::embedder::{EmbeddingModel, HashingEmbedder, TextEmbedder};
use crate::hnsw::HnswParams;
use crate::lexical::LexicalIndex;
use crate::text::build_search_text;
use crate::tfidf::TfidfConfig;
use crate::vector::Vector;
use crate::Result;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

/// Settings for one index build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub tfidf: TfidfConfig,
    /// `None` skips the vector path entirely
    pub embedding_model: Option<EmbeddingModel>,
    pub hnsw: HnswParams,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tfidf: TfidfConfig::default(),
            embedding_model: Some(EmbeddingModel::default()),
            hnsw: HnswParams::default(),
        }
    }
}

/// Everything a build produces, before it is written to disk
#[derive(Debug, Clone)]
pub struct BuiltIndexes {
    pub metadata: CatalogMetadata,
    pub lexical: LexicalIndex,
    pub embedding_model: Option<EmbeddingModel>,
    /// `(code, unit embedding)` in catalog order; empty without a model
    pub embeddings: Vec<(String, Vector)>,
}

pub struct CatalogIndexBuilder {
    config: BuildConfig,
}

impl CatalogIndexBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build metadata, the lexical index and (optionally) the embeddings.
    ///
    /// Entries with an empty title and description are kept so the metadata
    /// list stays one-to-one with matrix rows.
    pub fn build(&self, entries: &[CatalogEntry]) -> Result<BuiltIndexes> {
        validate_entries(entries)?;
        let started = Instant::now();

        let empty = entries
            .iter()
            .filter(|e| e.title.trim().is_empty() && e.description.trim().is_empty())
            .count();
        if empty > 0 {
            warn!(entries = empty, "catalog entries without title or description are indexed as near-empty rows");
        }

        let metadata = CatalogMetadata::from_entries(entries)?;
        let codes: Vec<String> = entries.iter().map(|e| e.code.clone()).collect();
        let search_texts: Vec<String> = entries.iter().map(build_search_text).collect();

        let lexical = LexicalIndex::fit(self.config.tfidf, codes, &search_texts)?;
        info!(
            rows = lexical.rows(),
            features = lexical.n_features(),
            nnz = lexical.matrix().nnz(),
            "fitted lexical index"
        );

        let embeddings = match self.config.embedding_model {
            Some(model) => {
                let embedder = HashingEmbedder::new(model);
                let vectors = search_texts
                    .par_iter()
                    .map(|text| embedder.embed(text))
                    .collect::<Result<Vec<Vector>>>()?;
                info!(model = %model, count = vectors.len(), "embedded catalog");
                entries.iter().map(|e| e.code.clone()).zip(vectors).collect()
            }
            None => Vec::new(),
        };

        info!(
            entries = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index build complete"
        );

        Ok(BuiltIndexes {
            metadata,
            lexical,
            embedding_model: self.config.embedding_model,
            embeddings,
        })
    }
}

impl Default for CatalogIndexBuilder {
    fn default() -> Self {
        Self::new(BuildConfig::default())
    }
}
