//! # icdx
//!
//! ICD-10 code suggestion from free-text clinical notes.
//!
//! A catalog of codes is indexed offline two ways: a TF-IDF matrix over word
//! unigrams and bigrams, and an HNSW graph over dense text embeddings. At
//! query time the note is matched against one of them, the best codes are
//! joined with their catalog metadata, and each gets a one-sentence rationale
//! from an Ollama-compatible model (or a deterministic fallback sentence).
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! icdx build --catalog codes.csv --out ./index
//! icdx serve --index-dir ./index --http-port 8000
//! curl -s localhost:8000/suggest -d '{"note": "pt with dysuria", "top_k": 3}' \
//!      -H 'content-type: application/json'
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use icdx::prelude::*;
//!
//! let catalog = vec![
//!     CatalogEntry::new("N30.0", "Acute cystitis").with_description("bladder inflammation dysuria"),
//!     CatalogEntry::new("O00", "Ectopic pregnancy"),
//! ];
//! let built = CatalogIndexBuilder::default().build(&catalog).unwrap();
//! let set = IndexSet::from_built(built, HnswParams::default()).unwrap();
//!
//! let hits = set.retriever(RetrievalMode::Vector).retrieve("painful urination, dysuria", 1).unwrap();
//! assert_eq!(hits[0].code, "N30.0");
//! ```
//!
//! ## Crate Structure
//!
//! - `icdx-core` - Normalization, catalog, TF-IDF, embeddings, HNSW, retrievers
//! - `icdx-storage` - Index artifacts, LMDB embedding store, reloadable index manager
//! - `icdx-suggest` - Result assembly, rationale generation, the suggestion service
//! - `icdx-api` - REST API

// Re-export core types
pub use icdx_core::{
    BuildConfig, Candidate, CatalogEntry, CatalogIndexBuilder, CatalogMetadata, CodeMetadata, EmbeddingModel,
    Error, HnswParams, IndexSet, LexicalIndex, Result, RetrievalMode, Retriever, VectorRetriever,
};

// Re-export storage
pub use icdx_storage::{ArtifactStore, IndexManager, Manifest};

// Re-export the suggestion service
pub use icdx_suggest::{
    OllamaClient, OllamaConfig, RationaleBackend, ServiceConfig, SuggestRequest, SuggestResponse, SuggestService,
    SuggestionResult,
};

// Re-export API
pub use icdx_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BuildConfig, CatalogEntry, CatalogIndexBuilder, EmbeddingModel, Error, HnswParams, IndexManager, IndexSet,
        RationaleBackend, Result, RetrievalMode, Retriever, ServiceConfig, SuggestRequest, SuggestService,
    };
}
