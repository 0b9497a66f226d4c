//! # icdx Core
//!
//! Retrieval engine for ICD-10 code suggestion.
//!
//! - [`text`] - Note and catalog text normalization
//! - [`catalog`] - Catalog entries, ingestion and the metadata list
//! - [`LexicalIndex`] - TF-IDF cosine retrieval over unigrams and bigrams
//! - [`VectorRetriever`] - Dense embedding retrieval over an HNSW graph
//! - [`CatalogIndexBuilder`] - Offline construction of both indexes
//! - [`IndexSet`] - The immutable bundle a running service queries
//!
//! ## Example
//!
//! ```rust
//! use icdx_core::{CatalogEntry, CatalogIndexBuilder, HnswParams, IndexSet, RetrievalMode};
//!
//! let catalog = vec![
//!     CatalogEntry::new("N30.0", "Acute cystitis").with_description("bladder inflammation dysuria"),
//!     CatalogEntry::new("O00", "Ectopic pregnancy"),
//! ];
//! let built = CatalogIndexBuilder::default().build(&catalog).unwrap();
//! let set = IndexSet::from_built(built, HnswParams::default()).unwrap();
//!
//! let hits = set
//!     .retriever(RetrievalMode::Lexical)
//!     .retrieve("patient has dysuria and bladder pain", 1)
//!     .unwrap();
//! assert_eq!(hits[0].code, "N30.0");
//! ```

pub mod builder;
pub mod catalog;
pub mod dense;
pub mod embedder;
pub mod error;
pub mod hnsw;
pub mod index_set;
pub mod lexical;
pub mod rank;
pub mod retriever;
pub mod text;
pub mod tfidf;
pub mod vector;

pub use builder::{BuildConfig, BuiltIndexes, CatalogIndexBuilder};
pub use catalog::{load_catalog, CatalogEntry, CatalogMetadata, CodeMetadata};
pub use dense::{DegradedReason, VectorIndex, VectorRetriever};
pub use embedder::{EmbeddingModel, HashingEmbedder, TextEmbedder};
pub use error::{Error, Result};
pub use hnsw::{HnswIndex, HnswParams};
pub use index_set::IndexSet;
pub use lexical::LexicalIndex;
pub use retriever::{Candidate, RetrievalMode, Retriever};
pub use tfidf::TfidfConfig;
pub use vector::Vector;
