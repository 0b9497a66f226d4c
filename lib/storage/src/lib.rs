pub mod artifacts;
pub mod embedding_store;
pub mod manager;

pub use artifacts::{ArtifactStore, Manifest};
pub use embedding_store::{read_embeddings, write_embeddings, StoredEmbeddings};
pub use manager::IndexManager;
