//! On-disk layout of a built index.
//!
//! ```text
//! <index-dir>/
//!   manifest.json     build time, counts, embedding model, checksums
//!   codes_meta.json   metadata list in catalog row order
//!   lexical.bin.gz    vectorizer + document matrix (bincode, gzip)
//!   embeddings/       LMDB store of (code, embedding), optional
//! ```
//!
//! Saving removes any previous manifest first and writes the new one last, so
//! a directory with a manifest always holds a complete build.

use crate::embedding_store::{read_embeddings, write_embeddings};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use icdx_core::{
    BuiltIndexes, CatalogMetadata, CodeMetadata, DegradedReason, EmbeddingModel, Error, HashingEmbedder,
    HnswParams, IndexSet, LexicalIndex, Result, VectorIndex,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const METADATA_FILE: &str = "codes_meta.json";
pub const LEXICAL_FILE: &str = "lexical.bin.gz";
pub const EMBEDDINGS_DIR: &str = "embeddings";

pub const FORMAT_VERSION: u32 = 1;

/// Description of one build, stored as `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub built_at: DateTime<Utc>,
    pub entries: usize,
    pub features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub embeddings: usize,
    /// sha256 (hex) of each artifact file, keyed by file name
    pub checksums: BTreeMap<String, String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .map_err(|e| Error::Storage(format!("failed to write {}: {}", path.display(), e)))
}

/// Artifact directory of one index build
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_DIR)
    }

    /// Persist a build, replacing whatever the directory held before.
    pub fn save(&self, built: &BuiltIndexes) -> Result<Manifest> {
        fs::create_dir_all(&self.dir)?;
        let manifest_path = self.dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }
        let mut checksums = BTreeMap::new();

        let metadata_json = serde_json::to_vec_pretty(built.metadata.records())?;
        write_atomic(&self.dir.join(METADATA_FILE), &metadata_json)?;
        checksums.insert(METADATA_FILE.to_string(), sha256_hex(&metadata_json));

        let encoded = bincode::serialize(&built.lexical)
            .map_err(|e| Error::Serialization(format!("lexical index: {}", e)))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;
        let lexical_gz = encoder.finish()?;
        write_atomic(&self.dir.join(LEXICAL_FILE), &lexical_gz)?;
        checksums.insert(LEXICAL_FILE.to_string(), sha256_hex(&lexical_gz));

        let embeddings_path = self.embeddings_path();
        if embeddings_path.exists() {
            fs::remove_dir_all(&embeddings_path)?;
        }
        let embedding_model = match built.embedding_model {
            Some(model) => {
                write_embeddings(&embeddings_path, model, &built.embeddings)?;
                Some(model.id().to_string())
            }
            None => None,
        };

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            built_at: Utc::now(),
            entries: built.metadata.len(),
            features: built.lexical.n_features(),
            embedding_model,
            embeddings: built.embeddings.len(),
            checksums,
        };
        write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            dir = %self.dir.display(),
            entries = manifest.entries,
            features = manifest.features,
            embeddings = manifest.embeddings,
            "saved index artifacts"
        );
        Ok(manifest)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            Error::Configuration(format!(
                "cannot read {} ({}); build the index first",
                path.display(),
                e
            ))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Configuration(format!("invalid {}: {}", MANIFEST_FILE, e)))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::Configuration(format!(
                "unsupported index format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Read an artifact file and verify it against the manifest checksum
    fn read_verified(&self, manifest: &Manifest, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        let bytes = fs::read(&path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
        let expected = manifest
            .checksums
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("manifest has no checksum for {}", name)))?;
        let actual = sha256_hex(&bytes);
        if *expected != actual {
            return Err(Error::Configuration(format!(
                "checksum mismatch for {}: manifest {}, file {}",
                name, expected, actual
            )));
        }
        Ok(bytes)
    }

    pub fn load_metadata(&self, manifest: &Manifest) -> Result<CatalogMetadata> {
        let bytes = self.read_verified(manifest, METADATA_FILE)?;
        let records: Vec<CodeMetadata> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Configuration(format!("invalid {}: {}", METADATA_FILE, e)))?;
        if records.len() != manifest.entries {
            return Err(Error::Configuration(format!(
                "{} has {} entries, manifest records {}",
                METADATA_FILE,
                records.len(),
                manifest.entries
            )));
        }
        CatalogMetadata::new(records)
    }

    pub fn load_lexical(&self, manifest: &Manifest) -> Result<LexicalIndex> {
        let bytes = self.read_verified(manifest, LEXICAL_FILE)?;
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
        bincode::deserialize(&decoded)
            .map_err(|e| Error::Configuration(format!("invalid {}: {}", LEXICAL_FILE, e)))
    }

    /// Load the vector index, or the reason the vector path is unavailable.
    fn load_vector_index(
        &self,
        manifest: &Manifest,
        metadata: &CatalogMetadata,
        params: HnswParams,
    ) -> std::result::Result<VectorIndex, DegradedReason> {
        let model_id = manifest
            .embedding_model
            .as_deref()
            .ok_or_else(|| DegradedReason::StoreUnavailable("index was built without embeddings".into()))?;
        let model: EmbeddingModel = model_id
            .parse()
            .map_err(|e: Error| DegradedReason::ModelUnavailable(e.to_string()))?;

        let stored = read_embeddings(&self.embeddings_path())
            .map_err(|e| DegradedReason::StoreUnavailable(e.to_string()))?;
        if stored.model != model {
            return Err(DegradedReason::ModelUnavailable(format!(
                "store holds {} embeddings, manifest names {}",
                stored.model, model
            )));
        }
        if stored.embeddings.len() != manifest.embeddings {
            warn!(
                stored = stored.embeddings.len(),
                expected = manifest.embeddings,
                "embedding count differs from manifest"
            );
        }

        VectorIndex::build(model, stored.embeddings, metadata, params)
            .map_err(|e| DegradedReason::StoreUnavailable(e.to_string()))
    }

    /// Load everything into a fresh [`IndexSet`].
    ///
    /// Missing or inconsistent lexical artifacts are configuration errors. A
    /// missing or unreadable embedding store only degrades the vector path.
    pub fn load(&self, params: HnswParams) -> Result<(IndexSet, Manifest)> {
        let manifest = self.load_manifest()?;
        let metadata = self.load_metadata(&manifest)?;
        let lexical = self.load_lexical(&manifest)?;
        if lexical.n_features() != manifest.features {
            return Err(Error::Configuration(format!(
                "{} has {} features, manifest records {}",
                LEXICAL_FILE,
                lexical.n_features(),
                manifest.features
            )));
        }

        let set = match self.load_vector_index(&manifest, &metadata, params) {
            Ok(index) => {
                let embedder = Arc::new(HashingEmbedder::new(index.model()));
                info!(model = %index.model(), vectors = index.len(), "loaded vector index");
                IndexSet::new(metadata, lexical)?.with_vector_index(index, embedder)
            }
            Err(reason) => {
                warn!(%reason, "vector retrieval unavailable");
                IndexSet::new(metadata, lexical)?.with_degraded_vector(reason)
            }
        };

        info!(
            dir = %self.dir.display(),
            entries = manifest.entries,
            built_at = %manifest.built_at,
            "loaded index set"
        );
        Ok((set, manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icdx_core::{BuildConfig, CatalogEntry, CatalogIndexBuilder, RetrievalMode};
    use tempfile::TempDir;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("N30.0", "Acute cystitis").with_description("bladder inflammation dysuria"),
            CatalogEntry::new("O00", "Ectopic pregnancy"),
            CatalogEntry::new("I10", "Essential hypertension").with_synonyms("HTN"),
        ]
    }

    fn save(dir: &Path, config: BuildConfig) -> Manifest {
        let built = CatalogIndexBuilder::new(config).build(&catalog()).unwrap();
        ArtifactStore::new(dir).save(&built).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manifest = save(dir.path(), BuildConfig::default());
        assert_eq!(manifest.entries, 3);
        assert_eq!(manifest.embeddings, 3);
        assert_eq!(manifest.embedding_model.as_deref(), Some("hashed-trigram-384"));
        assert!(manifest.checksums.contains_key(METADATA_FILE));

        let (set, loaded) = ArtifactStore::new(dir.path()).load(HnswParams::default()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(set.len(), 3);
        assert!(set.vector().is_available());

        let hits = set.retriever(RetrievalMode::Lexical).retrieve("pt with htn", 1).unwrap();
        assert_eq!(hits[0].code, "I10");
    }

    #[test]
    fn test_missing_manifest_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = ArtifactStore::new(dir.path()).load(HnswParams::default()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tampered_metadata_rejected() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), BuildConfig::default());
        fs::write(dir.path().join(METADATA_FILE), b"[]").unwrap();

        let err = ArtifactStore::new(dir.path()).load(HnswParams::default()).err().unwrap();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_missing_embeddings_degrades_vector_path() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), BuildConfig::default());
        fs::remove_dir_all(dir.path().join(EMBEDDINGS_DIR)).unwrap();

        let (set, _) = ArtifactStore::new(dir.path()).load(HnswParams::default()).unwrap();
        assert!(!set.vector().is_available());
        assert!(set.retriever(RetrievalMode::Vector).retrieve("dysuria", 3).unwrap().is_empty());
        assert_eq!(set.retriever(RetrievalMode::Lexical).retrieve("dysuria", 3).unwrap().len(), 3);
    }

    #[test]
    fn test_rebuild_without_vectors_removes_stale_store() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), BuildConfig::default());
        let manifest = save(
            dir.path(),
            BuildConfig {
                embedding_model: None,
                ..BuildConfig::default()
            },
        );
        assert!(manifest.embedding_model.is_none());
        assert!(!dir.path().join(EMBEDDINGS_DIR).exists());
    }

    #[test]
    fn test_interrupted_save_leaves_no_manifest() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), BuildConfig::default());

        // A plain file where the LMDB directory belongs makes the save fail midway
        fs::remove_dir_all(dir.path().join(EMBEDDINGS_DIR)).unwrap();
        fs::write(dir.path().join(EMBEDDINGS_DIR), b"").unwrap();
        let built = CatalogIndexBuilder::default()
            .build(&[CatalogEntry::new("O00", "Ectopic pregnancy")])
            .unwrap();
        assert!(ArtifactStore::new(dir.path()).save(&built).is_err());

        assert!(!dir.path().join(MANIFEST_FILE).exists());
        let err = ArtifactStore::new(dir.path()).load(HnswParams::default()).err().unwrap();
        assert!(err.is_configuration());
    }
}
