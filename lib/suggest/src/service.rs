use crate::assemble::Assembler;
use crate::rationale::RationaleGenerator;
use crate::types::{SuggestRequest, SuggestResponse};
use icdx_core::{Error, IndexSet, RetrievalMode, Result};
use icdx_storage::IndexManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_MAX_TOP_K: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Retrieval path used when a request does not name one
    pub default_mode: RetrievalMode,
    /// Serve vector requests from the lexical index while the vector path is degraded
    pub vector_fallback_lexical: bool,
    pub max_top_k: usize,
    /// Per-candidate bound on rationale generation
    pub rationale_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_mode: RetrievalMode::Lexical,
            vector_fallback_lexical: false,
            max_top_k: DEFAULT_MAX_TOP_K,
            rationale_timeout: crate::rationale::DEFAULT_TIMEOUT,
        }
    }
}

/// Answers suggestion requests against the manager's current index set.
pub struct SuggestService<G> {
    indexes: Arc<IndexManager>,
    assembler: Assembler<G>,
    config: ServiceConfig,
}

impl<G: RationaleGenerator> SuggestService<G> {
    pub fn new(indexes: Arc<IndexManager>, generator: G, config: ServiceConfig) -> Self {
        Self {
            indexes,
            assembler: Assembler::new(generator, config.rationale_timeout),
            config,
        }
    }

    pub fn indexes(&self) -> &Arc<IndexManager> {
        &self.indexes
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn validate(&self, request: &SuggestRequest) -> Result<()> {
        if request.top_k < 1 {
            return Err(Error::InvalidInput("top_k must be at least 1".into()));
        }
        if request.top_k > self.config.max_top_k {
            return Err(Error::InvalidInput(format!(
                "top_k must be at most {}",
                self.config.max_top_k
            )));
        }
        Ok(())
    }

    /// Resolve the retrieval path actually used for a request
    fn resolve_mode(&self, set: &IndexSet, requested: Option<RetrievalMode>) -> RetrievalMode {
        let mode = requested.unwrap_or(self.config.default_mode);
        if mode == RetrievalMode::Vector && !set.vector().is_available() && self.config.vector_fallback_lexical {
            debug!("vector path degraded, serving from lexical index");
            return RetrievalMode::Lexical;
        }
        mode
    }

    /// Retrieve, rank and explain codes for one note.
    ///
    /// Only invalid input is an error. Degraded retrieval yields fewer (or no)
    /// results and failed rationales fall back per candidate.
    pub async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse> {
        let started = Instant::now();
        self.validate(&request)?;

        let set = self.indexes.current();
        let mode = self.resolve_mode(&set, request.mode);
        let candidates = set.retriever(mode).retrieve(&request.note, request.top_k)?;
        if candidates.is_empty() && mode == RetrievalMode::Vector && !set.vector().is_available() {
            warn!("vector retrieval unavailable, returning no results");
        }

        let results = self
            .assembler
            .assemble(&request.note, candidates, set.metadata(), request.top_k)
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(
            retriever = %mode,
            results = results.len(),
            latency_ms,
            "suggest complete"
        );

        Ok(SuggestResponse {
            query: request.note,
            results,
            latency_ms,
            retriever: mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rationale::{fallback_rationale, RationaleBackend};
    use icdx_core::{BuildConfig, CatalogEntry, CatalogIndexBuilder, HnswParams};
    use icdx_storage::ArtifactStore;
    use std::fs;
    use tempfile::TempDir;

    fn service(config: ServiceConfig, with_vectors: bool) -> (TempDir, SuggestService<RationaleBackend>) {
        let dir = TempDir::new().unwrap();
        let catalog = vec![
            CatalogEntry::new("N30.0", "Acute cystitis").with_description("bladder inflammation dysuria"),
            CatalogEntry::new("O00", "Ectopic pregnancy"),
            CatalogEntry::new("I10", "Essential hypertension").with_synonyms("HTN;high blood pressure"),
        ];
        let built = CatalogIndexBuilder::new(BuildConfig::default()).build(&catalog).unwrap();
        ArtifactStore::new(dir.path()).save(&built).unwrap();
        if !with_vectors {
            fs::remove_dir_all(dir.path().join("embeddings")).unwrap();
        }
        let manager = Arc::new(IndexManager::open(dir.path(), HnswParams::default()).unwrap());
        (dir, SuggestService::new(manager, RationaleBackend::Disabled, config))
    }

    #[tokio::test]
    async fn test_lexical_suggestion() {
        let (_dir, service) = service(ServiceConfig::default(), true);
        let response = service
            .suggest(SuggestRequest::new("patient has dysuria and bladder pain").with_top_k(1))
            .await
            .unwrap();
        assert_eq!(response.query, "patient has dysuria and bladder pain");
        assert_eq!(response.retriever, RetrievalMode::Lexical);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].code, "N30.0");
        assert!(response.results[0].confidence > 0.0);
        assert_eq!(response.results[0].rationale, fallback_rationale("Acute cystitis"));

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["latency_ms"].is_u64());
    }

    #[tokio::test]
    async fn test_vector_suggestion() {
        let (_dir, service) = service(ServiceConfig::default(), true);
        let response = service
            .suggest(SuggestRequest::new("pt with htn").with_mode(RetrievalMode::Vector))
            .await
            .unwrap();
        assert_eq!(response.retriever, RetrievalMode::Vector);
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.results[0].code, "I10");
    }

    #[tokio::test]
    async fn test_top_k_bounds() {
        let (_dir, service) = service(
            ServiceConfig {
                max_top_k: 10,
                ..ServiceConfig::default()
            },
            true,
        );
        for top_k in [0, 11] {
            let err = service
                .suggest(SuggestRequest::new("dysuria").with_top_k(top_k))
                .await
                .err()
                .unwrap();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_degraded_vector_path() {
        let (_dir, service) = service(ServiceConfig::default(), false);
        let response = service
            .suggest(SuggestRequest::new("dysuria").with_mode(RetrievalMode::Vector))
            .await
            .unwrap();
        assert_eq!(response.retriever, RetrievalMode::Vector);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_vector_falls_back_to_lexical() {
        let config = ServiceConfig {
            default_mode: RetrievalMode::Vector,
            vector_fallback_lexical: true,
            ..ServiceConfig::default()
        };
        let (_dir, service) = service(config, false);
        let response = service.suggest(SuggestRequest::new("dysuria")).await.unwrap();
        assert_eq!(response.retriever, RetrievalMode::Lexical);
        assert_eq!(response.results[0].code, "N30.0");
    }
}
