// Integration tests for icdx
use icdx_core::text::{build_search_text, normalize, SEARCH_TEXT_SEPARATOR};
use icdx_core::{
    load_catalog, BuildConfig, CatalogEntry, CatalogIndexBuilder, DegradedReason, HnswParams, IndexSet,
    RetrievalMode,
};
use icdx_storage::{ArtifactStore, IndexManager};
use icdx_suggest::{
    fallback_rationale, OllamaClient, OllamaConfig, RationaleBackend, ServiceConfig, SuggestRequest, SuggestService,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG_CSV: &str = "\
code,title,description,synonyms
N30.0,Acute cystitis,Acute inflammation of the urinary bladder,dysuria;bladder pain;frequency
O00,Ectopic pregnancy,Pregnancy outside the uterus,
I10,Essential (primary) hypertension,High blood pressure without known cause,HTN;elevated blood pressure
E11.9,Type 2 diabetes mellitus without complications,,DM2;hyperglycemia
J20.9,\"Acute bronchitis, unspecified\",,cough;wheezing
R51.9,\"Headache, unspecified\",,head pain
K21.9,Gastro-esophageal reflux disease without esophagitis,,GERD;heartburn
M54.5,Low back pain,,lumbago
R07.9,\"Chest pain, unspecified\",,chest discomfort
Z00.00,Encounter for general adult medical examination without abnormal findings,nan,checkup
";

fn write_catalog(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("catalog.csv");
    fs::write(&path, CATALOG_CSV).unwrap();
    path
}

fn build_index(dir: &Path) -> std::path::PathBuf {
    let catalog = write_catalog(dir);
    let index_dir = dir.join("index");
    IndexManager::build(&catalog, &index_dir, BuildConfig::default()).unwrap();
    index_dir
}

fn service_for(index_dir: &Path, backend: RationaleBackend, config: ServiceConfig) -> SuggestService<RationaleBackend> {
    let manager = Arc::new(IndexManager::open(index_dir, HnswParams::default()).unwrap());
    SuggestService::new(manager, backend, config)
}

#[test]
fn test_catalog_csv_ingestion() {
    let dir = TempDir::new().unwrap();
    let entries = load_catalog(write_catalog(dir.path())).unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(entries[4].title, "Acute bronchitis, unspecified");
    assert_eq!(entries[1].synonyms, "");
    // "nan" cells are treated as empty
    assert_eq!(entries[9].description, "");
}

#[test]
fn test_normalize_idempotent_over_catalog() {
    let dir = TempDir::new().unwrap();
    for entry in load_catalog(write_catalog(dir.path())).unwrap() {
        let text = build_search_text(&entry);
        for part in text.split(SEARCH_TEXT_SEPARATOR) {
            assert_eq!(normalize(part), part, "not a fixed point: {:?}", part);
        }
    }
}

#[test]
fn test_distinctive_title_ranks_first_in_both_modes() {
    let dir = TempDir::new().unwrap();
    let entries = load_catalog(write_catalog(dir.path())).unwrap();
    let set = IndexSet::from_built(CatalogIndexBuilder::default().build(&entries).unwrap(), HnswParams::default()).unwrap();

    for (note, code) in [("Ectopic pregnancy", "O00"), ("Low back pain", "M54.5"), ("acute cystitis", "N30.0")] {
        let hits = set.retriever(RetrievalMode::Lexical).retrieve(note, 3).unwrap();
        assert_eq!(hits[0].code, code);
        assert!(hits[0].similarity > 0.0);

        let hits = set.retriever(RetrievalMode::Vector).retrieve(note, 3).unwrap();
        assert_eq!(hits[0].code, code);
    }
}

#[test]
fn test_similarity_bounds_and_order() {
    let dir = TempDir::new().unwrap();
    let entries = load_catalog(write_catalog(dir.path())).unwrap();
    let set = IndexSet::from_built(CatalogIndexBuilder::default().build(&entries).unwrap(), HnswParams::default()).unwrap();

    let note = "58 yo pt with htn, chest discomfort and a cough for 3 days";
    for top_k in [1, 4, 10, 25] {
        let lexical = set.retriever(RetrievalMode::Lexical).retrieve(note, top_k).unwrap();
        assert!(lexical.len() <= top_k);
        assert!(lexical.iter().all(|h| (0.0..=1.0).contains(&h.similarity)));
        assert!(lexical.windows(2).all(|w| w[0].similarity >= w[1].similarity));

        let vector = set.retriever(RetrievalMode::Vector).retrieve(note, top_k).unwrap();
        assert!(vector.len() <= top_k);
        assert!(vector.iter().all(|h| (-1.0..=1.0).contains(&h.similarity)));
        assert!(vector.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }
}

#[test]
fn test_rebuild_yields_identical_rankings() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());
    IndexManager::build(&catalog, dir.path().join("a"), BuildConfig::default()).unwrap();
    IndexManager::build(&catalog, dir.path().join("b"), BuildConfig::default()).unwrap();

    let (a, _) = ArtifactStore::new(dir.path().join("a")).load(HnswParams::default()).unwrap();
    let (b, _) = ArtifactStore::new(dir.path().join("b")).load(HnswParams::default()).unwrap();
    assert_eq!(a.len(), a.lexical().rows());

    for note in ["burning urination", "high blood pressure", "heartburn after meals", ""] {
        for mode in [RetrievalMode::Lexical, RetrievalMode::Vector] {
            assert_eq!(
                a.retriever(mode).retrieve(note, 5).unwrap(),
                b.retriever(mode).retrieve(note, 5).unwrap()
            );
        }
    }
}

#[tokio::test]
async fn test_cystitis_scenario() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("small.json");
    fs::write(
        &catalog,
        json!([
            {"code": "N30.0", "title": "Acute cystitis", "description": "bladder inflammation dysuria"},
            {"code": "O00", "title": "Ectopic pregnancy"}
        ])
        .to_string(),
    )
    .unwrap();
    let index_dir = dir.path().join("index");
    IndexManager::build(&catalog, &index_dir, BuildConfig::default()).unwrap();

    let service = service_for(&index_dir, RationaleBackend::Disabled, ServiceConfig::default());
    let response = service
        .suggest(SuggestRequest::new("patient has dysuria and bladder pain").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].code, "N30.0");
    assert!(response.results[0].confidence > 0.0);
}

#[tokio::test]
async fn test_empty_note_returns_catalog_order() {
    let dir = TempDir::new().unwrap();
    let index_dir = build_index(dir.path());
    let service = service_for(&index_dir, RationaleBackend::Disabled, ServiceConfig::default());

    let response = service.suggest(SuggestRequest::new("").with_top_k(5)).await.unwrap();
    let codes: Vec<&str> = response.results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["N30.0", "O00", "I10", "E11.9", "J20.9"]);
    assert!(response.results.iter().all(|r| r.confidence == 0.0));
}

#[tokio::test]
async fn test_unreachable_generator_uses_fallback() {
    let dir = TempDir::new().unwrap();
    let index_dir = build_index(dir.path());
    // Nothing listens on the discard port
    let client = OllamaClient::new(OllamaConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_secs(2),
        ..OllamaConfig::default()
    })
    .unwrap();
    let service = service_for(&index_dir, RationaleBackend::Ollama(client), ServiceConfig::default());

    let response = service
        .suggest(SuggestRequest::new("pt with htn and headache").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 3);
    for result in &response.results {
        assert_eq!(result.rationale, fallback_rationale(&result.title));
    }
}

#[tokio::test]
async fn test_generated_rationales_from_mock_server() {
    let dir = TempDir::new().unwrap();
    let index_dir = build_index(dir.path());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Findings may be consistent with this code."
        })))
        .mount(&server)
        .await;
    let client = OllamaClient::new(OllamaConfig {
        base_url: server.uri(),
        ..OllamaConfig::default()
    })
    .unwrap();
    let service = service_for(&index_dir, RationaleBackend::Ollama(client), ServiceConfig::default());

    let response = service
        .suggest(SuggestRequest::new("burning urination").with_top_k(2))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 2);
    assert!(response
        .results
        .iter()
        .all(|r| r.rationale == "Findings may be consistent with this code."));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vector_store_unavailable_yields_no_results() {
    let dir = TempDir::new().unwrap();
    let index_dir = build_index(dir.path());
    fs::remove_dir_all(index_dir.join("embeddings")).unwrap();

    let service = service_for(&index_dir, RationaleBackend::Disabled, ServiceConfig::default());
    assert!(matches!(
        service.indexes().current().vector().degraded_reason(),
        Some(DegradedReason::StoreUnavailable(_))
    ));

    let response = service
        .suggest(SuggestRequest::new("dysuria").with_mode(RetrievalMode::Vector))
        .await
        .unwrap();
    assert!(response.results.is_empty());

    let response = service.suggest(SuggestRequest::new("dysuria")).await.unwrap();
    assert_eq!(response.results[0].code, "N30.0");
}

#[test]
fn test_build_without_vectors() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());
    let config = BuildConfig {
        embedding_model: None,
        ..BuildConfig::default()
    };
    let manifest = IndexManager::build(&catalog, dir.path().join("index"), config).unwrap();
    assert_eq!(manifest.entries, 10);
    assert_eq!(manifest.embeddings, 0);

    let manager = IndexManager::open(dir.path().join("index"), HnswParams::default()).unwrap();
    assert!(!manager.current().vector().is_available());
}

#[test]
fn test_mismatched_artifacts_prevent_startup() {
    let dir = TempDir::new().unwrap();
    let index_dir = build_index(dir.path());

    let other = CatalogIndexBuilder::default()
        .build(&[CatalogEntry::new("O00", "Ectopic pregnancy")])
        .unwrap();
    let other_dir = dir.path().join("other");
    let other_manifest = ArtifactStore::new(&other_dir).save(&other).unwrap();

    // A lexical artifact from another build fails its checksum
    fs::copy(other_dir.join("lexical.bin.gz"), index_dir.join("lexical.bin.gz")).unwrap();
    let err = IndexManager::open(&index_dir, HnswParams::default()).err().unwrap();
    assert!(err.is_configuration());

    // With the manifest patched to match, the row count check still rejects it
    let store = ArtifactStore::new(&index_dir);
    let mut manifest = store.load_manifest().unwrap();
    manifest.features = other_manifest.features;
    manifest
        .checksums
        .insert("lexical.bin.gz".to_string(), other_manifest.checksums["lexical.bin.gz"].clone());
    fs::write(index_dir.join("manifest.json"), serde_json::to_vec(&manifest).unwrap()).unwrap();

    let err = IndexManager::open(&index_dir, HnswParams::default()).err().unwrap();
    assert!(matches!(
        err,
        icdx_core::Error::ArtifactMismatch { matrix_rows: 1, metadata_rows: 10 }
    ));
}
