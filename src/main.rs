use clap::{Args, Parser, Subcommand};
use icdx_api::RestApi;
use icdx_core::{BuildConfig, EmbeddingModel, HnswParams, RetrievalMode};
use icdx_storage::IndexManager;
use icdx_suggest::{OllamaClient, OllamaConfig, RationaleBackend, ServiceConfig, SuggestRequest, SuggestService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// ICD-10 code suggestion from clinical notes
#[derive(Parser, Debug)]
#[command(name = "icdx")]
#[command(about = "Suggest ICD-10 codes for clinical notes", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build index artifacts from a catalog file (CSV or JSON)
    Build {
        /// Catalog with columns code, title, description, synonyms
        #[arg(long)]
        catalog: PathBuf,

        /// Output index directory
        #[arg(long, env = "ICDX_INDEX_DIR", default_value = "./index")]
        out: PathBuf,

        /// Embedding model for the vector index
        #[arg(long, default_value = "hashed-trigram-384")]
        embedding_model: EmbeddingModel,

        /// Skip the vector index
        #[arg(long)]
        no_vectors: bool,
    },

    /// Serve the HTTP API
    Serve {
        #[command(flatten)]
        index: IndexArgs,

        #[command(flatten)]
        llm: LlmArgs,

        /// HTTP API port
        #[arg(long, default_value_t = 8000)]
        http_port: u16,

        /// Serve vector requests from the lexical index while the vector store is unavailable
        #[arg(long)]
        vector_fallback_lexical: bool,

        /// Largest top_k a request may ask for
        #[arg(long, default_value_t = icdx_suggest::DEFAULT_MAX_TOP_K)]
        max_top_k: usize,
    },

    /// Run one query and print the JSON response
    Suggest {
        #[command(flatten)]
        index: IndexArgs,

        #[command(flatten)]
        llm: LlmArgs,

        /// Clinical note text
        #[arg(long)]
        note: String,

        #[arg(long, default_value_t = icdx_suggest::DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Index directory produced by `icdx build`
    #[arg(long, env = "ICDX_INDEX_DIR", default_value = "./index")]
    index_dir: PathBuf,

    /// Default retrieval path: lexical or vector
    #[arg(long, default_value = "lexical")]
    mode: RetrievalMode,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// Base URL of an Ollama-compatible server
    #[arg(long, env = "LLM_BASE_URL", default_value = icdx_suggest::rationale::DEFAULT_BASE_URL)]
    llm_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = icdx_suggest::rationale::DEFAULT_MODEL)]
    llm_model: String,

    #[arg(long, env = "LLM_TEMP", default_value_t = icdx_suggest::rationale::DEFAULT_TEMPERATURE)]
    llm_temperature: f32,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = icdx_suggest::rationale::DEFAULT_MAX_TOKENS)]
    llm_max_tokens: u32,

    /// Per-candidate rationale timeout in milliseconds
    #[arg(long, default_value_t = 6000)]
    rationale_timeout_ms: u64,

    /// Always use the fallback rationale
    #[arg(long)]
    no_llm: bool,
}

impl LlmArgs {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.rationale_timeout_ms)
    }

    fn backend(&self) -> anyhow::Result<RationaleBackend> {
        if self.no_llm {
            return Ok(RationaleBackend::Disabled);
        }
        let client = OllamaClient::new(OllamaConfig {
            base_url: self.llm_url.clone(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.timeout(),
        })?;
        Ok(RationaleBackend::Ollama(client))
    }
}

fn open_service(
    index: &IndexArgs,
    llm: &LlmArgs,
    config: ServiceConfig,
) -> anyhow::Result<SuggestService<RationaleBackend>> {
    let manager = IndexManager::open(&index.index_dir, HnswParams::default())?;
    let set = manager.current();
    info!(
        "Index loaded: {} codes, vector path {}",
        set.len(),
        if set.vector().is_available() { "available" } else { "unavailable" }
    );
    if index.mode == RetrievalMode::Vector && !set.vector().is_available() {
        warn!("default mode is vector but the vector index is unavailable");
    }
    Ok(SuggestService::new(Arc::new(manager), llm.backend()?, config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Build {
            catalog,
            out,
            embedding_model,
            no_vectors,
        } => {
            let config = BuildConfig {
                embedding_model: (!no_vectors).then_some(embedding_model),
                ..BuildConfig::default()
            };
            let manifest = IndexManager::build(&catalog, &out, config)?;
            info!(
                "Built index in {:?}: {} codes, {} features, {} embeddings",
                out, manifest.entries, manifest.features, manifest.embeddings
            );
        }

        Command::Serve {
            index,
            llm,
            http_port,
            vector_fallback_lexical,
            max_top_k,
        } => {
            info!("Starting icdx v{}", env!("CARGO_PKG_VERSION"));
            info!("Index directory: {:?}", index.index_dir);

            let config = ServiceConfig {
                default_mode: index.mode,
                vector_fallback_lexical,
                max_top_k,
                rationale_timeout: llm.timeout(),
            };
            let service = Arc::new(open_service(&index, &llm, config)?);

            let http_handle = std::thread::spawn(move || {
                info!("Starting HTTP server on port {}", http_port);
                let sys = actix_web::rt::System::new();
                sys.block_on(async {
                    if let Err(e) = RestApi::start(service, http_port).await {
                        tracing::error!("HTTP server error: {}", e);
                    }
                })
            });

            info!("HTTP API: http://localhost:{}/", http_port);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
                _ = tokio::task::spawn_blocking(move || {
                    http_handle.join().ok();
                }) => {
                    info!("HTTP server stopped");
                }
            }

            info!("Shutting down...");
        }

        Command::Suggest { index, llm, note, top_k } => {
            let config = ServiceConfig {
                default_mode: index.mode,
                rationale_timeout: llm.timeout(),
                ..ServiceConfig::default()
            };
            let service = open_service(&index, &llm, config)?;
            let response = service.suggest(SuggestRequest::new(note).with_top_k(top_k)).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_parses_embedding_model() {
        let cli = Cli::try_parse_from(["icdx", "build", "--catalog", "codes.csv", "--embedding-model", "hashed-word-384"])
            .unwrap();
        match cli.command {
            Command::Build { embedding_model, .. } => assert_eq!(embedding_model, EmbeddingModel::HashedWord384),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["icdx", "build", "--catalog", "codes.csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Build {
                embedding_model: EmbeddingModel::HashedTrigram384,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_embedding_model_rejected_at_parse() {
        let err = Cli::try_parse_from(["icdx", "build", "--catalog", "codes.csv", "--embedding-model", "bert-768"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
