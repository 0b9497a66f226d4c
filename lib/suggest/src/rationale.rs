//! Short natural-language rationales for suggested codes.
//!
//! Generation goes to an Ollama-compatible text-generation endpoint. Every
//! call is bounded by a timeout, and any failure turns into a deterministic
//! fallback sentence instead of an error, so a slow or missing model never
//! fails a suggestion request.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:3b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 96;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

/// Longest rationale kept, in characters
pub const MAX_RATIONALE_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum RationaleError {
    #[error("rationale generation is disabled")]
    Disabled,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generator returned HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator returned no usable text")]
    Empty,
}

/// Input for one rationale
#[derive(Debug, Clone, Copy)]
pub struct RationaleRequest<'a> {
    pub note: &'a str,
    pub code: &'a str,
    pub title: &'a str,
}

/// Outcome of rationale generation. Always carries text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rationale {
    Generated(String),
    Fallback(String),
}

impl Rationale {
    pub fn text(&self) -> &str {
        match self {
            Rationale::Generated(text) | Rationale::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Rationale::Generated(text) | Rationale::Fallback(text) => text,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Rationale::Fallback(_))
    }
}

/// Text-generation collaborator
pub trait RationaleGenerator: Send + Sync {
    /// Raw model output for one candidate
    fn generate(&self, request: &RationaleRequest<'_>) -> impl Future<Output = Result<String, RationaleError>> + Send;
}

/// Deterministic rationale used whenever generation fails
pub fn fallback_rationale(title: &str) -> String {
    format!(
        "Presentation is consistent with {}, based on the note text.",
        title.to_lowercase()
    )
}

pub fn build_prompt(request: &RationaleRequest<'_>) -> String {
    format!(
        "You are assisting with ICD-10 code suggestions.\n\
         Write ONE short sentence explaining why the ICD-10 code fits the note.\n\
         Avoid clinical certainty; use hedged language if needed.\n\n\
         Note: \"{}\"\n\
         ICD-10: {} - {}\n\n\
         One-sentence rationale:",
        request.note, request.code, request.title
    )
}

/// First non-empty line, trimmed and cut to [`MAX_RATIONALE_CHARS`]
pub fn sanitize(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(MAX_RATIONALE_CHARS).collect())
}

/// Generate a rationale for one candidate within `timeout`, falling back on any failure.
pub async fn rationale_for<G: RationaleGenerator>(
    generator: &G,
    request: &RationaleRequest<'_>,
    timeout: Duration,
) -> Rationale {
    let outcome = match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(Ok(raw)) => sanitize(&raw).ok_or(RationaleError::Empty),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(RationaleError::Timeout(timeout)),
    };

    match outcome {
        Ok(text) => Rationale::Generated(text),
        Err(RationaleError::Disabled) => Rationale::Fallback(fallback_rationale(request.title)),
        Err(e) => {
            debug!(code = request.code, error = %e, "using fallback rationale");
            Rationale::Fallback(fallback_rationale(request.title))
        }
    }
}

/// Settings for the Ollama-compatible collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for `POST {base_url}/api/generate`
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    config: OllamaConfig,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, RationaleError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!("{}/api/generate", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

impl RationaleGenerator for OllamaClient {
    async fn generate(&self, request: &RationaleRequest<'_>) -> Result<String, RationaleError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: build_prompt(request),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(RationaleError::Status(response.status().as_u16()));
        }
        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

/// Generator chosen once at startup
#[derive(Debug, Clone)]
pub enum RationaleBackend {
    Ollama(OllamaClient),
    /// Every rationale is the fallback sentence
    Disabled,
}

impl RationaleGenerator for RationaleBackend {
    async fn generate(&self, request: &RationaleRequest<'_>) -> Result<String, RationaleError> {
        match self {
            RationaleBackend::Ollama(client) => client.generate(request).await,
            RationaleBackend::Disabled => Err(RationaleError::Disabled),
        }
    }
}
