//! # icdx Suggest
//!
//! Turns a clinical note into ranked ICD-10 suggestions with short rationales.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Note     │────>│  Retriever  │────>│  Assembler  │────> SuggestResponse
//! │  (top_k)    │     │ lexical or  │     │ metadata +  │
//! └─────────────┘     │   vector    │     │ rationales  │
//!                     └─────────────┘     └─────────────┘
//!                                                │
//!                                         ┌─────────────┐
//!                                         │  Generator  │
//!                                         │ (fallback)  │
//!                                         └─────────────┘
//! ```

pub mod assemble;
pub mod rationale;
pub mod service;
pub mod types;

pub use assemble::Assembler;
pub use rationale::{
    fallback_rationale, OllamaClient, OllamaConfig, Rationale, RationaleBackend, RationaleError, RationaleGenerator,
    RationaleRequest,
};
pub use service::{ServiceConfig, SuggestService, DEFAULT_MAX_TOP_K};
pub use types::{SuggestRequest, SuggestResponse, SuggestionResult, DEFAULT_TOP_K};
