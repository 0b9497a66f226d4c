use crate::rationale::{rationale_for, RationaleGenerator, RationaleRequest};
use crate::types::SuggestionResult;
use futures_util::future::join_all;
use icdx_core::{Candidate, CatalogMetadata, CodeMetadata};
use std::time::Duration;
use tracing::warn;

/// Turns retriever candidates into suggestion results with rationales.
pub struct Assembler<G> {
    generator: G,
    timeout: Duration,
}

impl<G: RationaleGenerator> Assembler<G> {
    pub fn new(generator: G, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Truncate to `top_k`, join metadata by code and attach rationales.
    ///
    /// Rationales for all candidates are generated concurrently, each under
    /// its own timeout. Output keeps the candidates' order. Candidates whose
    /// code has no metadata are skipped.
    pub async fn assemble(
        &self,
        note: &str,
        candidates: Vec<Candidate>,
        metadata: &CatalogMetadata,
        top_k: usize,
    ) -> Vec<SuggestionResult> {
        let matched: Vec<(&CodeMetadata, f32)> = candidates
            .into_iter()
            .take(top_k)
            .filter_map(|candidate| match metadata.get_by_code(&candidate.code) {
                Some(record) => Some((record, candidate.similarity)),
                None => {
                    warn!(code = %candidate.code, "candidate has no catalog metadata, skipping");
                    None
                }
            })
            .collect();

        let rationales = join_all(matched.iter().map(|(record, _)| async move {
            let request = RationaleRequest {
                note,
                code: &record.code,
                title: &record.title,
            };
            rationale_for(&self.generator, &request, self.timeout).await
        }))
        .await;

        matched
            .into_iter()
            .zip(rationales)
            .map(|((record, confidence), rationale)| SuggestionResult {
                code: record.code.clone(),
                title: record.title.clone(),
                description: record.description.clone(),
                confidence,
                rationale: rationale.into_text(),
            })
            .collect()
    }
}
