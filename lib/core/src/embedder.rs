//! Text embedding models.
//!
//! The shipped models are deterministic feature-hashing embedders: every word
//! (and, for the trigram model, every character trigram of every word) is
//! hashed into one of `dim` buckets with a hash-derived sign, then the vector
//! is L2-normalized. They need no external weights, so an index built on one
//! machine embeds queries identically on another.

use crate::text::normalize;
use crate::vector::Vector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;
use twox_hash::XxHash64;

const BUCKET_SEED: u64 = 0x1cd1_0a11;
const SIGN_SEED: u64 = 0x5eed_0042;

const WORD_WEIGHT: f32 = 2.0;
const BIGRAM_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 1.0;

/// Closed set of embedding models, resolved once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// Words plus character trigrams, 384 dimensions
    #[serde(rename = "hashed-trigram-384")]
    HashedTrigram384,
    /// Words plus word bigrams, 384 dimensions
    #[serde(rename = "hashed-word-384")]
    HashedWord384,
}

impl EmbeddingModel {
    pub const ALL: [EmbeddingModel; 2] = [EmbeddingModel::HashedTrigram384, EmbeddingModel::HashedWord384];

    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingModel::HashedTrigram384 => "hashed-trigram-384",
            EmbeddingModel::HashedWord384 => "hashed-word-384",
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            EmbeddingModel::HashedTrigram384 | EmbeddingModel::HashedWord384 => 384,
        }
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        EmbeddingModel::HashedTrigram384
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EmbeddingModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EmbeddingModel::ALL
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "unknown embedding model '{}', expected one of: {}",
                    s,
                    EmbeddingModel::ALL.map(|m| m.id()).join(", ")
                ))
            })
    }
}

/// Turns text into a fixed-length unit vector
pub trait TextEmbedder: Send + Sync {
    fn model(&self) -> EmbeddingModel;

    fn dim(&self) -> usize {
        self.model().dim()
    }

    /// Embed `text`. Text without any features yields the zero vector.
    fn embed(&self, text: &str) -> Result<Vector>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    model: EmbeddingModel,
}

impl HashingEmbedder {
    #[inline]
    #[must_use]
    pub fn new(model: EmbeddingModel) -> Self {
        Self { model }
    }

    #[inline]
    fn hash(seed: u64, feature: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(seed);
        hasher.write(feature.as_bytes());
        hasher.finish()
    }

    #[inline]
    fn add_feature(components: &mut [f32], feature: &str, weight: f32) {
        let bucket = (Self::hash(BUCKET_SEED, feature) % components.len() as u64) as usize;
        let sign = if Self::hash(SIGN_SEED, feature) & 1 == 0 { 1.0 } else { -1.0 };
        components[bucket] += sign * weight;
    }
}

impl TextEmbedder for HashingEmbedder {
    fn model(&self) -> EmbeddingModel {
        self.model
    }

    fn embed(&self, text: &str) -> Result<Vector> {
        let dim = self.model.dim();
        let mut components = vec![0.0f32; dim];
        let normalized = normalize(text);
        let words: Vec<&str> = normalized.split_whitespace().collect();

        for word in &words {
            Self::add_feature(&mut components, word, WORD_WEIGHT);
        }

        match self.model {
            EmbeddingModel::HashedTrigram384 => {
                for word in &words {
                    let padded: Vec<char> = format!("#{}#", word).chars().collect();
                    for window in padded.windows(3) {
                        let trigram: String = window.iter().collect();
                        Self::add_feature(&mut components, &trigram, TRIGRAM_WEIGHT);
                    }
                }
            }
            EmbeddingModel::HashedWord384 => {
                for pair in words.windows(2) {
                    let bigram = format!("{} {}", pair[0], pair[1]);
                    Self::add_feature(&mut components, &bigram, BIGRAM_WEIGHT);
                }
            }
        }

        Ok(Vector::new(components).normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids_roundtrip() {
        for model in EmbeddingModel::ALL {
            assert_eq!(model.id().parse::<EmbeddingModel>().unwrap(), model);
        }
        assert!(matches!(
            "all-minilm-l6-v2".parse::<EmbeddingModel>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_embedding_is_unit_length() {
        for model in EmbeddingModel::ALL {
            let embedder = HashingEmbedder::new(model);
            let v = embedder.embed("Acute cystitis with dysuria").unwrap();
            assert_eq!(v.dim(), 384);
            assert!((v.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_embedding_deterministic() {
        let embedder = HashingEmbedder::new(EmbeddingModel::HashedTrigram384);
        let a = embedder.embed("ectopic pregnancy").unwrap();
        let b = embedder.embed("Ectopic   pregnancy!").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(EmbeddingModel::HashedWord384);
        let v = embedder.embed("  ...  ").unwrap();
        assert!(v.is_zero());
    }

    #[test]
    fn test_related_texts_are_closer() {
        let embedder = HashingEmbedder::new(EmbeddingModel::HashedTrigram384);
        let cystitis = embedder.embed("acute cystitis bladder inflammation dysuria").unwrap();
        let note = embedder.embed("patient has dysuria and bladder pain").unwrap();
        let pregnancy = embedder.embed("ectopic pregnancy").unwrap();
        assert!(note.cosine_similarity(&cystitis) > note.cosine_similarity(&pregnancy));
    }
}
