// TF-IDF vectorizer over word n-grams and a CSR document matrix
use crate::text::normalize;
use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Vectorizer settings. Defaults: unigrams and bigrams, min_df 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfidfConfig {
    pub ngram_min: usize,
    pub ngram_max: usize,
    /// Minimum number of documents a term must appear in to enter the vocabulary
    pub min_df: usize,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            ngram_min: 1,
            ngram_max: 2,
            min_df: 1,
        }
    }
}

/// Sparse vector with strictly increasing feature indices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Dot product of two index-sorted sparse vectors (merge join)
    pub fn dot(&self, other: &SparseVector) -> f32 {
        sparse_dot(&self.indices, &self.values, &other.indices, &other.values)
    }
}

#[inline]
fn sparse_dot(ai: &[u32], av: &[f32], bi: &[u32], bv: &[f32]) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0f32;
    while i < ai.len() && j < bi.len() {
        match ai[i].cmp(&bi[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += av[i] * bv[j];
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Compressed sparse row matrix, one row per document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_features: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl SparseMatrix {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: SparseVector) {
        self.indices.extend_from_slice(&row.indices);
        self.data.extend_from_slice(&row.values);
        self.indptr.push(self.indices.len());
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    #[inline]
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Borrow row `i` as `(indices, values)`
    #[inline]
    pub fn row(&self, i: usize) -> Option<(&[u32], &[f32])> {
        let start = *self.indptr.get(i)?;
        let end = *self.indptr.get(i + 1)?;
        Some((&self.indices[start..end], &self.data[start..end]))
    }

    /// Dot product of every row with `query`
    pub fn dot_rows<'a>(&'a self, query: &'a SparseVector) -> impl Iterator<Item = (usize, f32)> + 'a {
        (0..self.rows()).map(move |i| {
            let start = self.indptr[i];
            let end = self.indptr[i + 1];
            let score = sparse_dot(
                &self.indices[start..end],
                &self.data[start..end],
                &query.indices,
                &query.values,
            );
            (i, score)
        })
    }

    /// Structural checks run after deserialization
    pub fn validate(&self) -> Result<()> {
        let well_formed = self.indptr.first() == Some(&0)
            && self.indptr.windows(2).all(|w| w[0] <= w[1])
            && self.indptr.last() == Some(&self.indices.len())
            && self.indices.len() == self.data.len()
            && self.indices.iter().all(|&i| (i as usize) < self.n_features);
        if well_formed {
            Ok(())
        } else {
            Err(Error::Configuration("document matrix is malformed".into()))
        }
    }
}

/// Word n-gram TF-IDF vectorizer.
///
/// Weights are `tf * idf` with raw term counts and smoothed idf
/// `ln((1 + n) / (1 + df)) + 1`; every output vector is L2-normalized.
/// The vocabulary is sorted, so feature indices do not depend on fit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Analyze text into n-gram terms: normalize, split, drop tokens shorter than two chars
    pub fn analyze(config: &TfidfConfig, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        let tokens: Vec<&str> = normalized
            .split(' ')
            .filter(|t| t.chars().count() >= 2)
            .collect();

        let mut terms = Vec::new();
        let min_n = config.ngram_min.max(1);
        for n in min_n..=config.ngram_max.max(min_n) {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    /// Fit the vocabulary and idf weights on a corpus and transform it in one pass.
    pub fn fit_transform(config: TfidfConfig, corpus: &[String]) -> (Self, SparseMatrix) {
        let analyzed: Vec<Vec<String>> = corpus
            .iter()
            .map(|doc| Self::analyze(&config, doc))
            .collect();

        let mut document_frequency: AHashMap<&str, usize> = AHashMap::new();
        for terms in &analyzed {
            let unique: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let min_df = config.min_df.max(1);
        let kept: BTreeMap<&str, usize> = document_frequency
            .into_iter()
            .filter(|&(_, df)| df >= min_df)
            .collect();

        let n_docs = corpus.len() as f32;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (feature, (term, df)) in kept.into_iter().enumerate() {
            idf.push(((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0);
            vocabulary.insert(term.to_string(), feature as u32);
        }

        let vectorizer = Self {
            config,
            vocabulary,
            idf,
        };

        let mut matrix = SparseMatrix::new(vectorizer.n_features());
        for terms in &analyzed {
            matrix.push_row(vectorizer.weigh(terms));
        }

        (vectorizer, matrix)
    }

    /// Transform text with the fitted vocabulary. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        let terms = Self::analyze(&self.config, text);
        self.weigh(&terms)
    }

    fn weigh(&self, terms: &[String]) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for term in terms {
            if let Some(&feature) = self.vocabulary.get(term) {
                *counts.entry(feature).or_insert(0.0) += 1.0;
            }
        }

        let mut vector = SparseVector {
            indices: Vec::with_capacity(counts.len()),
            values: Vec::with_capacity(counts.len()),
        };
        for (feature, tf) in counts {
            vector.indices.push(feature);
            vector.values.push(tf * self.idf[feature as usize]);
        }

        let n = vector.norm();
        if n > 0.0 {
            for v in &mut vector.values {
                *v /= n;
            }
        }
        vector
    }

    #[inline]
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    #[inline]
    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    /// Feature index of a term, if it is in the vocabulary
    #[inline]
    pub fn feature(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }

    #[inline]
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.feature(term).map(|f| self.idf[f as usize])
    }

    pub fn validate(&self) -> Result<()> {
        let consistent = self.vocabulary.len() == self.idf.len()
            && self.vocabulary.values().all(|&f| (f as usize) < self.idf.len());
        if consistent {
            Ok(())
        } else {
            Err(Error::Configuration("vectorizer vocabulary and idf table disagree".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "acute cystitis \n bladder inflammation dysuria".to_string(),
            "ectopic pregnancy".to_string(),
            "acute bronchitis \n cough".to_string(),
        ]
    }

    #[test]
    fn test_analyze_ngrams() {
        let terms = TfidfVectorizer::analyze(&TfidfConfig::default(), "Acute cystitis, a UTI");
        assert_eq!(
            terms,
            vec![
                "acute",
                "cystitis",
                "urinary",
                "tract",
                "infection",
                "acute cystitis",
                "cystitis urinary",
                "urinary tract",
                "tract infection",
            ]
        );
    }

    #[test]
    fn test_fit_vocabulary_sorted() {
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(TfidfConfig::default(), &corpus());
        assert_eq!(matrix.rows(), 3);
        assert_eq!(matrix.n_features(), vectorizer.n_features());
        // "acute" < "acute bronchitis" < "acute cystitis" < ...
        assert_eq!(vectorizer.feature("acute"), Some(0));
        assert_eq!(vectorizer.feature("acute bronchitis"), Some(1));
        assert!(matrix.validate().is_ok());
        assert!(vectorizer.validate().is_ok());
    }

    #[test]
    fn test_idf_smoothing() {
        let (vectorizer, _) = TfidfVectorizer::fit_transform(TfidfConfig::default(), &corpus());
        // "acute" appears in 2 of 3 docs
        let expected = (4.0f32 / 3.0).ln() + 1.0;
        assert!((vectorizer.idf("acute").unwrap() - expected).abs() < 1e-6);
        // rarer terms weigh more
        assert!(vectorizer.idf("pregnancy").unwrap() > vectorizer.idf("acute").unwrap());
    }

    #[test]
    fn test_rows_are_unit_length() {
        let (_, matrix) = TfidfVectorizer::fit_transform(TfidfConfig::default(), &corpus());
        for i in 0..matrix.rows() {
            let (_, values) = matrix.row(i).unwrap();
            let n: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((n - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let (vectorizer, _) = TfidfVectorizer::fit_transform(TfidfConfig::default(), &corpus());
        assert!(vectorizer.transform("zebra quagga").is_empty());
        assert!(vectorizer.transform("").is_empty());
        let q = vectorizer.transform("dysuria zebra");
        assert_eq!(q.nnz(), 1);
    }

    #[test]
    fn test_empty_document_keeps_row() {
        let docs = vec!["ectopic pregnancy".to_string(), String::new()];
        let (_, matrix) = TfidfVectorizer::fit_transform(TfidfConfig::default(), &docs);
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.row(1).unwrap().0.len(), 0);
    }

    #[test]
    fn test_min_df_filters_rare_terms() {
        let config = TfidfConfig { min_df: 2, ..TfidfConfig::default() };
        let (vectorizer, _) = TfidfVectorizer::fit_transform(config, &corpus());
        assert_eq!(vectorizer.n_features(), 1);
        assert!(vectorizer.feature("acute").is_some());
    }
}
