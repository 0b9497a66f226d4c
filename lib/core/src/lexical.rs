//! Sparse lexical retrieval: TF-IDF cosine against every catalog row.

use crate::catalog::CatalogMetadata;
use crate::rank::top_k;
use crate::retriever::{check_top_k, Candidate, RetrievalMode, Retriever};
use crate::tfidf::{SparseMatrix, SparseVector, TfidfConfig, TfidfVectorizer};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fitted vectorizer, its document matrix and the code of every matrix row.
///
/// The three parts are built and persisted together; row `i` always belongs
/// to `row_codes[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalIndex {
    vectorizer: TfidfVectorizer,
    matrix: SparseMatrix,
    row_codes: Vec<String>,
}

impl LexicalIndex {
    /// Fit on search texts given in catalog order.
    pub fn fit(config: TfidfConfig, codes: Vec<String>, search_texts: &[String]) -> Result<Self> {
        if codes.len() != search_texts.len() {
            return Err(Error::InvalidInput(format!(
                "{} codes for {} search texts",
                codes.len(),
                search_texts.len()
            )));
        }
        let (vectorizer, matrix) = TfidfVectorizer::fit_transform(config, search_texts);
        Ok(Self {
            vectorizer,
            matrix,
            row_codes: codes,
        })
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    #[inline]
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.matrix.n_features()
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn row_codes(&self) -> &[String] {
        &self.row_codes
    }

    /// Query vector for a note under the fitted vocabulary
    pub fn transform(&self, note: &str) -> SparseVector {
        self.vectorizer.transform(note)
    }

    /// Check internal consistency and key alignment with the metadata list.
    ///
    /// Any failure here is a configuration error: the artifacts were not
    /// produced by the same build.
    pub fn check_alignment(&self, metadata: &CatalogMetadata) -> Result<()> {
        self.vectorizer.validate()?;
        self.matrix.validate()?;

        if self.matrix.n_features() != self.vectorizer.n_features() {
            return Err(Error::Configuration(format!(
                "document matrix has {} features, vectorizer has {}",
                self.matrix.n_features(),
                self.vectorizer.n_features()
            )));
        }
        if self.row_codes.len() != self.matrix.rows() {
            return Err(Error::Configuration(format!(
                "document matrix has {} rows but {} row codes",
                self.matrix.rows(),
                self.row_codes.len()
            )));
        }
        if self.matrix.rows() != metadata.len() {
            return Err(Error::ArtifactMismatch {
                matrix_rows: self.matrix.rows(),
                metadata_rows: metadata.len(),
            });
        }
        for (row, (code, record)) in self.row_codes.iter().zip(metadata.iter()).enumerate() {
            if *code != record.code {
                return Err(Error::RowCodeMismatch {
                    row,
                    index_code: code.clone(),
                    metadata_code: record.code.clone(),
                });
            }
        }
        Ok(())
    }

    /// Score every row against the note and keep the best `top_k` as `(row, similarity)`.
    pub fn retrieve_rows(&self, note: &str, top_k_rows: usize) -> Result<Vec<(usize, f32)>> {
        check_top_k(top_k_rows)?;
        let query = self.transform(note);
        // Rows and query are unit length (or empty), so the dot product is the cosine
        let scores = self
            .matrix
            .dot_rows(&query)
            .map(|(row, score)| (row, score.clamp(0.0, 1.0)));
        Ok(top_k(scores, top_k_rows))
    }
}

impl Retriever for LexicalIndex {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Lexical
    }

    fn retrieve(&self, note: &str, top_k: usize) -> Result<Vec<Candidate>> {
        let rows = self.retrieve_rows(note, top_k)?;
        Ok(rows
            .into_iter()
            .map(|(row, similarity)| Candidate {
                code: self.row_codes[row].clone(),
                row,
                similarity,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, CatalogMetadata};
    use crate::text::build_search_text;

    fn index_for(entries: &[CatalogEntry]) -> LexicalIndex {
        let codes = entries.iter().map(|e| e.code.clone()).collect();
        let texts: Vec<String> = entries.iter().map(build_search_text).collect();
        LexicalIndex::fit(TfidfConfig::default(), codes, &texts).unwrap()
    }

    fn small_catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("N30.0", "Acute cystitis").with_description("bladder inflammation dysuria"),
            CatalogEntry::new("O00", "Ectopic pregnancy"),
        ]
    }

    #[test]
    fn test_dysuria_note_finds_cystitis() {
        let index = index_for(&small_catalog());
        let hits = index.retrieve("patient has dysuria and bladder pain", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "N30.0");
        assert!(hits[0].similarity > 0.0);
    }

    #[test]
    fn test_empty_note_returns_catalog_order() {
        let entries: Vec<CatalogEntry> = (0..10)
            .map(|i| CatalogEntry::new(format!("C{:02}", i), format!("condition number{}", i)))
            .collect();
        let index = index_for(&entries);
        let hits = index.retrieve("", 5).unwrap();
        assert_eq!(hits.len(), 5);
        for (i, hit) in hits.iter().enumerate() {
            assert_eq!(hit.row, i);
            assert_eq!(hit.similarity, 0.0);
        }
    }

    #[test]
    fn test_scores_bounded_and_sorted() {
        let index = index_for(&small_catalog());
        let hits = index.retrieve("acute ectopic pregnancy with dysuria", 10).unwrap();
        assert_eq!(hits.len(), 2);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.similarity)));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let index = index_for(&small_catalog());
        assert!(matches!(index.retrieve("dysuria", 0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_alignment_checks() {
        let entries = small_catalog();
        let index = index_for(&entries);
        let metadata = CatalogMetadata::from_entries(&entries).unwrap();
        assert!(index.check_alignment(&metadata).is_ok());

        let short = CatalogMetadata::from_entries(&entries[..1]).unwrap();
        assert!(matches!(
            index.check_alignment(&short),
            Err(Error::ArtifactMismatch { matrix_rows: 2, metadata_rows: 1 })
        ));

        let reordered = CatalogMetadata::from_entries(&[entries[1].clone(), entries[0].clone()]).unwrap();
        assert!(matches!(
            index.check_alignment(&reordered),
            Err(Error::RowCodeMismatch { row: 0, .. })
        ));
    }
}
