//! Code catalog: the ingestion records and the persisted metadata list.

use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of the ICD-10 catalog as ingested by the index builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// `;`-delimited symptom terms
    #[serde(default)]
    pub synonyms: String,
}

impl CatalogEntry {
    #[inline]
    #[must_use]
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            description: String::new(),
            synonyms: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_synonyms(mut self, synonyms: impl Into<String>) -> Self {
        self.synonyms = synonyms.into();
        self
    }

    /// Individual synonym terms, trimmed, empties dropped
    pub fn synonym_list(&self) -> Vec<&str> {
        self.synonyms
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Catalog metadata kept alongside the indexes and returned with suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMetadata {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl From<&CatalogEntry> for CodeMetadata {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            code: entry.code.clone(),
            title: entry.title.clone(),
            description: entry.description.clone(),
        }
    }
}

/// Ordered metadata list with a code lookup. Row `i` is catalog entry `i`.
#[derive(Debug, Clone, Default)]
pub struct CatalogMetadata {
    records: Vec<CodeMetadata>,
    by_code: AHashMap<String, usize>,
}

impl CatalogMetadata {
    /// Build from records in catalog order. Codes must be unique.
    pub fn new(records: Vec<CodeMetadata>) -> Result<Self> {
        let mut by_code = AHashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if by_code.insert(record.code.clone(), row).is_some() {
                return Err(Error::DuplicateCode(record.code.clone()));
            }
        }
        Ok(Self { records, by_code })
    }

    pub fn from_entries(entries: &[CatalogEntry]) -> Result<Self> {
        Self::new(entries.iter().map(CodeMetadata::from).collect())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize) -> Option<&CodeMetadata> {
        self.records.get(row)
    }

    #[inline]
    pub fn row_of(&self, code: &str) -> Option<usize> {
        self.by_code.get(code).copied()
    }

    #[inline]
    pub fn get_by_code(&self, code: &str) -> Option<&CodeMetadata> {
        self.row_of(code).and_then(|row| self.records.get(row))
    }

    #[inline]
    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn records(&self) -> &[CodeMetadata] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeMetadata> {
        self.records.iter()
    }
}

/// Reject duplicate or blank codes before anything is indexed.
pub fn validate_entries(entries: &[CatalogEntry]) -> Result<()> {
    let mut seen = AHashMap::with_capacity(entries.len());
    for (row, entry) in entries.iter().enumerate() {
        if entry.code.trim().is_empty() {
            return Err(Error::Catalog(format!("row {} has an empty code", row + 1)));
        }
        if seen.insert(entry.code.as_str(), row).is_some() {
            return Err(Error::DuplicateCode(entry.code.clone()));
        }
    }
    Ok(())
}

/// Load catalog entries from a CSV file.
///
/// Required columns: `code`, `title`. Optional: `description`, `synonyms`.
/// Column order does not matter and extra columns are ignored.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<CatalogEntry>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::Catalog(format!("failed to open {:?}: {}", path, e)))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let code_idx = column("code").ok_or_else(|| Error::Catalog("CSV must have a 'code' column".into()))?;
    let title_idx = column("title").ok_or_else(|| Error::Catalog("CSV must have a 'title' column".into()))?;
    let description_idx = column("description");
    let synonyms_idx = column("synonyms");

    let mut entries = Vec::new();
    for (row_num, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::Catalog(format!("failed to read CSV row {}: {}", row_num + 1, e)))?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(clean_cell)
                .unwrap_or_default()
        };

        entries.push(CatalogEntry {
            code: field(Some(code_idx)),
            title: field(Some(title_idx)),
            description: field(description_idx),
            synonyms: field(synonyms_idx),
        });
    }

    validate_entries(&entries)?;
    Ok(entries)
}

/// Load catalog entries from a JSON array of `{code, title, description?, synonyms?}`.
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<CatalogEntry>> {
    let data = std::fs::read(path.as_ref())?;
    let entries: Vec<CatalogEntry> = serde_json::from_slice(&data)?;
    validate_entries(&entries)?;
    Ok(entries)
}

/// Load a catalog, picking the format from the file extension (CSV unless `.json`).
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<CatalogEntry>> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_json(path),
        _ => load_csv(path),
    }
}

// Spreadsheet exports write missing values as "nan"
fn clean_cell(value: &str) -> String {
    if value.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        value.to_string()
    }
}
