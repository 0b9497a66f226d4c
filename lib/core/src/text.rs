//! Text normalization shared by index building and query analysis.
//!
//! Normalization lowercases, turns punctuation into spaces, collapses whitespace
//! and expands a fixed table of clinical abbreviations. It is total and pure:
//! the same input always yields the same output and nothing can fail.

use crate::catalog::CatalogEntry;

/// Separator placed between the title, description and synonym parts of a search text.
pub const SEARCH_TEXT_SEPARATOR: &str = " \n ";

/// Expand a single normalized token through the alias table.
///
/// Expansions are lowercase words that are never alias keys themselves, which
/// keeps [`normalize`] idempotent.
#[inline]
fn alias(token: &str) -> Option<&'static str> {
    let expanded = match token {
        "htn" => "hypertension",
        "dm" => "diabetes mellitus",
        "afib" => "atrial fibrillation",
        "copd" => "chronic obstructive pulmonary disease",
        "chf" => "congestive heart failure",
        "cad" => "coronary artery disease",
        "ckd" => "chronic kidney disease",
        "mi" => "myocardial infarction",
        "uti" => "urinary tract infection",
        "uri" => "upper respiratory infection",
        "gerd" => "gastroesophageal reflux disease",
        "sob" => "shortness of breath",
        "dvt" => "deep vein thrombosis",
        "abd" => "abdominal",
        "hx" => "history",
        _ => return None,
    };
    Some(expanded)
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Normalize free text for indexing and querying.
///
/// ```
/// use icdx_core::text::normalize;
/// assert_eq!(normalize("  Pt w/ HTN,  dysuria!! "), "pt w hypertension dysuria");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_word_char(c) || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    for token in cleaned.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(alias(token).unwrap_or(token));
    }
    out
}

/// Build the searchable text for a catalog entry.
///
/// Parts that normalize to an empty string are skipped; synonyms are
/// `;`-delimited in the catalog and are flattened into plain words here.
pub fn build_search_text(entry: &CatalogEntry) -> String {
    let synonyms = entry.synonyms.replace(';', " ");
    let parts = [
        normalize(&entry.title),
        normalize(&entry.description),
        normalize(&synonyms),
    ];

    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(SEARCH_TEXT_SEPARATOR)
}
