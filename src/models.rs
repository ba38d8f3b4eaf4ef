// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF CORPORATE BUZZWORDS
// =============================================================================
//
// Four shapes carry the whole pipeline:
//
//   CompanyRecord    — who we watch (ticker, CIK, sector)
//   FilingReference  — one filing discovery found worth reading
//   ParagraphRecord  — one paragraph that said the magic words
//   Submissions*     — the registry's JSON, exactly as loosely as it arrives
//
// Everything is immutable once built. Workers get references, hand back
// fresh ParagraphRecords, and never touch each other's data.
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// The output table's columns, in the order downstream consumers expect.
pub const PARAGRAPH_COLUMNS: [&str; 7] = [
    "ticker",
    "sector",
    "year",
    "filing_date",
    "form",
    "paragraph",
    "keyword",
];

/// A company in the static universe. The CIK is always stored padded to
/// ten digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub ticker: String,
    pub cik: String,
    pub sector: String,
}

impl fmt::Display for CompanyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CIK {}, {})", self.ticker, self.cik, self.sector)
    }
}

/// One filing discovery decided we should read. Serialized as-is into the
/// discovery index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingReference {
    pub ticker: String,
    pub cik: String,
    pub sector: String,
    pub form: String,
    /// "YYYY-MM-DD", straight from the registry.
    pub filing_date: String,
    pub accession: String,
    pub primary_doc: String,
    pub filing_url: String,
}

/// One paragraph that passed the word-count floor and matched a keyword.
/// Field order here is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub ticker: String,
    pub sector: String,
    pub year: i32,
    pub filing_date: String,
    pub form: String,
    #[serde(rename = "paragraph")]
    pub paragraph_text: String,
    #[serde(rename = "keyword")]
    pub matched_keyword: String,
}

/// Extract the year from the first four characters of a "YYYY-MM-DD" date.
/// Anything that does not start with four digits is not a date we can place.
pub fn year_of(date: &str) -> Option<i32> {
    let head = date.trim().get(..4)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

// =============================================================================
// Registry response types
// =============================================================================
// The submissions endpoint returns its filing history as parallel arrays
// under filings.recent. Every level is optional because the registry has
// been known to omit things.
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionsResponse {
    #[serde(default)]
    pub filings: Option<SubmissionsFilings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionsFilings {
    #[serde(default)]
    pub recent: Option<RecentFilings>,
}

/// Individual elements can be null too, so each slot is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    #[serde(default)]
    pub form: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub filing_date: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub accession_number: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub primary_document: Option<Vec<Option<String>>>,
}

impl SubmissionsResponse {
    /// The "recent" block, or an empty one if the registry left it out.
    pub fn recent(&self) -> RecentFilings {
        self.filings
            .as_ref()
            .and_then(|f| f.recent.clone())
            .unwrap_or_default()
    }
}
