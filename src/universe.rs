// =============================================================================
// universe.rs — THE WATCHLIST
// =============================================================================
//
// Thirty companies, fifteen per sector. Tech, because they cannot stop
// talking about AI. Energy, because we wanted to see if they had started.
//
// Each entry is (TICKER, CIK, SECTOR). The CIKs are real SEC Central Index
// Keys. A JSON file can replace this list at runtime; entries in that file
// may be missing fields, and those get skipped with a warning rather than
// taking the whole run down.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::CompanyRecord;

const CIK_WIDTH: usize = 10;

const BUILTIN_COMPANIES: &[(&str, &str, &str)] = &[
    // Tech
    ("AAPL", "0000320193", "Tech"),
    ("MSFT", "0000789019", "Tech"),
    ("GOOGL", "0001652044", "Tech"),
    ("AMZN", "0001018724", "Tech"),
    ("META", "0001326801", "Tech"),
    ("NVDA", "0001045810", "Tech"),
    ("AMD", "0000002488", "Tech"),
    ("AVGO", "0001730168", "Tech"),
    ("CRM", "0001108524", "Tech"),
    ("ORCL", "0001341439", "Tech"),
    ("IBM", "0000051143", "Tech"),
    ("INTC", "0000050863", "Tech"),
    ("ADBE", "0000796343", "Tech"),
    ("CSCO", "0000858877", "Tech"),
    ("SNOW", "0001640147", "Tech"),
    // Energy
    ("XOM", "0000034088", "Energy"),
    ("CVX", "0000093410", "Energy"),
    ("SLB", "0000087347", "Energy"),
    ("OXY", "0000797468", "Energy"),
    ("BP", "0000313807", "Energy"),
    ("SHEL", "0001306965", "Energy"),
    ("COP", "0001163165", "Energy"),
    ("EOG", "0000821189", "Energy"),
    ("PBR", "0001161683", "Energy"),
    ("HAL", "0000045012", "Energy"),
    ("KMI", "0001506307", "Energy"),
    ("ENB", "0000378249", "Energy"),
    ("EPD", "0001061219", "Energy"),
    ("NE", "0000314808", "Energy"),
    ("OKLO", "0001849056", "Energy"),
];

/// A company entry as it might appear in a universe file, before we know
/// whether it is complete.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCompany {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub cik: Option<RawCik>,
    #[serde(default)]
    pub sector: Option<String>,
}

/// Hand-written universe files quote the CIK about half the time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawCik {
    Text(String),
    Number(i64),
}

impl RawCik {
    fn to_text(&self) -> String {
        match self {
            RawCik::Text(s) => s.trim().to_string(),
            RawCik::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for RawCik {
    fn from(s: &str) -> Self {
        RawCik::Text(s.to_string())
    }
}

/// Digits only, and no wider than the registry's fixed width.
fn is_valid_cik(cik: &str) -> bool {
    !cik.is_empty() && cik.len() <= CIK_WIDTH && cik.bytes().all(|b| b.is_ascii_digit())
}

/// Zero-pad a CIK to the registry's fixed ten-character width.
/// Padding an already padded CIK changes nothing.
pub fn pad_cik(cik: &str) -> String {
    format!("{:0>width$}", cik.trim(), width = CIK_WIDTH)
}

/// The built-in universe.
pub fn builtin_universe() -> Vec<CompanyRecord> {
    let raw = BUILTIN_COMPANIES
        .iter()
        .map(|(ticker, cik, sector)| RawCompany {
            ticker: Some(ticker.to_string()),
            cik: Some(RawCik::from(*cik)),
            sector: Some(sector.to_string()),
        })
        .collect();
    normalize_universe(raw)
}

/// Load the universe from a JSON array of `{ticker, cik, sector}` objects,
/// or fall back to the built-in list when no path is given.
pub fn load_universe(path: Option<&Path>) -> Result<Vec<CompanyRecord>, PipelineError> {
    let Some(path) = path else {
        let universe = builtin_universe();
        info!(companies = universe.len(), "Company universe loaded (built-in)");
        return Ok(universe);
    };

    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
            hint: "point AI_FILINGS_UNIVERSE_PATH at an existing file or unset it",
        });
    }

    let body = std::fs::read_to_string(path)?;
    let raw: Vec<RawCompany> = serde_json::from_str(&body).map_err(|e| PipelineError::Universe {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let universe = normalize_universe(raw);
    info!(
        companies = universe.len(),
        path = %path.display(),
        "Company universe loaded from file"
    );
    Ok(universe)
}

/// Validate raw entries: drop anything missing a ticker, CIK or sector, pad
/// the CIK, and keep only the first entry for each ticker.
pub fn normalize_universe(raw: Vec<RawCompany>) -> Vec<CompanyRecord> {
    let mut seen = HashSet::new();
    let mut universe = Vec::with_capacity(raw.len());

    for entry in raw {
        let ticker = non_empty(entry.ticker.as_deref());
        let cik_text = entry.cik.as_ref().map(RawCik::to_text);
        let cik = non_empty(cik_text.as_deref());
        let sector = non_empty(entry.sector.as_deref());

        let (Some(ticker), Some(cik), Some(sector)) = (ticker, cik, sector) else {
            warn!(?entry, "Skipping malformed company record");
            continue;
        };

        if !is_valid_cik(cik) {
            warn!(ticker = ticker, cik = cik, "Skipping company record with a non-numeric or overlong CIK");
            continue;
        }

        if !seen.insert(ticker.to_string()) {
            warn!(ticker = ticker, "Skipping duplicate ticker in company universe");
            continue;
        }

        universe.push(CompanyRecord {
            ticker: ticker.to_string(),
            cik: pad_cik(cik),
            sector: sector.to_string(),
        });
    }

    universe
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_cik() {
        assert_eq!(pad_cik("320193"), "0000320193");
        assert_eq!(pad_cik("2488"), "0000002488");
        assert_eq!(pad_cik("1234567890"), "1234567890");
        assert_eq!(pad_cik(" 51143 "), "0000051143");
    }

    #[test]
    fn test_pad_cik_is_idempotent() {
        for (_, cik, _) in BUILTIN_COMPANIES {
            let once = pad_cik(cik.trim_start_matches('0'));
            let twice = pad_cik(&once);
            assert_eq!(once, twice);
            assert_eq!(once.len(), 10);
            assert!(once.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_builtin_universe_is_complete_and_unique() {
        let universe = builtin_universe();
        assert_eq!(universe.len(), 30);
        let tickers: HashSet<_> = universe.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers.len(), 30);
        assert_eq!(universe.iter().filter(|c| c.sector == "Energy").count(), 15);
    }

    #[test]
    fn test_normalize_skips_malformed_and_duplicates() {
        let raw = vec![
            RawCompany {
                ticker: Some("AAPL".into()),
                cik: Some("320193".into()),
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("NOCIK".into()),
                cik: None,
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("  ".into()),
                cik: Some("1".into()),
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("AAPL".into()),
                cik: Some("999".into()),
                sector: Some("Energy".into()),
            },
        ];
        let universe = normalize_universe(raw);
        assert_eq!(universe.len(), 1);
        assert_eq!(universe[0].cik, "0000320193");
        assert_eq!(universe[0].sector, "Tech");
    }

    #[test]
    fn test_load_universe_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("universe.json");
        std::fs::write(
            &path,
            r#"[{"ticker": "XOM", "cik": "34088", "sector": "Energy"}, {"ticker": "BAD"}]"#,
        )
        .unwrap();

        let universe = load_universe(Some(&path)).unwrap();
        assert_eq!(universe.len(), 1);
        assert_eq!(universe[0].cik, "0000034088");
    }

    #[test]
    fn test_invalid_ciks_are_skipped() {
        let raw = vec![
            RawCompany {
                ticker: Some("LETTERS".into()),
                cik: Some("12ab".into()),
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("WIDE".into()),
                cik: Some("123456789012".into()),
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("NEG".into()),
                cik: Some(RawCik::Number(-5)),
                sector: Some("Tech".into()),
            },
            RawCompany {
                ticker: Some("OK".into()),
                cik: Some("1234567890".into()),
                sector: Some("Tech".into()),
            },
        ];
        let universe = normalize_universe(raw);
        let tickers: Vec<&str> = universe.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["OK"]);
        assert!(universe.iter().all(|c| c.cik.len() == 10));
    }

    #[test]
    fn test_numeric_cik_in_universe_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("universe.json");
        std::fs::write(
            &path,
            r#"[{"ticker": "AAPL", "cik": 320193, "sector": "Tech"},
                {"ticker": "XOM", "cik": "34088", "sector": "Energy"},
                {"ticker": "BAD", "cik": "12ab", "sector": "Energy"}]"#,
        )
        .unwrap();

        let universe = load_universe(Some(&path)).unwrap();
        let ciks: Vec<&str> = universe.iter().map(|c| c.cik.as_str()).collect();
        assert_eq!(ciks, vec!["0000320193", "0000034088"]);
    }

    #[test]
    fn test_load_universe_missing_file_is_fatal() {
        let err = load_universe(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
