// =============================================================================
// discovery.rs — THE SEC'S VERY PATIENT PEN PAL
// =============================================================================
//
// data.sec.gov publishes, for every registrant, a submissions document:
//
//   https://data.sec.gov/submissions/CIK##########.json
//
// Inside, under filings.recent, are four parallel arrays: form, filingDate,
// accessionNumber, primaryDocument. Index i of each describes filing i.
// We zip them, keep the forms we care about inside the year window, and
// turn each survivor into a direct URL for its primary document:
//
//   https://www.sec.gov/Archives/edgar/data/{cik}/{accession-no-dashes}/{doc}
//
// The arrays are supposed to be the same length. If they are not, we zip
// to the shortest and keep going. Partial data beats no data, and the
// alternative is dropping a whole company over one stray element.
//
// Companies are queried strictly one after another with a fixed pause in
// between. The SEC asks for no more than ten requests a second and a
// User-Agent with contact details; aggressive clients get blocked, and a
// blocked client discovers nothing.
//
// One company failing (HTTP error, garbage JSON) is a warning. Every company
// failing, or succeeding with zero matching filings, is the end of the run.
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DiscoveryError, PipelineError};
use crate::metrics::RunMetrics;
use crate::models::{year_of, CompanyRecord, FilingReference, SubmissionsResponse};
use crate::universe::{self, pad_cik};

/// Anything that can hand us a company's submissions document.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn submissions(&self, cik: &str) -> Result<SubmissionsResponse, DiscoveryError>;
}

/// The SEC submissions API over reqwest.
pub struct EdgarRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl EdgarRegistry {
    /// Build an HTTP client with an SEC-compliant User-Agent. Compressed
    /// encodings are advertised by reqwest's gzip/deflate/brotli features.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json, */*"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.registry_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.submissions_base_url.clone(),
        })
    }

    fn submissions_url(&self, cik: &str) -> String {
        format!("{}{}.json", self.base_url, pad_cik(cik))
    }
}

#[async_trait]
impl RegistrySource for EdgarRegistry {
    async fn submissions(&self, cik: &str) -> Result<SubmissionsResponse, DiscoveryError> {
        let padded = pad_cik(cik);
        let url = self.submissions_url(cik);
        debug!(url = url.as_str(), "Fetching submissions");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| DiscoveryError::Transport {
                cik: padded.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                warn!(cik = padded.as_str(), "Registry rate limited us (HTTP 429)");
            }
            return Err(DiscoveryError::Status {
                cik: padded,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| DiscoveryError::Transport {
                cik: padded.clone(),
                source,
            })?;
        debug!(cik = padded.as_str(), bytes = body.len(), "Submissions received");

        serde_json::from_str(&body).map_err(|source| DiscoveryError::Decode { cik: padded, source })
    }
}

/// Direct URL of a filing's primary document. With no primary document we
/// fall back to the filing's directory listing.
pub fn build_filing_url(archives_base: &str, cik: &str, accession: &str, primary_doc: &str) -> String {
    let trimmed = cik.trim().trim_start_matches('0');
    let cik_path = if trimmed.is_empty() { "0" } else { trimmed };
    let accession_path = accession.trim().replace('-', "");
    let base = archives_base.trim_end_matches('/');
    let primary_doc = primary_doc.trim();

    if primary_doc.is_empty() {
        format!("{base}/{cik_path}/{accession_path}/")
    } else {
        format!("{base}/{cik_path}/{accession_path}/{primary_doc}")
    }
}

/// Is the filing date's year within `[start, end]`? Dates we cannot read a
/// year from are outside every window.
pub fn in_year_range(date: &str, start: i32, end: i32) -> bool {
    year_of(date).is_some_and(|year| start <= year && year <= end)
}

/// Filter one company's submissions down to filing references.
pub fn extract_filings(
    company: &CompanyRecord,
    submissions: &SubmissionsResponse,
    config: &Config,
) -> Vec<FilingReference> {
    let recent = submissions.recent();
    let forms = recent.form.unwrap_or_default();
    let dates = recent.filing_date.unwrap_or_default();
    let accessions = recent.accession_number.unwrap_or_default();
    let primary_docs = recent.primary_document.unwrap_or_default();

    let aligned = forms
        .len()
        .min(dates.len())
        .min(accessions.len())
        .min(primary_docs.len());

    if aligned == 0 {
        warn!(ticker = company.ticker.as_str(), cik = company.cik.as_str(), "No recent filings in submissions");
        return Vec::new();
    }

    let longest = forms
        .len()
        .max(dates.len())
        .max(accessions.len())
        .max(primary_docs.len());
    if longest != aligned {
        warn!(
            ticker = company.ticker.as_str(),
            aligned = aligned,
            longest = longest,
            "Registry arrays are misaligned; truncating to the shortest"
        );
    }

    let mut filings = Vec::new();
    let mut incomplete = 0usize;

    for (((form, date), accession), primary_doc) in forms
        .iter()
        .zip(&dates)
        .zip(&accessions)
        .zip(&primary_docs)
    {
        // A null primary document still has a filing directory to point at.
        let (Some(form), Some(date), Some(accession)) =
            (form.as_deref(), date.as_deref(), accession.as_deref())
        else {
            incomplete += 1;
            continue;
        };
        let primary_doc = primary_doc.as_deref().unwrap_or("");

        if !config.form_allowed(form) || !in_year_range(date, config.start_year, config.end_year) {
            continue;
        }

        filings.push(FilingReference {
            ticker: company.ticker.clone(),
            cik: pad_cik(&company.cik),
            sector: company.sector.clone(),
            form: form.to_string(),
            filing_date: date.to_string(),
            accession: accession.to_string(),
            primary_doc: primary_doc.to_string(),
            filing_url: build_filing_url(&config.archives_base_url, &company.cik, accession, primary_doc),
        });
    }

    if incomplete > 0 {
        warn!(
            ticker = company.ticker.as_str(),
            skipped = incomplete,
            "Registry entries with a null form, date or accession were skipped"
        );
    }
    filings
}

/// Query every company in order, pausing between calls, and collect the
/// filings that survive the filters.
pub async fn discover(
    config: &Config,
    universe: &[CompanyRecord],
    registry: &dyn RegistrySource,
    metrics: &RunMetrics,
) -> Result<Vec<FilingReference>, PipelineError> {
    let mut all_filings = Vec::new();

    for (i, company) in universe.iter().enumerate() {
        if i > 0 && !config.registry_delay.is_zero() {
            tokio::time::sleep(config.registry_delay).await;
        }

        info!(ticker = company.ticker.as_str(), cik = company.cik.as_str(), "Fetching filings");
        RunMetrics::incr(&metrics.companies_queried);

        let submissions = match registry.submissions(&company.cik).await {
            Ok(submissions) => submissions,
            Err(e) => {
                RunMetrics::incr(&metrics.companies_skipped);
                warn!(
                    company = %company,
                    error = %e,
                    "Discovery: skipping company"
                );
                continue;
            }
        };

        let filings = extract_filings(company, &submissions, config);
        info!(
            ticker = company.ticker.as_str(),
            filings = filings.len(),
            "Collected {} filings for {}",
            filings.len(),
            company.ticker
        );
        RunMetrics::add(&metrics.filings_discovered, filings.len() as u64);
        all_filings.extend(filings);
    }

    if all_filings.is_empty() {
        return Err(PipelineError::NoFilingsDiscovered);
    }
    Ok(all_filings)
}

/// Write the combined discovery index as pretty JSON.
pub fn write_index(path: &Path, filings: &[FilingReference]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let json = serde_json::to_string_pretty(filings)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Discovery stage entry point: universe in, index file out.
pub async fn run(config: &Config, metrics: Arc<RunMetrics>) -> Result<PathBuf, PipelineError> {
    config.ensure_dirs()?;
    let universe = universe::load_universe(config.universe_path.as_deref())?;
    let registry = EdgarRegistry::new(config)?;

    info!(
        companies = universe.len(),
        forms = ?config.forms,
        start_year = config.start_year,
        end_year = config.end_year,
        "🔎 Discovery starting"
    );

    let filings = discover(config, &universe, &registry, &metrics).await?;
    write_index(&config.index_path, &filings)?;

    info!(
        filings = filings.len(),
        path = %config.index_path.display(),
        "🔎 Discovery complete, index written"
    );
    metrics.log_summary("discovery");
    Ok(config.index_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::FakeRegistry;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const ARCHIVES: &str = "https://www.sec.gov/Archives/edgar/data";

    fn config() -> Config {
        let mut config = Config::with_data_dir("unused");
        config.registry_delay = Duration::ZERO;
        config
    }

    fn company(ticker: &str, cik: &str) -> CompanyRecord {
        CompanyRecord {
            ticker: ticker.to_string(),
            cik: pad_cik(cik),
            sector: "Tech".to_string(),
        }
    }

    fn submissions(json: &str) -> SubmissionsResponse {
        serde_json::from_str(json).unwrap()
    }

    const AAPL_JSON: &str = r#"{
        "cik": "320193",
        "filings": {"recent": {
            "form":            ["10-K", "S-1", "8-K", "10-Q", "10-K"],
            "filingDate":      ["2023-11-03", "2023-06-01", "2014-12-31", "2025-12-31", "2015-01-01"],
            "accessionNumber": ["0000320193-23-000106", "a", "b", "0000320193-25-000001", "0000320193-15-000001"],
            "primaryDocument": ["aapl-20230930.htm", "x.htm", "y.htm", "q.htm", ""]
        }}
    }"#;

    #[test]
    fn test_build_filing_url() {
        assert_eq!(
            build_filing_url(ARCHIVES, "0000320193", "0000320193-23-000106", "aapl-20230930.htm"),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm"
        );
        assert_eq!(
            build_filing_url(ARCHIVES, "0000320193", "0000320193-23-000106", ""),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/"
        );
    }

    #[test]
    fn test_in_year_range_is_inclusive() {
        assert!(in_year_range("2015-01-01", 2015, 2025));
        assert!(in_year_range("2025-12-31", 2015, 2025));
        assert!(!in_year_range("2014-12-31", 2015, 2025));
        assert!(!in_year_range("2026-01-01", 2015, 2025));
        assert!(!in_year_range("garbage", 2015, 2025));
    }

    #[test]
    fn test_extract_filings_applies_form_and_year_filters() {
        let filings = extract_filings(&company("AAPL", "320193"), &submissions(AAPL_JSON), &config());

        let summary: Vec<(&str, &str)> = filings
            .iter()
            .map(|f| (f.form.as_str(), f.filing_date.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("10-K", "2023-11-03"), ("10-Q", "2025-12-31"), ("10-K", "2015-01-01")]
        );
        assert_eq!(filings[0].cik, "0000320193");
        assert_eq!(
            filings[0].filing_url,
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm"
        );
        assert!(filings[2].filing_url.ends_with("/000032019315000001/"));
    }

    #[test]
    fn test_extract_filings_truncates_misaligned_arrays() {
        let json = r#"{"filings": {"recent": {
            "form":            ["10-K", "10-K", "10-K"],
            "filingDate":      ["2020-01-01", "2021-01-01"],
            "accessionNumber": ["1-1", "2-2", "3-3"],
            "primaryDocument": ["a.htm", "b.htm", "c.htm"]
        }}}"#;
        let filings = extract_filings(&company("MSFT", "789019"), &submissions(json), &config());
        assert_eq!(filings.len(), 2);
        assert_eq!(filings[1].accession, "2-2");
    }

    #[test]
    fn test_extract_filings_missing_recent_block() {
        let filings = extract_filings(&company("MSFT", "789019"), &submissions("{}"), &config());
        assert!(filings.is_empty());
    }

    #[test]
    fn test_extract_filings_tolerates_null_elements() {
        let json = r#"{"filings": {"recent": {
            "form":            ["10-K", null, "10-Q", "8-K"],
            "filingDate":      ["2020-01-01", "2021-01-01", null, "2022-05-05"],
            "accessionNumber": ["1-1", "2-2", "3-3", "4-4"],
            "primaryDocument": ["a.htm", "b.htm", "c.htm", null]
        }}}"#;
        let filings = extract_filings(&company("MSFT", "789019"), &submissions(json), &config());

        let accessions: Vec<&str> = filings.iter().map(|f| f.accession.as_str()).collect();
        assert_eq!(accessions, vec!["1-1", "4-4"]);
        assert_eq!(filings[1].primary_doc, "");
        assert_eq!(
            filings[1].filing_url,
            "https://www.sec.gov/Archives/edgar/data/789019/44/"
        );
    }

    #[tokio::test]
    async fn test_discover_skips_failing_companies() {
        let registry = FakeRegistry::new()
            .with_json("0000320193", AAPL_JSON)
            .with_status("0000789019", 500)
            .with_json("0001045810", "{ this is not json");
        let universe = vec![
            company("AAPL", "320193"),
            company("MSFT", "789019"),
            company("NVDA", "1045810"),
        ];
        let metrics = RunMetrics::new();

        let filings = discover(&config(), &universe, &registry, &metrics).await.unwrap();

        assert_eq!(filings.len(), 3);
        assert!(filings.iter().all(|f| f.ticker == "AAPL"));
        assert_eq!(registry.calls(), vec!["0000320193", "0000789019", "0001045810"]);
        assert_eq!(metrics.companies_skipped.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.filings_discovered.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_discover_with_nothing_found_is_fatal() {
        let registry = FakeRegistry::new().with_status("0000320193", 403);
        let metrics = RunMetrics::new();

        let err = discover(&config(), &[company("AAPL", "320193")], &registry, &metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoFilingsDiscovered));
    }

    #[tokio::test]
    async fn test_discover_pauses_between_companies() {
        let mut config = config();
        config.registry_delay = Duration::from_millis(40);
        let registry = FakeRegistry::new()
            .with_json("0000320193", AAPL_JSON)
            .with_json("0000789019", AAPL_JSON)
            .with_json("0001045810", AAPL_JSON);
        let universe = vec![
            company("AAPL", "320193"),
            company("MSFT", "789019"),
            company("NVDA", "1045810"),
        ];

        let started = std::time::Instant::now();
        discover(&config, &universe, &registry, &RunMetrics::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_write_index_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("raw").join("index.json");
        let filings = extract_filings(&company("AAPL", "320193"), &submissions(AAPL_JSON), &config());

        write_index(&path, &filings).unwrap();
        let read: Vec<FilingReference> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, filings);
    }
}
