// =============================================================================
// orchestrator.rs — THE FOREMAN
// =============================================================================
//
// Extraction takes the discovery index and turns it into the paragraph
// table. For every filing reference:
//
//   fetch (through the cache) -> strip markup -> segment -> word floor
//   -> classify -> ParagraphRecord per hit
//
// Filings run on a bounded pool of tokio tasks. The bound is the number of
// documents we are willing to have in flight against www.sec.gov at once;
// it is not a CPU knob. Parsing and classification are CPU work, so they
// go to the blocking pool and leave the runtime threads free to wait on
// sockets.
//
// Each task hands back Result<Vec<ParagraphRecord>, FilingError>. A failed
// fetch, a parse that panicked, a worker that got cancelled: all of them
// fold into "this filing contributed nothing" with a warning and a
// counter. One bad filing never takes down the batch.
//
// Rows arrive in completion order. Nobody should depend on row order.
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{FilingError, PipelineError};
use crate::metrics::RunMetrics;
use crate::models::{year_of, ParagraphRecord, PARAGRAPH_COLUMNS};
use crate::stages::fetch_cache::{DocumentSource, FilingCache, HttpDocumentSource};
use crate::text_extractor::extract_paragraphs;
use crate::text_scanner::KeywordClassifier;

/// Keys under which an object-shaped index may hold its record list,
/// checked in this order.
const INDEX_LIST_KEYS: &[&str] = &["filings", "records", "items"];

/// The shapes an index file is allowed to take.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexDocument {
    Records(Vec<Value>),
    Keyed(Map<String, Value>),
}

impl IndexDocument {
    /// Collapse either shape into a plain record list.
    fn into_records(self) -> Option<Vec<Value>> {
        match self {
            IndexDocument::Records(records) => Some(records),
            IndexDocument::Keyed(mut map) => INDEX_LIST_KEYS.iter().find_map(|key| {
                match map.remove(*key) {
                    Some(Value::Array(records)) => Some(records),
                    _ => None,
                }
            }),
        }
    }
}

/// Read the discovery index. Broken JSON is a `Json` error; valid JSON in
/// a shape we do not recognize is `UnrecognizedIndexShape`.
pub fn load_index(path: &Path) -> Result<Vec<Value>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
            hint: "run discover first",
        });
    }

    let body = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&body)?;

    IndexDocument::deserialize(value)
        .ok()
        .and_then(IndexDocument::into_records)
        .ok_or_else(|| PipelineError::UnrecognizedIndexShape {
            path: path.to_path_buf(),
        })
}

/// One validated unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingJob {
    pub ticker: String,
    pub sector: String,
    pub form: String,
    pub filing_date: String,
    pub url: String,
    pub year: i32,
}

impl FilingJob {
    fn record(&self, paragraph: &str, keyword: &str) -> ParagraphRecord {
        ParagraphRecord {
            ticker: self.ticker.clone(),
            sector: self.sector.clone(),
            year: self.year,
            filing_date: self.filing_date.clone(),
            form: self.form.clone(),
            paragraph_text: paragraph.to_string(),
            matched_keyword: keyword.to_string(),
        }
    }
}

fn text_field(record: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match record.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// An explicit `year` wins if it parses; otherwise the filing date decides.
fn year_field(record: &Map<String, Value>, filing_date: Option<&str>) -> Option<i32> {
    let explicit = match record.get("year") {
        Some(Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    explicit.or_else(|| filing_date.and_then(year_of))
}

fn valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Validate raw index records into jobs. Incomplete records are skipped with
/// a warning; records outside the year window are dropped quietly, since an
/// externally supplied index may cover more years than we want.
pub fn prepare_jobs(records: Vec<Value>, config: &Config, metrics: &RunMetrics) -> Vec<FilingJob> {
    let total = records.len();
    let mut jobs = Vec::with_capacity(total);

    for (i, raw) in records.into_iter().enumerate() {
        let Value::Object(record) = raw else {
            RunMetrics::incr(&metrics.filings_skipped);
            warn!(index = i, "Extraction: skipping index entry that is not an object");
            continue;
        };

        let ticker = text_field(&record, &["ticker"]);
        let sector = text_field(&record, &["sector"]);
        let form = text_field(&record, &["form", "form_type"]);
        let filing_date = text_field(&record, &["filing_date", "filed"]);
        let url = text_field(&record, &["filing_url", "url"]).filter(|u| valid_url(u));
        let year = year_field(&record, filing_date.as_deref());

        let (Some(ticker), Some(sector), Some(form), Some(filing_date), Some(url), Some(year)) =
            (ticker, sector, form, filing_date, url, year)
        else {
            RunMetrics::incr(&metrics.filings_skipped);
            let record = Value::Object(record);
            warn!(index = i, record = %record, "Extraction: skipping incomplete filing record");
            continue;
        };

        if !config.year_in_window(year) {
            RunMetrics::incr(&metrics.filings_skipped);
            debug!(ticker = ticker.as_str(), year = year, "Filing outside year window");
            continue;
        }

        jobs.push(FilingJob {
            ticker,
            sector,
            form,
            filing_date,
            url,
            year,
        });
    }

    info!(records = total, jobs = jobs.len(), "Filing jobs prepared");
    jobs
}

/// Fetch, extract and classify one filing.
pub async fn process_filing(
    job: &FilingJob,
    cache: &FilingCache,
    classifier: Arc<KeywordClassifier>,
    min_words: usize,
    metrics: &RunMetrics,
) -> Result<Vec<ParagraphRecord>, FilingError> {
    let Some(html) = cache.get(&job.url).await.into_text() else {
        return Err(FilingError::Unavailable {
            url: job.url.clone(),
        });
    };

    let owned = job.clone();
    let (scanned, rows) = tokio::task::spawn_blocking(move || {
        let paragraphs = extract_paragraphs(&html);
        let rows: Vec<ParagraphRecord> = classifier
            .scan_paragraphs(&paragraphs, min_words)
            .into_iter()
            .map(|(text, keyword)| owned.record(text, keyword))
            .collect();
        (paragraphs.len(), rows)
    })
    .await
    .map_err(|e| FilingError::Worker {
        url: job.url.clone(),
        reason: e.to_string(),
    })?;

    RunMetrics::add(&metrics.paragraphs_scanned, scanned as u64);
    debug!(
        ticker = job.ticker.as_str(),
        url = job.url.as_str(),
        paragraphs = scanned,
        matches = rows.len(),
        "Filing processed"
    );
    Ok(rows)
}

/// Run every job on a pool of at most `max_workers` tasks and merge the
/// results in completion order.
pub async fn extract_paragraph_rows(
    jobs: Vec<FilingJob>,
    cache: Arc<FilingCache>,
    classifier: Arc<KeywordClassifier>,
    config: &Config,
    metrics: Arc<RunMetrics>,
) -> Vec<ParagraphRecord> {
    let min_words = config.min_paragraph_words;
    let total = jobs.len();

    // Tasks are spawned lazily as buffer_unordered makes room, so at most
    // max_workers filings are ever in flight.
    let mut results = stream::iter(jobs)
        .map(|job| {
            let url = job.url.clone();
            let cache = cache.clone();
            let classifier = classifier.clone();
            let metrics = metrics.clone();
            let handle = tokio::spawn(async move {
                process_filing(&job, &cache, classifier, min_words, &metrics).await
            });
            async move { (url, handle.await) }
        })
        .buffer_unordered(config.max_workers.max(1));

    let mut rows = Vec::new();
    let mut done = 0usize;

    while let Some((url, joined)) = results.next().await {
        done += 1;
        let outcome = joined.unwrap_or_else(|e| {
            Err(FilingError::Worker {
                url: url.clone(),
                reason: e.to_string(),
            })
        });

        match outcome {
            Ok(records) => {
                RunMetrics::incr(&metrics.filings_processed);
                RunMetrics::add(&metrics.paragraphs_matched, records.len() as u64);
                rows.extend(records);
            }
            Err(e) => {
                RunMetrics::incr(&metrics.filings_failed);
                warn!(url = url.as_str(), error = %e, "Extraction: filing contributed no rows");
            }
        }

        if done % 50 == 0 || done == total {
            info!(done = done, total = total, rows = rows.len(), "Extraction progress");
        }
    }

    rows
}

/// Write the paragraph table. The header row is always written, so an empty
/// run still produces a file with the right columns.
pub fn write_paragraphs_csv(path: &Path, rows: &[ParagraphRecord]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(PARAGRAPH_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Extraction against any document source. Writes the paragraph table to
/// `config.output_csv` and returns the rows it wrote.
pub async fn extract_with_source(
    config: &Config,
    index_path: &Path,
    source: Arc<dyn DocumentSource>,
    metrics: Arc<RunMetrics>,
) -> Result<Vec<ParagraphRecord>, PipelineError> {
    config.ensure_dirs()?;
    let records = load_index(index_path)?;
    let jobs = prepare_jobs(records, config, &metrics);

    let classifier = Arc::new(KeywordClassifier::new(&config.keywords)?);
    let cache = Arc::new(FilingCache::new(config, source, metrics.clone()));

    info!(
        jobs = jobs.len(),
        workers = config.max_workers,
        keywords = classifier.keywords().len(),
        "⛏️  Extraction starting"
    );

    let rows = extract_paragraph_rows(jobs, cache, classifier, config, metrics.clone()).await;
    if rows.is_empty() {
        warn!("No AI paragraphs found; writing an empty table");
    }
    write_paragraphs_csv(&config.output_csv, &rows)?;

    info!(
        rows = rows.len(),
        path = %config.output_csv.display(),
        "⛏️  Extraction complete"
    );
    metrics.log_summary("extraction");
    Ok(rows)
}

/// Extraction stage entry point, against the real document host.
pub async fn run(
    config: &Config,
    index_path: Option<&Path>,
    metrics: Arc<RunMetrics>,
) -> Result<PathBuf, PipelineError> {
    let source: Arc<dyn DocumentSource> = Arc::new(HttpDocumentSource::new(config)?);
    let index_path = index_path.unwrap_or(&config.index_path);
    extract_with_source(config, index_path, source, metrics).await?;
    Ok(config.output_csv.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::stages::test_support::FakeDocumentSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const AAPL_URL: &str = "https://sec.test/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm";
    const NVDA_URL: &str = "https://sec.test/Archives/edgar/data/1045810/000104581024000029/nvda-20240128.htm";
    const XOM_URL: &str = "https://sec.test/Archives/edgar/data/34088/000003408824000018/xom-20231231.htm";

    const AAPL_HTML: &str = r#"<html><body>
        <p>We continue to invest heavily in machine learning across our products and services to improve the customer experience every year.</p>
        <p>Short AI line.</p>
        <p>Net sales increased due to higher revenue from iPhone and Services across every geographic segment we report.</p>
    </body></html>"#;

    const NVDA_HTML: &str = r#"<html><body>
        <div>Our data center platform accelerates generative AI and large language model workloads for customers in every major cloud today.</div>
    </body></html>"#;

    fn config(dir: &Path) -> Config {
        let mut config = Config::with_data_dir(dir);
        config.fetch_retry_pause = Duration::from_millis(1);
        config
    }

    fn reference(ticker: &str, date: &str, url: &str) -> Value {
        let sector = if ticker == "XOM" { "Energy" } else { "Tech" };
        json!({
            "ticker": ticker,
            "cik": "0000000001",
            "sector": sector,
            "form": "10-K",
            "filing_date": date,
            "accession": "0000000001-24-000001",
            "primary_doc": "doc.htm",
            "filing_url": url,
        })
    }

    fn write_json(path: &Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn three_filings(config: &Config) {
        write_json(
            &config.index_path,
            &json!([
                reference("AAPL", "2023-11-03", AAPL_URL),
                reference("NVDA", "2024-02-21", NVDA_URL),
                reference("XOM", "2024-02-28", XOM_URL),
            ]),
        );
    }

    fn read_csv(path: &Path) -> Vec<ParagraphRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.deserialize().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_load_index_accepts_both_shapes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        let record = reference("AAPL", "2023-11-03", AAPL_URL);

        write_json(&path, &json!([record.clone()]));
        assert_eq!(load_index(&path).unwrap(), vec![record.clone()]);

        write_json(&path, &json!({"filings": [record.clone()], "count": 1}));
        assert_eq!(load_index(&path).unwrap(), vec![record.clone()]);

        write_json(&path, &json!({"meta": {}, "items": [record.clone()]}));
        assert_eq!(load_index(&path).unwrap(), vec![record]);
    }

    #[test]
    fn test_load_index_rejects_unknown_shapes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.json");

        for bad in [json!({"results": []}), json!({"filings": "nope"}), json!(42), json!("x")] {
            write_json(&path, &bad);
            let err = load_index(&path).unwrap_err();
            assert!(
                matches!(err, PipelineError::UnrecognizedIndexShape { .. }),
                "unexpected {err:?} for {bad}"
            );
        }
    }

    #[test]
    fn test_load_index_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = load_index(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { hint: "run discover first", .. }));
    }

    #[test]
    fn test_prepare_jobs_validates_and_filters() {
        let config = config(Path::new("unused"));
        let metrics = RunMetrics::new();
        let records = vec![
            reference("AAPL", "2023-11-03", AAPL_URL),
            // aliases and a string year
            json!({"ticker": "MSFT", "sector": "Tech", "form_type": "10-Q",
                   "filed": "2022-04-26", "url": NVDA_URL, "year": "2022"}),
            // missing sector
            json!({"ticker": "GOOG", "form": "10-K", "filing_date": "2023-02-02", "filing_url": AAPL_URL}),
            // not a URL
            json!({"ticker": "META", "sector": "Tech", "form": "10-K", "filing_date": "2023-02-02", "filing_url": "not a url"}),
            // no year anywhere
            json!({"ticker": "AMZN", "sector": "Tech", "form": "10-K", "filing_date": "soon", "filing_url": AAPL_URL}),
            // outside the window
            reference("XOM", "2014-02-28", XOM_URL),
            json!("just a string"),
        ];

        let jobs = prepare_jobs(records, &config, &metrics);

        assert_eq!(
            jobs,
            vec![
                FilingJob {
                    ticker: "AAPL".into(),
                    sector: "Tech".into(),
                    form: "10-K".into(),
                    filing_date: "2023-11-03".into(),
                    url: AAPL_URL.into(),
                    year: 2023,
                },
                FilingJob {
                    ticker: "MSFT".into(),
                    sector: "Tech".into(),
                    form: "10-Q".into(),
                    filing_date: "2022-04-26".into(),
                    url: NVDA_URL.into(),
                    year: 2022,
                },
            ]
        );
        assert_eq!(metrics.filings_skipped.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_extraction_end_to_end_skips_failed_filing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config(tmp.path());
        three_filings(&config);
        let source = Arc::new(
            FakeDocumentSource::new()
                .with_page(AAPL_URL, AAPL_HTML)
                .with_page(NVDA_URL, NVDA_HTML),
        );
        let metrics = Arc::new(RunMetrics::new());

        let mut rows = extract_with_source(&config, &config.index_path, source, metrics.clone())
            .await
            .unwrap();
        rows.sort();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "AAPL");
        assert_eq!(rows[0].year, 2023);
        assert_eq!(rows[0].matched_keyword, "machine learning");
        assert!(rows[0].paragraph_text.starts_with("We continue to invest"));
        assert_eq!(rows[1].ticker, "NVDA");
        assert_eq!(rows[1].matched_keyword, "large language model");

        let mut on_disk = read_csv(&config.output_csv);
        on_disk.sort();
        assert_eq!(on_disk, rows);

        let header = std::fs::read_to_string(&config.output_csv).unwrap();
        assert!(header.starts_with("ticker,sector,year,filing_date,form,paragraph,keyword\n"));

        assert_eq!(metrics.filings_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.filings_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_served_entirely_from_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config(tmp.path());
        three_filings(&config);

        let first_source = Arc::new(
            FakeDocumentSource::new()
                .with_page(AAPL_URL, AAPL_HTML)
                .with_page(NVDA_URL, NVDA_HTML),
        );
        let mut first = extract_with_source(
            &config,
            &config.index_path,
            first_source,
            Arc::new(RunMetrics::new()),
        )
        .await
        .unwrap();

        // Knows no pages at all: only the cache can satisfy AAPL and NVDA.
        let second_source = Arc::new(FakeDocumentSource::new());
        let mut second = extract_with_source(
            &config,
            &config.index_path,
            second_source.clone(),
            Arc::new(RunMetrics::new()),
        )
        .await
        .unwrap();

        first.sort();
        second.sort();
        assert_eq!(first, second);
        // Only the never-cached XOM document goes back to the network.
        assert_eq!(second_source.calls(AAPL_URL), 0);
        assert_eq!(second_source.calls(NVDA_URL), 0);
        assert_eq!(second_source.calls(XOM_URL), 2);
    }

    #[tokio::test]
    async fn test_no_matches_still_writes_header() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config(tmp.path());
        write_json(&config.index_path, &json!({"records": [reference("XOM", "2024-02-28", XOM_URL)]}));

        let rows = extract_with_source(
            &config,
            &config.index_path,
            Arc::new(FakeDocumentSource::new()),
            Arc::new(RunMetrics::new()),
        )
        .await
        .unwrap();

        assert!(rows.is_empty());
        assert_eq!(
            std::fs::read_to_string(&config.output_csv).unwrap(),
            "ticker,sector,year,filing_date,form,paragraph,keyword\n"
        );
    }

    #[tokio::test]
    async fn test_keyword_free_documents_give_empty_table_that_loads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config(tmp.path());
        write_json(
            &config.index_path,
            &json!([
                reference("XOM", "2024-02-28", XOM_URL),
                reference("AAPL", "2023-11-03", AAPL_URL),
            ]),
        );
        let quiet = r#"<html><body>
            <p>Crude oil production increased in the Permian Basin as new wells came online during the second half of the year.</p>
        </body></html>"#;
        let source = Arc::new(
            FakeDocumentSource::new()
                .with_page(XOM_URL, quiet)
                .with_page(AAPL_URL, quiet),
        );
        let metrics = Arc::new(RunMetrics::new());

        let rows = extract_with_source(&config, &config.index_path, source, metrics.clone())
            .await
            .unwrap();

        assert!(rows.is_empty());
        assert_eq!(metrics.filings_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.filings_failed.load(Ordering::Relaxed), 0);
        assert_eq!(
            std::fs::read_to_string(&config.output_csv).unwrap(),
            "ticker,sector,year,filing_date,form,paragraph,keyword\n"
        );

        let loaded =
            crate::store::load_paragraphs(&config.output_csv, &config.store_path, &metrics).unwrap();
        assert_eq!(loaded, 0);
    }

    /// Panics on one URL, serves a fixed page for the rest.
    struct PanickingSource;

    #[async_trait]
    impl DocumentSource for PanickingSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if url == XOM_URL {
                panic!("document host exploded");
            }
            Ok(NVDA_HTML.to_string())
        }
    }

    #[tokio::test]
    async fn test_panicking_filing_is_isolated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = config(tmp.path());
        three_filings(&config);
        let metrics = Arc::new(RunMetrics::new());

        let rows = extract_with_source(
            &config,
            &config.index_path,
            Arc::new(PanickingSource),
            metrics.clone(),
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.ticker != "XOM"));
        assert_eq!(metrics.filings_failed.load(Ordering::Relaxed), 1);
    }

    /// Tracks how many fetches are in flight at once.
    #[derive(Default)]
    struct GaugeSource {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for GaugeSource {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("<p>nothing to see</p>".to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_bounds_concurrent_fetches() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = config(tmp.path());
        config.max_workers = 2;
        let index: Vec<Value> = (0..8)
            .map(|i| reference("AAPL", "2023-11-03", &format!("https://sec.test/doc{i}.htm")))
            .collect();
        write_json(&config.index_path, &Value::Array(index));

        let source = Arc::new(GaugeSource::default());
        let metrics = Arc::new(RunMetrics::new());
        extract_with_source(&config, &config.index_path, source.clone(), metrics.clone())
            .await
            .unwrap();

        assert!(source.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(metrics.filings_processed.load(Ordering::Relaxed), 8);
    }
}
