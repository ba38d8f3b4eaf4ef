// =============================================================================
// store.rs — WHERE THE PARAGRAPHS GO TO BE COUNTED
// =============================================================================
//
// The last two stages never touch the network.
//
//   load    ai_paragraphs.csv -> sec_ai.sqlite
//           Drops and recreates the paragraph table on every load. There
//           is no merge. If you want yesterday's numbers, keep yesterday's
//           file. A per-(year, sector, ticker) summary table is rebuilt in
//           the same transaction.
//
//   report  sec_ai.sqlite -> reports/*.csv
//           Five group-bys over a year window. Somebody else can draw the
//           charts.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::metrics::RunMetrics;
use crate::models::{ParagraphRecord, PARAGRAPH_COLUMNS};

/// How many tickers the leaderboard keeps.
const TOP_TICKERS: usize = 15;

const CREATE_PARAGRAPHS: &str = "
    DROP TABLE IF EXISTS ai_paragraphs;
    CREATE TABLE ai_paragraphs (
        ticker      TEXT    NOT NULL,
        sector      TEXT    NOT NULL,
        year        INTEGER NOT NULL,
        filing_date TEXT    NOT NULL,
        form        TEXT    NOT NULL,
        paragraph   TEXT    NOT NULL,
        keyword     TEXT    NOT NULL
    );
";

const INSERT_PARAGRAPH: &str = "
    INSERT INTO ai_paragraphs (ticker, sector, year, filing_date, form, paragraph, keyword)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

const CREATE_SUMMARY: &str = "
    DROP TABLE IF EXISTS ai_counts_year_sector_ticker;
    CREATE TABLE ai_counts_year_sector_ticker AS
    SELECT year, sector, ticker, COUNT(*) AS ai_paragraph_count
    FROM ai_paragraphs
    GROUP BY year, sector, ticker
    ORDER BY year, sector, ticker;
";

/// Replace the store's paragraph table with the contents of `csv_path`.
/// Returns the number of rows loaded; zero is a perfectly good answer.
pub fn load_paragraphs(
    csv_path: &Path,
    store_path: &Path,
    metrics: &RunMetrics,
) -> Result<usize, PipelineError> {
    if !csv_path.exists() {
        return Err(PipelineError::MissingInput {
            path: csv_path.to_path_buf(),
            hint: "run extract first",
        });
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let missing: Vec<String> = PARAGRAPH_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h.trim() == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch { missing });
    }

    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut conn = Connection::open(store_path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_PARAGRAPHS)?;

    let mut loaded = 0usize;
    {
        let mut insert = tx.prepare(INSERT_PARAGRAPH)?;
        for row in reader.deserialize::<ParagraphRecord>() {
            let row = row?;
            insert.execute(params![
                row.ticker,
                row.sector,
                row.year,
                row.filing_date,
                row.form,
                row.paragraph_text,
                row.matched_keyword,
            ])?;
            loaded += 1;
        }
    }

    tx.execute_batch(CREATE_SUMMARY)?;
    tx.commit()?;

    RunMetrics::add(&metrics.rows_loaded, loaded as u64);
    info!(
        rows = loaded,
        store = %store_path.display(),
        "🗄️  Paragraph table replaced"
    );
    Ok(loaded)
}

// =============================================================================
// Report tables
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSectorCount {
    pub year: i32,
    pub sector: String,
    pub ai_paragraph_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerCount {
    pub ticker: String,
    pub sector: String,
    pub ai_paragraph_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSectorCount {
    pub form: String,
    pub sector: String,
    pub ai_paragraph_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorShare {
    pub year: i32,
    pub sector: String,
    pub ai_paragraph_count: i64,
    pub ai_paragraph_count_total: i64,
    pub share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageWordCount {
    pub year: i32,
    pub sector: String,
    pub avg_word_count: f64,
}

/// Everything the report stage computes for one year window.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub by_year_sector: Vec<YearSectorCount>,
    pub top_tickers: Vec<TickerCount>,
    pub by_form_sector: Vec<FormSectorCount>,
    pub sector_share: Vec<SectorShare>,
    pub avg_word_count: Vec<AverageWordCount>,
}

/// Run the report queries for `[start, end]`. An empty year/sector table
/// means the load stage never ran or loaded nothing in range, and is fatal.
pub fn query_report(conn: &Connection, start: i32, end: i32) -> Result<Report, PipelineError> {
    let by_year_sector = conn
        .prepare(
            "SELECT year, sector, COUNT(*) AS ai_paragraph_count
             FROM ai_paragraphs
             WHERE year BETWEEN ?1 AND ?2
             GROUP BY year, sector
             ORDER BY year, sector",
        )?
        .query_map(params![start, end], |row| {
            Ok(YearSectorCount {
                year: row.get(0)?,
                sector: row.get(1)?,
                ai_paragraph_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if by_year_sector.is_empty() {
        return Err(PipelineError::EmptyReport { start, end });
    }

    let top_tickers = conn
        .prepare(
            "SELECT ticker, sector, COUNT(*) AS ai_paragraph_count
             FROM ai_paragraphs
             WHERE year BETWEEN ?1 AND ?2
             GROUP BY ticker, sector
             ORDER BY ai_paragraph_count DESC, ticker
             LIMIT ?3",
        )?
        .query_map(params![start, end, TOP_TICKERS as i64], |row| {
            Ok(TickerCount {
                ticker: row.get(0)?,
                sector: row.get(1)?,
                ai_paragraph_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let by_form_sector = conn
        .prepare(
            "SELECT form, sector, COUNT(*) AS ai_paragraph_count
             FROM ai_paragraphs
             WHERE year BETWEEN ?1 AND ?2
             GROUP BY form, sector
             ORDER BY ai_paragraph_count DESC, form, sector",
        )?
        .query_map(params![start, end], |row| {
            Ok(FormSectorCount {
                form: row.get(0)?,
                sector: row.get(1)?,
                ai_paragraph_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Word count approximated as spaces + 1, same as every spreadsheet ever.
    let avg_word_count = conn
        .prepare(
            "SELECT year, sector,
                    AVG(LENGTH(paragraph) - LENGTH(REPLACE(paragraph, ' ', '')) + 1) AS avg_word_count
             FROM ai_paragraphs
             WHERE year BETWEEN ?1 AND ?2
             GROUP BY year, sector
             ORDER BY year, sector",
        )?
        .query_map(params![start, end], |row| {
            Ok(AverageWordCount {
                year: row.get(0)?,
                sector: row.get(1)?,
                avg_word_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let sector_share = sector_share(&by_year_sector);

    Ok(Report {
        by_year_sector,
        top_tickers,
        by_form_sector,
        sector_share,
        avg_word_count,
    })
}

/// Each sector's percentage of that year's AI paragraphs.
pub fn sector_share(rows: &[YearSectorCount]) -> Vec<SectorShare> {
    let mut totals: BTreeMap<i32, i64> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.year).or_default() += row.ai_paragraph_count;
    }

    rows.iter()
        .map(|row| {
            let total = totals.get(&row.year).copied().unwrap_or(0);
            let share_percent = if total == 0 {
                0.0
            } else {
                100.0 * row.ai_paragraph_count as f64 / total as f64
            };
            SectorShare {
                year: row.year,
                sector: row.sector.clone(),
                ai_paragraph_count: row.ai_paragraph_count,
                ai_paragraph_count_total: total,
                share_percent,
            }
        })
        .collect()
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Query the store and write the five summary tables into `reports_dir`.
pub fn report(
    store_path: &Path,
    reports_dir: &Path,
    start: i32,
    end: i32,
) -> Result<Vec<PathBuf>, PipelineError> {
    if !store_path.exists() {
        return Err(PipelineError::MissingInput {
            path: store_path.to_path_buf(),
            hint: "run load first",
        });
    }
    std::fs::create_dir_all(reports_dir).map_err(|source| PipelineError::OutputDir {
        path: reports_dir.to_path_buf(),
        source,
    })?;

    let conn = Connection::open_with_flags(store_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let report = query_report(&conn, start, end)?;

    let paths = vec![
        reports_dir.join("ai_trends_by_sector.csv"),
        reports_dir.join("ai_paragraphs_top_tickers.csv"),
        reports_dir.join("ai_paragraphs_by_form_and_sector.csv"),
        reports_dir.join("ai_sector_share_percent.csv"),
        reports_dir.join("ai_avg_paragraph_length.csv"),
    ];
    write_table(&paths[0], &report.by_year_sector)?;
    write_table(&paths[1], &report.top_tickers)?;
    write_table(&paths[2], &report.by_form_sector)?;
    write_table(&paths[3], &report.sector_share)?;
    write_table(&paths[4], &report.avg_word_count)?;

    info!(
        start = start,
        end = end,
        tables = paths.len(),
        dir = %reports_dir.display(),
        "📈 Reports written"
    );
    Ok(paths)
}

/// Load stage entry point.
pub fn run_load(
    config: &Config,
    csv_path: Option<&Path>,
    metrics: &RunMetrics,
) -> Result<usize, PipelineError> {
    let csv_path = csv_path.unwrap_or(&config.output_csv);
    load_paragraphs(csv_path, &config.store_path, metrics)
}

/// Report stage entry point. The window defaults to the configured one.
pub fn run_report(
    config: &Config,
    start: Option<i32>,
    end: Option<i32>,
) -> Result<Vec<PathBuf>, PipelineError> {
    report(
        &config.store_path,
        &config.reports_dir,
        start.unwrap_or(config.start_year),
        end.unwrap_or(config.end_year),
    )
}
