// ═══════════════════════════════════════════════════════════════
// RUN METRICS - Because if you can't measure it, it didn't happen
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for every stage. Workers bump them concurrently with no
// locks; the snapshot gets logged as JSON at the end of each stage and
// written next to the processed data after a full run.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::{DateTime, Utc};
use portable_atomic::AtomicU64;
use serde::Serialize;
use tracing::info;

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub companies_queried: u64,
    pub companies_skipped: u64,
    pub filings_discovered: u64,
    pub filings_processed: u64,
    pub filings_skipped: u64,
    pub filings_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_write_failures: u64,
    pub fetch_attempts: u64,
    pub paragraphs_scanned: u64,
    pub paragraphs_matched: u64,
    pub rows_loaded: u64,
}

/// Thread-safe atomic metrics collector
pub struct RunMetrics {
    pub companies_queried: AtomicU64,
    pub companies_skipped: AtomicU64,
    pub filings_discovered: AtomicU64,
    pub filings_processed: AtomicU64,
    pub filings_skipped: AtomicU64,
    pub filings_failed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_write_failures: AtomicU64,
    pub fetch_attempts: AtomicU64,
    pub paragraphs_scanned: AtomicU64,
    pub paragraphs_matched: AtomicU64,
    pub rows_loaded: AtomicU64,
    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            companies_queried: AtomicU64::new(0),
            companies_skipped: AtomicU64::new(0),
            filings_discovered: AtomicU64::new(0),
            filings_processed: AtomicU64::new(0),
            filings_skipped: AtomicU64::new(0),
            filings_failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_write_failures: AtomicU64::new(0),
            fetch_attempts: AtomicU64::new(0),
            paragraphs_scanned: AtomicU64::new(0),
            paragraphs_matched: AtomicU64::new(0),
            rows_loaded: AtomicU64::new(0),
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Bump a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
            companies_queried: self.companies_queried.load(Ordering::Relaxed),
            companies_skipped: self.companies_skipped.load(Ordering::Relaxed),
            filings_discovered: self.filings_discovered.load(Ordering::Relaxed),
            filings_processed: self.filings_processed.load(Ordering::Relaxed),
            filings_skipped: self.filings_skipped.load(Ordering::Relaxed),
            filings_failed: self.filings_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            paragraphs_scanned: self.paragraphs_scanned.load(Ordering::Relaxed),
            paragraphs_matched: self.paragraphs_matched.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
        }
    }

    /// Log the current snapshot as a single JSON blob.
    pub fn log_summary(&self, stage: &str) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => info!(stage = stage, metrics = %json, "📊 Stage metrics"),
            Err(e) => info!(stage = stage, error = %e, "📊 Stage metrics unavailable"),
        }
    }

    /// Persist the snapshot as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
