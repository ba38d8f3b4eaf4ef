// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every knob the pipeline has lives here: which forms we care about, which
// years, how long we nap between registry calls, how many workers we let
// loose on the document host, and which buzzwords count as "AI".
//
// All values can be overridden via AI_FILINGS_* environment variables (or a
// .env file). Tests skip the environment entirely and build a Config rooted
// in a temp directory with `Config::with_data_dir`.
//
// Defaults were chosen through the usual rigorous process of "that is what
// the SEC tolerates without sending us a strongly worded 403."
// =============================================================================

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;

/// Forms we pull from the registry unless told otherwise.
const DEFAULT_FORMS: &[&str] = &["10-K", "10-Q", "20-F", "40-F", "6-K", "8-K"];

/// The canonical keyword list. Order matters: when a paragraph mentions more
/// than one of these, the earliest entry in this list is the one reported.
pub const DEFAULT_AI_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural network",
    "neural networks",
    "large language model",
    "large language models",
    "llm",
    "llms",
    "generative ai",
    "gen ai",
    "foundation model",
    "foundation models",
    "computer vision",
    "reinforcement learning",
    "ai-powered",
    "ai powered",
    "ai-driven",
    "ai driven",
    "predictive analytics",
    "algorithmic trading",
];

/// The Grand Configuration Struct. Constructed once at startup and handed
/// to every stage explicitly; nothing in the pipeline reads the environment
/// on its own.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // FILESYSTEM LAYOUT
    // =========================================================================

    /// Root of everything we write. Default: ./data
    pub data_dir: PathBuf,

    /// Raw artifacts: the discovery index and the HTML cache.
    pub raw_dir: PathBuf,

    /// Processed artifacts: the paragraph CSV, the SQLite store, run metrics.
    pub processed_dir: PathBuf,

    /// Content cache for fetched filing documents, keyed by URL hash.
    pub cache_dir: PathBuf,

    /// The discovery index, the only thing discovery hands to extraction.
    pub index_path: PathBuf,

    /// The paragraph table written by extraction.
    pub output_csv: PathBuf,

    /// The analytical store the load stage replaces on every run.
    pub store_path: PathBuf,

    /// Where the report stage drops its summary tables.
    pub reports_dir: PathBuf,

    /// Optional JSON file that replaces the built-in company universe.
    pub universe_path: Option<PathBuf>,

    // =========================================================================
    // REGISTRY (DISCOVERY) SETTINGS
    // =========================================================================

    /// Per-company submissions endpoint. The padded CIK and ".json" are
    /// appended to this.
    pub submissions_base_url: String,

    /// Base of the filing archive the document URLs point into.
    pub archives_base_url: String,

    /// The SEC wants a descriptive User-Agent with contact details. This is
    /// their policy, not a suggestion.
    pub user_agent: String,

    /// Pause between successive per-company registry calls. Default: 200ms.
    pub registry_delay: Duration,

    /// Timeout on a single registry call. Default: 15 seconds.
    pub registry_timeout: Duration,

    /// Form allow-list.
    pub forms: Vec<String>,

    /// Inclusive year window.
    pub start_year: i32,
    pub end_year: i32,

    // =========================================================================
    // DOCUMENT FETCH SETTINGS
    // =========================================================================

    /// Timeout on a single document fetch. Default: 20 seconds.
    pub fetch_timeout: Duration,

    /// Total attempts per document before we declare it unavailable.
    pub fetch_max_attempts: u32,

    /// Pause between fetch attempts. Default: 300ms.
    pub fetch_retry_pause: Duration,

    /// Worker pool size for extraction. This is the cap on simultaneous
    /// requests to the document host.
    pub max_workers: usize,

    // =========================================================================
    // TEXT CLASSIFICATION
    // =========================================================================

    /// Paragraphs shorter than this many words never reach the classifier.
    pub min_paragraph_words: usize,

    /// Ordered keyword list. Earlier entries win ties.
    pub keywords: Vec<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Every parameter can be overridden via an environment variable
    /// prefixed with AI_FILINGS_.
    pub fn from_env() -> Self {
        // Try to load .env file if it exists. Fail silently if it doesn't.
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(env_or_default("AI_FILINGS_DATA_DIR", "data"));
        let mut config = Config::with_data_dir(&data_dir);

        if let Ok(path) = env::var("AI_FILINGS_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("AI_FILINGS_OUTPUT_CSV") {
            config.output_csv = PathBuf::from(path);
        }
        if let Ok(path) = env::var("AI_FILINGS_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        config.universe_path = env::var("AI_FILINGS_UNIVERSE_PATH").ok().map(PathBuf::from);

        config.submissions_base_url =
            env_or_default("AI_FILINGS_SUBMISSIONS_URL", &config.submissions_base_url);
        config.archives_base_url =
            env_or_default("AI_FILINGS_ARCHIVES_URL", &config.archives_base_url);
        config.user_agent = env_or_default("AI_FILINGS_USER_AGENT", &config.user_agent);

        config.registry_delay = Duration::from_millis(
            env_or_default("AI_FILINGS_REGISTRY_DELAY_MS", "200").parse().unwrap_or(200),
        );
        config.registry_timeout = Duration::from_secs(
            env_or_default("AI_FILINGS_REGISTRY_TIMEOUT_SECS", "15").parse().unwrap_or(15),
        );
        config.fetch_timeout = Duration::from_secs(
            env_or_default("AI_FILINGS_FETCH_TIMEOUT_SECS", "20").parse().unwrap_or(20),
        );
        config.fetch_max_attempts = env_or_default("AI_FILINGS_FETCH_ATTEMPTS", "2")
            .parse::<u32>()
            .unwrap_or(2)
            .max(1);
        config.fetch_retry_pause = Duration::from_millis(
            env_or_default("AI_FILINGS_FETCH_RETRY_PAUSE_MS", "300").parse().unwrap_or(300),
        );
        config.max_workers = env_or_default("AI_FILINGS_MAX_WORKERS", "6")
            .parse::<usize>()
            .unwrap_or(6)
            .max(1);

        if let Ok(forms) = env::var("AI_FILINGS_FORMS") {
            let forms = parse_list(&forms, false);
            if !forms.is_empty() {
                config.forms = forms;
            }
        }
        config.start_year = env_or_default("AI_FILINGS_START_YEAR", "2015").parse().unwrap_or(2015);
        config.end_year = env_or_default("AI_FILINGS_END_YEAR", "2025").parse().unwrap_or(2025);

        config.min_paragraph_words = env_or_default("AI_FILINGS_MIN_WORDS", "15")
            .parse()
            .unwrap_or(15);
        if let Ok(keywords) = env::var("AI_FILINGS_KEYWORDS") {
            let keywords = parse_list(&keywords, true);
            if !keywords.is_empty() {
                config.keywords = keywords;
            }
        }

        config.log_json = matches!(
            env_or_default("AI_FILINGS_LOG_JSON", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        config
    }

    /// Default configuration with every path rooted at `data_dir`.
    /// No environment variables are consulted.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let raw_dir = data_dir.join("raw");
        let processed_dir = data_dir.join("processed");

        Config {
            cache_dir: raw_dir.join("html_cache"),
            index_path: raw_dir.join("sec_filings_index.json"),
            output_csv: processed_dir.join("ai_paragraphs.csv"),
            store_path: processed_dir.join("sec_ai.sqlite"),
            reports_dir: data_dir.join("reports"),
            universe_path: None,
            raw_dir,
            processed_dir,
            data_dir,

            submissions_base_url: "https://data.sec.gov/submissions/CIK".to_string(),
            archives_base_url: "https://www.sec.gov/Archives/edgar/data".to_string(),
            user_agent: "ai-filing-engine/1.0 (contact@example.org)".to_string(),
            registry_delay: Duration::from_millis(200),
            registry_timeout: Duration::from_secs(15),
            forms: DEFAULT_FORMS.iter().map(|f| f.to_string()).collect(),
            start_year: 2015,
            end_year: 2025,

            fetch_timeout: Duration::from_secs(20),
            fetch_max_attempts: 2,
            fetch_retry_pause: Duration::from_millis(300),
            max_workers: 6,

            min_paragraph_words: 15,
            keywords: DEFAULT_AI_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            log_json: false,
        }
    }

    /// Create the directories every stage writes into. Failing here is fatal:
    /// there is no point fetching a thousand filings we cannot store.
    pub fn ensure_dirs(&self) -> Result<(), PipelineError> {
        let mut dirs = vec![
            self.raw_dir.clone(),
            self.processed_dir.clone(),
            self.cache_dir.clone(),
        ];
        for file in [&self.index_path, &self.output_csv, &self.store_path] {
            if let Some(parent) = file.parent() {
                dirs.push(parent.to_path_buf());
            }
        }

        for dir in dirs {
            if dir.as_os_str().is_empty() {
                continue;
            }
            std::fs::create_dir_all(&dir)
                .map_err(|source| PipelineError::OutputDir { path: dir.clone(), source })?;
        }
        Ok(())
    }

    /// Is `form` on the allow-list?
    pub fn form_allowed(&self, form: &str) -> bool {
        self.forms.iter().any(|f| f == form)
    }

    /// Is `year` inside the configured inclusive window?
    pub fn year_in_window(&self, year: i32) -> bool {
        self.start_year <= year && year <= self.end_year
    }
}

/// Helper function to read an environment variable with a default fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Split a comma-separated list, trimming entries and dropping empties.
fn parse_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}
