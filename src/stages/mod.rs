// =============================================================================
// stages/mod.rs — THE ASSEMBLY LINE
// =============================================================================
//
// Four stages, run in order, each handing the next a file on disk:
//
//   discovery     registry JSON      -> sec_filings_index.json
//   extraction    index + documents  -> ai_paragraphs.csv
//   (load)        csv                -> sec_ai.sqlite
//   (report)      sqlite             -> reports/*.csv
//
// Discovery talks to data.sec.gov one company at a time. Extraction talks to
// www.sec.gov through a bounded worker pool and a disk cache. The last two
// live in store.rs because they never touch the network.
// =============================================================================

pub mod discovery;
pub mod fetch_cache;
pub mod orchestrator;
