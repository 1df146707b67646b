pub mod orchestrator;
pub mod output;

pub use orchestrator::{crawl, ChainOutcome, ChainStatus, CrawlOptions, CrawlSummary};
