//! Daily retail price crawler and ingester for Croatian grocery chains.
//!
//! The crawl half fetches each chain's published price lists for a date and
//! writes a normalized CSV artifact set per chain; the ingest half loads
//! those artifacts into Postgres idempotently, keyed by a content
//! fingerprint per (chain, date) batch.

pub mod chains;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;

pub use chains::{ChainAdapter, ChainRegistry};
pub use crawl::{crawl, ChainOutcome, ChainStatus, CrawlOptions, CrawlSummary};
pub use db::Db;
pub use error::CrawlError;
pub use ingest::{batch_identifier, ingest_batch, ingest_run, BatchCounts, BatchOutcome};
