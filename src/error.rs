use thiserror::Error;

/// Failure taxonomy for the crawl/ingest pipeline.
///
/// Adapter failures (`SourceUnavailable`, `ParseFailure`) are converted to a
/// per-chain status by the orchestrator and never propagate process-fatally.
/// Ingestion failures abort only their own batch transaction.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The retailer's data source could not be reached. Transient; the run
    /// continues with the remaining chains and the next scheduled invocation
    /// retries naturally.
    #[error("{chain}: source unavailable: {reason}")]
    SourceUnavailable { chain: &'static str, reason: String },

    /// The source responded but its shape has drifted from what the adapter
    /// expects, or an artifact on disk is unreadable/unparsable.
    #[error("{chain}: parse failure: {detail}")]
    ParseFailure { chain: String, detail: String },

    /// Storage-layer error during a batch commit. The transaction is rolled
    /// back and the ledger left untouched, so the unit is retryable.
    #[error("transaction failure: {0}")]
    Transaction(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    pub fn source_unavailable(chain: &'static str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            chain,
            reason: reason.into(),
        }
    }

    pub fn parse_failure(chain: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ParseFailure {
            chain: chain.into(),
            detail: detail.into(),
        }
    }
}
