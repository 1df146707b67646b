//! Crawl orchestration: fan out over the selected chains with a bounded
//! worker pool, isolate per-chain failures, and materialize artifacts.
//! The orchestrator itself never fails as a unit; a whole-run failure is
//! "all chains failed".

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::chains::{ChainAdapter, ChainRegistry};
use crate::crawl::output::{chain_dir, save_chain};
use crate::model::ChainSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Completed,
    CompletedWithWarnings(String),
    Failed(String),
}

impl ChainStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, ChainStatus::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub chain: String,
    pub status: ChainStatus,
    pub n_stores: usize,
    pub n_products: usize,
    pub n_prices: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub date: NaiveDate,
    pub outcomes: Vec<ChainOutcome>,
}

impl CrawlSummary {
    /// Whole-run failure: every attempted chain failed.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.status.is_failed())
    }
}

#[derive(Clone)]
pub struct CrawlOptions {
    pub date: NaiveDate,
    /// Chains to crawl; None means every registered chain.
    pub chains: Option<Vec<String>>,
    /// Bounded worker pool width.
    pub concurrency: usize,
    /// Checked before each chain is started; an in-flight chain always runs
    /// to completion.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl CrawlOptions {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            chains: None,
            concurrency: 4,
            cancel: None,
        }
    }
}

/// Crawl one chain: invoke the three adapter operations, write the artifact
/// set, and report a status. Never panics or propagates adapter errors.
async fn crawl_chain(
    adapter: Arc<dyn ChainAdapter>,
    date: NaiveDate,
    root: &Path,
) -> ChainOutcome {
    let chain = adapter.chain().to_string();
    let started = Instant::now();
    info!(chain = %chain, %date, "starting crawl");

    let failed = |reason: String, elapsed: Duration| {
        error!(chain = %chain, %date, reason = %reason, "crawl failed");
        ChainOutcome {
            chain: chain.clone(),
            status: ChainStatus::Failed(reason),
            n_stores: 0,
            n_products: 0,
            n_prices: 0,
            elapsed,
        }
    };

    let stores = match adapter.list_stores(date).await {
        Ok(stores) => stores,
        Err(e) => return failed(e.to_string(), started.elapsed()),
    };
    if stores.is_empty() {
        return failed("no stores in source".to_string(), started.elapsed());
    }
    let products = match adapter.list_products(date).await {
        Ok(products) => products,
        Err(e) => return failed(e.to_string(), started.elapsed()),
    };
    let prices = match adapter.list_prices(date).await {
        Ok(prices) => prices,
        Err(e) => return failed(e.to_string(), started.elapsed()),
    };

    let snapshot = ChainSnapshot {
        stores,
        products,
        prices,
    };
    let dir = chain_dir(root, date, adapter.chain());
    if let Err(e) = save_chain(&dir, adapter.chain(), &snapshot) {
        return failed(format!("writing artifacts: {e}"), started.elapsed());
    }

    let status = if snapshot.products.is_empty() {
        warn!(chain = %chain, %date, "empty catalog day");
        ChainStatus::CompletedWithWarnings("empty catalog".to_string())
    } else {
        ChainStatus::Completed
    };

    let outcome = ChainOutcome {
        n_stores: snapshot.stores.len(),
        n_products: snapshot.products.len(),
        n_prices: snapshot.prices.len(),
        elapsed: started.elapsed(),
        status,
        chain,
    };
    info!(
        chain = %outcome.chain,
        stores = outcome.n_stores,
        products = outcome.n_products,
        prices = outcome.n_prices,
        elapsed_s = outcome.elapsed.as_secs_f64(),
        "crawl finished"
    );
    outcome
}

/// Run the crawl for one date over the selected chains.
///
/// Adapters run independently on a bounded pool; one chain's failure never
/// stops the others. The returned summary carries one outcome per attempted
/// chain; chains skipped by cancellation are simply absent.
pub async fn crawl(
    registry: &ChainRegistry,
    root: &Path,
    options: &CrawlOptions,
) -> CrawlSummary {
    let adapters: Vec<Arc<dyn ChainAdapter>> = match &options.chains {
        Some(names) => names
            .iter()
            .filter_map(|name| {
                let adapter = registry.get(name);
                if adapter.is_none() {
                    error!(chain = %name, "unknown chain, skipping");
                }
                adapter
            })
            .collect(),
        None => registry.iter().cloned().collect(),
    };

    let cancel = options.cancel.clone();
    let started = Instant::now();
    let outcomes: Vec<ChainOutcome> = stream::iter(adapters)
        .map(|adapter| {
            let cancel = cancel.clone();
            async move {
                if let Some(flag) = &cancel {
                    if flag.load(Ordering::SeqCst) {
                        info!(chain = adapter.chain(), "cancelled before start");
                        return None;
                    }
                }
                Some(crawl_chain(adapter, options.date, root).await)
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .filter_map(|outcome| async move { outcome })
        .collect()
        .await;

    info!(
        date = %options.date,
        chains = outcomes.len(),
        failed = outcomes.iter().filter(|o| o.status.is_failed()).count(),
        elapsed_s = started.elapsed().as_secs_f64(),
        "crawl run finished"
    );

    CrawlSummary {
        date: options.date,
        outcomes,
    }
}
