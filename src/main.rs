use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use cijene::{
    config, crawl, ingest_run, logging, BatchOutcome, ChainRegistry, CrawlOptions, Db,
};

#[derive(Parser)]
#[command(name = "cijene", about = "Crawl and ingest daily retail price lists")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl chain price lists into CSV artifacts, then import them.
    Crawl {
        /// Artifact root directory; artifacts land under <root>/<date>/<chain>/.
        root: Option<PathBuf>,
        /// Date to crawl, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Comma-separated chain names; defaults to every registered chain.
        #[arg(long, value_delimiter = ',')]
        chains: Option<Vec<String>>,
        /// How many chains to crawl in parallel.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Write artifacts only, skip the database import.
        #[arg(long)]
        skip_import: bool,
    },
    /// Import previously crawled artifacts into the database.
    Import {
        /// Artifact root directory.
        root: Option<PathBuf>,
        /// Date to import, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Comma-separated chain names; defaults to every chain directory
        /// found under <root>/<date>/.
        #[arg(long, value_delimiter = ',')]
        chains: Option<Vec<String>>,
    },
    /// Print the registered chain names.
    ListChains,
}

fn validate_chains(registry: &ChainRegistry, selection: &Option<Vec<String>>) -> Result<()> {
    if let Some(names) = selection {
        let known = registry.names();
        for name in names {
            if !known.contains(&name.as_str()) {
                anyhow::bail!("unknown chain {name:?}; known chains: {}", known.join(", "));
            }
        }
    }
    Ok(())
}

async fn connect_db() -> Result<Db> {
    let url = config::db_url()?;
    let db = Db::connect(&url, config::db_max_connections()).await?;
    db.ensure_schema().await?;
    Ok(db)
}

async fn import(root: &PathBuf, date: NaiveDate, chains: Option<&[String]>) -> Result<bool> {
    let db = connect_db().await?;
    let outcomes = ingest_run(&db, root, date, chains).await?;
    for (chain, outcome) in &outcomes {
        match outcome {
            BatchOutcome::Unchanged => info!(chain, %date, "unchanged"),
            BatchOutcome::Committed(counts) => {
                info!(
                    chain,
                    %date,
                    stores = counts.stores,
                    products = counts.products,
                    prices = counts.prices,
                    "imported"
                );
            }
            BatchOutcome::Failed(reason) => error!(chain, %date, reason, "import failed"),
        }
    }
    Ok(!outcomes.is_empty()
        && !outcomes
            .iter()
            .all(|(_, o)| matches!(o, BatchOutcome::Failed(_))))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    config::init_env();
    logging::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let registry = ChainRegistry::with_all_chains()?;

    match cli.command {
        Command::ListChains => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Crawl {
            root,
            date,
            chains,
            concurrency,
            skip_import,
        } => {
            validate_chains(&registry, &chains)?;
            let root = root.unwrap_or_else(config::artifact_root);
            let date = date.unwrap_or_else(|| Utc::now().date_naive());

            let mut options = CrawlOptions::for_date(date);
            options.chains = chains.clone();
            options.concurrency = concurrency;
            let summary = crawl(&registry, &root, &options).await;

            for outcome in &summary.outcomes {
                info!(
                    chain = %outcome.chain,
                    status = ?outcome.status,
                    stores = outcome.n_stores,
                    products = outcome.n_products,
                    prices = outcome.n_prices,
                    "chain result"
                );
            }
            if summary.outcomes.is_empty() || summary.all_failed() {
                error!(%date, "crawl produced nothing");
                return Ok(ExitCode::FAILURE);
            }

            if skip_import {
                return Ok(ExitCode::SUCCESS);
            }
            // Only import chains that actually produced artifacts.
            let crawled: Vec<String> = summary
                .outcomes
                .iter()
                .filter(|o| !o.status.is_failed())
                .map(|o| o.chain.clone())
                .collect();
            match import(&root, date, Some(&crawled)).await {
                Ok(true) => Ok(ExitCode::SUCCESS),
                Ok(false) => Ok(ExitCode::FAILURE),
                Err(e) => {
                    // Artifacts are on disk; a later `import` run can pick
                    // them up, so a missing database is not a crawl failure.
                    warn!(error = %e, "import skipped, artifacts remain on disk");
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Command::Import { root, date, chains } => {
            validate_chains(&registry, &chains)?;
            let root = root.unwrap_or_else(config::artifact_root);
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let ok = import(&root, date, chains.as_deref()).await?;
            Ok(if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
