//! Environment-driven configuration: centralized dotenv loading and getters
//! for the database DSN and artifact root. Call `init_env()` once early in
//! each binary (or rely on lazy Once).

use std::path::PathBuf;
use std::sync::Once;

use anyhow::{anyhow, Result};

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Database DSN. Prefers `DATABASE_URL`; falls back to assembling one from
/// the discrete `DB_HOST` / `DB_PORT` / `POSTGRES_DB` / `POSTGRES_USER` /
/// `POSTGRES_PASSWORD` variables used by older deployments.
pub fn db_url() -> Result<String> {
    init_env();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }

    let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = std::env::var("POSTGRES_DB").ok();
    let user = std::env::var("POSTGRES_USER").ok();
    let pass = std::env::var("POSTGRES_PASSWORD").ok();

    match (name, user, pass) {
        (Some(name), Some(user), Some(pass)) => {
            Ok(format!("postgres://{user}:{pass}@{host}:{port}/{name}"))
        }
        _ => Err(anyhow!(
            "missing DATABASE_URL (or POSTGRES_DB/POSTGRES_USER/POSTGRES_PASSWORD)"
        )),
    }
}

/// Maximum DB pool size; small by default, the pipeline is batch-oriented.
pub fn db_max_connections() -> u32 {
    init_env();
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
}

/// Root directory for crawl artifacts when the CLI does not override it.
pub fn artifact_root() -> PathBuf {
    init_env();
    std::env::var("CRAWL_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}
