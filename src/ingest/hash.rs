//! Batch fingerprinting: the sole idempotency signal for one (chain, date)
//! unit. SHA-256 over the exact bytes of the three artifacts in the fixed
//! order stores, products, prices. Timestamps, directory listing order and
//! wall-clock time never enter the digest.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::crawl::output::{PRICES_FILE, PRODUCTS_FILE, STORES_FILE};
use crate::error::CrawlError;

/// Hashing order is part of the fingerprint definition.
pub const ARTIFACT_ORDER: [&str; 3] = [STORES_FILE, PRODUCTS_FILE, PRICES_FILE];

/// Compute the content fingerprint of one chain's artifact set.
///
/// Each file is framed with its fixed name and byte length before its
/// content, so bytes cannot shift between files without changing the
/// fingerprint. All three files must exist; a missing artifact means the
/// unit is not a complete batch and is reported as format failure rather
/// than hashed partially.
pub fn batch_fingerprint(dir: &Path) -> Result<String, CrawlError> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    for name in ARTIFACT_ORDER {
        let path = dir.join(name);
        let mut file = File::open(&path).map_err(|e| {
            CrawlError::parse_failure(
                dir.to_string_lossy(),
                format!("missing artifact {name}: {e}"),
            )
        })?;
        let len = file.metadata()?.len();
        hasher.update(name.as_bytes());
        hasher.update(len.to_be_bytes());
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_artifacts(dir: &Path, stores: &str, products: &str, prices: &str) {
        fs::write(dir.join(STORES_FILE), stores).unwrap();
        fs::write(dir.join(PRODUCTS_FILE), products).unwrap();
        fs::write(dir.join(PRICES_FILE), prices).unwrap();
    }

    #[test]
    fn identical_content_yields_identical_fingerprint() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_artifacts(a.path(), "s", "p", "c");
        write_artifacts(b.path(), "s", "p", "c");
        assert_eq!(
            batch_fingerprint(a.path()).unwrap(),
            batch_fingerprint(b.path()).unwrap()
        );
    }

    #[test]
    fn single_byte_change_changes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), "s", "p", "S1,P1,12.99,,,,\n");
        let before = batch_fingerprint(dir.path()).unwrap();
        write_artifacts(dir.path(), "s", "p", "S1,P1,13.99,,,,\n");
        let after = batch_fingerprint(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn file_order_is_fixed_not_interchangeable() {
        // Same bytes distributed differently across the three files must not
        // collide.
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_artifacts(a.path(), "xy", "z", "");
        write_artifacts(b.path(), "x", "yz", "");
        assert_ne!(
            batch_fingerprint(a.path()).unwrap(),
            batch_fingerprint(b.path()).unwrap()
        );
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STORES_FILE), "s").unwrap();
        assert!(batch_fingerprint(dir.path()).is_err());
    }
}
