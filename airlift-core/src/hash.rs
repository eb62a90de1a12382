//! SHA-256 hashing utilities
//!
//! Digests are rendered as bare hex or in the `sha256:<hex>` form used by
//! OCI descriptors.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hash a byte slice, returning bare lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file's contents by streaming, returning bare lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Render a bare hex digest in OCI `sha256:<hex>` form
pub fn prefixed(hex_digest: &str) -> String {
    format!("sha256:{hex_digest}")
}
