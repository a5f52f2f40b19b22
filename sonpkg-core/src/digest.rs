//! Content digests for package entries
//!
//! Uses SHA-256. Values carry their algorithm prefix (`sha256:<hex>`) so a
//! manifest reader never has to guess what the `md5` field holds.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::{PackageError, Result};

/// Hash a file's contents, streaming in 8KB blocks
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| PackageError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| PackageError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}
