//! Checksum verification for downloaded archives.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

use crate::catalog::{Checksum, ChecksumAlgorithm};
use crate::error::VermanError;
use crate::runtime::Runtime;

/// Hash the file at `path`, returning a lowercase hex digest.
#[tracing::instrument(skip(runtime))]
pub fn compute_digest<R: Runtime>(
    runtime: &R,
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let reader = runtime
        .open(path)
        .with_context(|| format!("Failed to open {:?} for checksum", path))?;

    match algorithm {
        ChecksumAlgorithm::Sha256 => hash_reader::<Sha256>(reader, path),
        ChecksumAlgorithm::Sha512 => hash_reader::<Sha512>(reader, path),
    }
}

fn hash_reader<D: Digest>(mut reader: Box<dyn Read + Send>, path: &Path) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {:?} for checksum", path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compare the file against `checksum`, ignoring hex case.
pub fn verify_checksum<R: Runtime>(runtime: &R, path: &Path, checksum: &Checksum) -> Result<()> {
    let actual = compute_digest(runtime, path, checksum.algorithm)?;
    let expected = checksum.digest.trim().to_lowercase();

    if actual != expected {
        return Err(VermanError::Integrity {
            path: path.to_path_buf(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}
