//! Fetch & verify: bounded-time download of a package archive plus its
//! checksum check.
//!
//! Bytes go to `<dest>.part` first and are renamed onto `dest` only after
//! the transfer completed, so an interrupted download never looks like a
//! finished archive.

mod verify;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::catalog::Package;
use crate::error::VermanError;
use crate::http::HttpClient;
use crate::runtime::Runtime;

pub use verify::{compute_digest, verify_checksum};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream `url` into the file at `dest`, giving up after `timeout`.
    /// Returns the number of bytes written.
    async fn fetch_to_file(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64>;
}

pub struct HttpDownloader {
    http_client: HttpClient,
}

impl HttpDownloader {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[tracing::instrument(skip(self))]
    async fn fetch_to_file(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
        let transfer = self.http_client.download_file(url, || {
            std::fs::File::create(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))
        });

        match tokio::time::timeout(timeout, transfer).await {
            Ok(result) => result,
            Err(_) => Err(VermanError::network(
                url,
                format!("download did not finish within {} seconds", timeout.as_secs()),
            )
            .into()),
        }
    }
}

/// Reject URLs that cannot possibly be fetched before touching the network.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| VermanError::network(url, format!("invalid URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(VermanError::network(
            url,
            format!("unsupported URL scheme '{}'", parsed.scheme()),
        )
        .into());
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(VermanError::network(url, "URL has no host").into());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(u64),
    /// A verified archive from an earlier run was already at the destination.
    Reused,
}

/// Download `package` to `dest` and verify it.
///
/// On any failure nothing is left at `dest` or at the `.part` path.
#[tracing::instrument(skip(runtime, downloader, package), fields(file = %package.file_name))]
pub async fn fetch_package<R: Runtime, D: Downloader>(
    runtime: &R,
    downloader: &D,
    package: &Package,
    dest: &Path,
    timeout: Duration,
) -> Result<FetchOutcome> {
    validate_url(&package.url)?;

    if runtime.exists(dest) {
        if reusable(runtime, package, dest) {
            info!("Reusing verified archive {:?}", dest);
            return Ok(FetchOutcome::Reused);
        }
        debug!("Discarding existing archive {:?}", dest);
        runtime.remove_file(dest)?;
    }

    if let Some(parent) = dest.parent() {
        runtime.create_dir_all(parent)?;
    }

    let part = part_path(dest);
    if runtime.exists(&part) {
        runtime.remove_file(&part)?;
    }

    info!("Downloading {} ...", package.url);
    let bytes = match downloader.fetch_to_file(&package.url, &part, timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            discard(runtime, &part);
            if VermanError::find(&e).is_some() {
                return Err(e);
            }
            return Err(VermanError::network(&package.url, format!("{:#}", e)).into());
        }
    };

    if bytes == 0 {
        discard(runtime, &part);
        return Err(VermanError::network(&package.url, "server returned an empty file").into());
    }

    if let Err(e) = runtime.rename(&part, dest) {
        discard(runtime, &part);
        return Err(e);
    }

    match &package.checksum {
        Some(checksum) => {
            if let Err(e) = verify_checksum(runtime, dest, checksum) {
                discard(runtime, dest);
                return Err(e);
            }
            debug!("{} checksum verified", checksum.algorithm);
        }
        None => warn!(
            "No checksum published for {}, skipping verification",
            package.file_name
        ),
    }

    info!("Downloaded {} ({} bytes)", package.file_name, bytes);
    Ok(FetchOutcome::Downloaded(bytes))
}

/// An existing archive is only trusted if it can be verified.
fn reusable<R: Runtime>(runtime: &R, package: &Package, dest: &Path) -> bool {
    let Some(checksum) = &package.checksum else {
        return false;
    };
    match verify_checksum(runtime, dest, checksum) {
        Ok(()) => true,
        Err(e) => {
            debug!("Existing archive {:?} failed verification: {:#}", dest, e);
            false
        }
    }
}

pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn discard<R: Runtime>(runtime: &R, path: &Path) {
    if !runtime.exists(path) {
        return;
    }
    if let Err(e) = runtime.remove_file(path) {
        warn!("Failed to remove {:?}: {:#}", path, e);
    }
}
