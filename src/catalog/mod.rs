//! Version index parsing.
//!
//! The index is a JSON object keyed by version:
//!
//! ```json
//! {
//!   "1.9.3": {
//!     "stable": true,
//!     "files": [
//!       {"kind": "archive", "extension": "tar.gz", "os": "linux", "arch": "x86_64",
//!        "url": "https://.../bin/linux/x64/1.9/julia-1.9.3-linux-x86_64.tar.gz",
//!        "sha256": "..."}
//!     ]
//!   }
//! }
//! ```
//!
//! Only the top-level shape is mandatory. A version or file entry that does
//! not deserialize, or that describes something we cannot install, is skipped.

pub mod select;

use anyhow::Result;
use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::download::validate_url;
use crate::error::VermanError;
use crate::http::HttpClient;
use crate::platform::{Platform, PlatformAliases};
use crate::settings::Toolchain;

pub use select::{apply_mirror, select_package};

/// Archive extensions the installer knows how to unpack.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["tar.gz", "zip", "tar.xz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => f.write_str("sha256"),
            ChecksumAlgorithm::Sha512 => f.write_str("sha512"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

/// One platform-specific artifact of one version.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub version: String,
    pub url: String,
    pub file_name: String,
    pub platform: Platform,
    pub extension: String,
    pub checksum: Option<Checksum>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    runtime: String,
    versions: BTreeMap<String, Vec<Package>>,
}

impl VersionCatalog {
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn packages(&self, version: &str) -> Option<&[Package]> {
        self.versions.get(version).map(Vec::as_slice)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versions in ascending semantic-version order.
    pub fn sorted_versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self.versions.keys().map(String::as_str).collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        versions
    }
}

#[derive(Deserialize)]
struct RawVersion {
    #[serde(default)]
    stable: bool,
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawFile {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    extension: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    url: String,
    sha256: Option<String>,
    sha512: Option<String>,
}

/// Fetch and parse the version index of `toolchain`.
#[tracing::instrument(skip(http, toolchain), fields(runtime = %toolchain.name))]
pub async fn fetch_catalog(http: &HttpClient, toolchain: &Toolchain) -> Result<VersionCatalog> {
    let url = toolchain.index_url.as_str();
    validate_url(url)?;

    let document = http
        .get_text(url)
        .await
        .map_err(|e| VermanError::network(url, format!("{:#}", e)))?;

    parse_catalog(&toolchain.name, url, &document, &toolchain.aliases)
}

/// Parse an index document. `source_name` only appears in error messages.
pub fn parse_catalog(
    runtime: &str,
    source_name: &str,
    document: &str,
    aliases: &PlatformAliases,
) -> Result<VersionCatalog> {
    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| VermanError::parse(source_name, e.to_string()))?;

    let serde_json::Value::Object(entries) = value else {
        return Err(VermanError::parse(source_name, "expected a JSON object keyed by version").into());
    };

    let mut versions = BTreeMap::new();
    for (version, entry) in entries {
        let raw: RawVersion = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Skipping malformed version entry {}: {}", version, e);
                continue;
            }
        };
        if !raw.stable {
            continue;
        }

        let packages: Vec<Package> = raw
            .files
            .into_iter()
            .filter_map(|file| parse_package(runtime, &version, file, aliases))
            .collect();

        if packages.is_empty() {
            debug!("Version {} has no installable archives", version);
        }
        versions.insert(version, packages);
    }

    debug!("Parsed {} stable versions of {}", versions.len(), runtime);
    Ok(VersionCatalog {
        runtime: runtime.to_string(),
        versions,
    })
}

fn parse_package(
    runtime: &str,
    version: &str,
    file: serde_json::Value,
    aliases: &PlatformAliases,
) -> Option<Package> {
    let raw: RawFile = match serde_json::from_value(file) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Skipping malformed file entry of {}: {}", version, e);
            return None;
        }
    };

    if raw.kind != "archive" {
        return None;
    }
    let extension = raw.extension.trim().trim_start_matches('.').to_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        debug!("Skipping {} file with extension {:?}", version, raw.extension);
        return None;
    }
    let url = raw.url.trim();
    if url.is_empty() {
        return None;
    }
    let (Some(os), Some(arch)) = (aliases.normalize_os(&raw.os), aliases.normalize_arch(&raw.arch))
    else {
        debug!(
            "Skipping {} file for unrecognized platform {}/{}",
            version, raw.os, raw.arch
        );
        return None;
    };

    let checksum = non_empty(raw.sha256)
        .map(|digest| Checksum {
            algorithm: ChecksumAlgorithm::Sha256,
            digest,
        })
        .or_else(|| {
            non_empty(raw.sha512).map(|digest| Checksum {
                algorithm: ChecksumAlgorithm::Sha512,
                digest,
            })
        });

    Some(Package {
        version: version.to_string(),
        url: url.to_string(),
        file_name: format!("{}-{}-{}-{}.{}", runtime, version, os, arch, extension),
        platform: Platform::new(os, arch),
        extension,
        checksum,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Order version identifiers semantically.
///
/// `1.9` is treated as `1.9.0`; identifiers that are not versions at all
/// sort after every real version, lexicographically among themselves.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (lenient_semver(a), lenient_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn lenient_semver(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);

    let split_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split_at);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    semver::Version::parse(&format!("{}{}", parts.join("."), suffix)).ok()
}
