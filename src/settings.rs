//! Persisted settings and the per-runtime [`Toolchain`] built from them.
//!
//! Settings live in `<base>/config.json`. The file is created with defaults
//! the first time any command runs, so operators have something to edit.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::envcfg::EnvEntry;
use crate::platform::PlatformAliases;
use crate::runtime::Runtime;

pub const SETTINGS_FILE: &str = "config.json";

/// 100 minutes, enough for the largest runtime archives on slow links.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 6000;

const JULIA_INDEX_URL: &str = "https://julialang-s3.julialang.net/bin/versions.json";
const JULIA_PKG_SERVER: &str = "https://pkg.julialang.org";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub download_timeout_secs: u64,
    pub runtimes: BTreeMap<String, RuntimeSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut runtimes = BTreeMap::new();
        runtimes.insert("julia".to_string(), RuntimeSettings::julia());
        Self {
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            runtimes,
        }
    }
}

/// How one runtime family is discovered, installed and exposed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSettings {
    /// URL of the JSON version index.
    pub index_url: String,

    /// Base URL replacing everything before `mirror_marker` in artifact URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_url: Option<String>,

    #[serde(default = "default_mirror_marker")]
    pub mirror_marker: String,

    /// Name of the directory whose parent is the binary root.
    #[serde(default = "default_binary_marker")]
    pub binary_marker: String,

    /// Variables exported when the runtime is first activated.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Directories under the active-version link prepended to PATH.
    #[serde(default = "default_path_entries")]
    pub path_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub os_aliases: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arch_aliases: BTreeMap<String, String>,
}

fn default_mirror_marker() -> String {
    "bin/".to_string()
}

fn default_binary_marker() -> String {
    "bin".to_string()
}

fn default_path_entries() -> Vec<String> {
    vec!["bin".to_string()]
}

impl RuntimeSettings {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
            mirror_url: None,
            mirror_marker: default_mirror_marker(),
            binary_marker: default_binary_marker(),
            env: BTreeMap::new(),
            path_entries: default_path_entries(),
            os_aliases: BTreeMap::new(),
            arch_aliases: BTreeMap::new(),
        }
    }

    pub fn julia() -> Self {
        let mut settings = Self::new(JULIA_INDEX_URL);
        settings
            .env
            .insert("JULIA_PKG_SERVER".to_string(), JULIA_PKG_SERVER.to_string());
        settings
            .os_aliases
            .insert("mac".to_string(), "macos".to_string());
        settings
            .os_aliases
            .insert("winnt".to_string(), "windows".to_string());
        settings
    }
}

impl Settings {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Load settings from `path`, writing the defaults there if it is missing.
    #[tracing::instrument(skip(runtime))]
    pub fn load_or_init<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if runtime.exists(path) {
            debug!("Loading settings from {:?}", path);
            let content = runtime.read_to_string(path)?;
            let settings: Settings = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse settings file {:?}", path))?;
            return Ok(settings);
        }

        info!("Writing default settings to {:?}", path);
        let settings = Settings::default();
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&settings)?;
        runtime.write(path, json.as_bytes())?;
        Ok(settings)
    }

    /// Build the toolchain for `name` rooted under `base`.
    pub fn toolchain(&self, name: &str, base: &Path) -> Result<Toolchain> {
        validate_runtime_name(name)?;
        let Some(runtime_settings) = self.runtimes.get(name) else {
            let known: Vec<&str> = self.runtimes.keys().map(String::as_str).collect();
            bail!(
                "Unknown runtime '{}'. Configured runtimes: {}",
                name,
                if known.is_empty() {
                    "(none)".to_string()
                } else {
                    known.join(", ")
                }
            );
        };
        Ok(Toolchain::new(name, base, runtime_settings))
    }
}

fn validate_runtime_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!(
            "Invalid runtime name '{}': only letters, digits, '-' and '_' are allowed",
            name
        );
    }
    Ok(())
}

/// Reject version identifiers that would not name a single directory entry
/// under `untar/`.
pub fn validate_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && version != "."
        && version != ".."
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if !valid {
        bail!(
            "Invalid version '{}': only letters, digits, '.', '_', '+' and '-' are allowed",
            version
        );
    }
    Ok(())
}

/// Mirror rewrite rule for artifact URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct Mirror {
    pub base_url: String,
    pub marker: String,
}

/// One runtime family with all of its paths resolved.
///
/// ```text
/// <base>/<name>/
///   current -> untar/<version>/<binary root>
///   active.json
///   tar/<name>-<version>-<os>-<arch>.<ext>
///   untar/<version>/
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    pub name: String,
    pub base: PathBuf,
    pub home: PathBuf,
    pub root_dir: PathBuf,
    pub tar_dir: PathBuf,
    pub untar_dir: PathBuf,
    pub marker_path: PathBuf,
    pub index_url: String,
    pub mirror: Option<Mirror>,
    pub binary_marker: String,
    pub aliases: PlatformAliases,
    env: BTreeMap<String, String>,
    path_entries: Vec<String>,
}

impl Toolchain {
    pub fn new(name: &str, base: &Path, settings: &RuntimeSettings) -> Self {
        let home = base.join(name);
        Self {
            name: name.to_string(),
            base: base.to_path_buf(),
            root_dir: home.join("current"),
            tar_dir: home.join("tar"),
            untar_dir: home.join("untar"),
            marker_path: home.join("active.json"),
            home,
            index_url: settings.index_url.clone(),
            mirror: settings
                .mirror_url
                .as_ref()
                .filter(|url| !url.trim().is_empty())
                .map(|url| Mirror {
                    base_url: url.clone(),
                    marker: settings.mirror_marker.clone(),
                }),
            binary_marker: settings.binary_marker.clone(),
            aliases: PlatformAliases {
                os: settings.os_aliases.clone(),
                arch: settings.arch_aliases.clone(),
            },
            env: settings.env.clone(),
            path_entries: settings.path_entries.clone(),
        }
    }

    /// Directory holding the extracted files of `version`.
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.untar_dir.join(version)
    }

    /// Environment entries exposing the active version.
    pub fn env_entries(&self) -> Vec<EnvEntry> {
        let vars = self.env.iter().map(|(key, value)| EnvEntry::Var {
            key: key.clone(),
            value: value.clone(),
        });
        let paths = self
            .path_entries
            .iter()
            .map(|entry| EnvEntry::PathPrepend(self.root_dir.join(entry)));
        vars.chain(paths).collect()
    }
}
