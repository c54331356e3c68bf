use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use crate::runtime::Runtime;
use crate::settings::SETTINGS_FILE;

/// Base directory: the explicit one if given, otherwise the default.
#[tracing::instrument(skip(runtime))]
pub fn resolve_base_dir<R: Runtime>(runtime: &R, base: Option<PathBuf>) -> Result<PathBuf> {
    let base = match base {
        Some(path) => path,
        None => default_base_dir(runtime)?,
    };
    info!("Using base directory: {}", base.display());
    Ok(base)
}

/// Settings file: the explicit one if given, otherwise `<base>/config.json`.
pub fn resolve_settings_path(base: &std::path::Path, config: Option<PathBuf>) -> PathBuf {
    config.unwrap_or_else(|| base.join(SETTINGS_FILE))
}

/// Get the default base directory holding every runtime
#[tracing::instrument(skip(runtime))]
pub fn default_base_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_base_dir(runtime))
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".verman"))
    }
}

#[cfg(target_os = "macos")]
fn system_base_dir<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/opt/verman")
}

#[cfg(target_os = "windows")]
fn system_base_dir<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from(r"C:\ProgramData\verman")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_base_dir<R: Runtime>(_runtime: &R) -> PathBuf {
    PathBuf::from("/usr/local/verman")
}
