//! Garbage collector: removes installed versions that are not active, along
//! with the archives they were installed from.

use anyhow::Result;
use log::{debug, info, warn};
use std::path::{Component, Path, PathBuf};

use crate::error::VermanError;
use crate::platform::Platform;
use crate::runtime::{Runtime, is_direct_child};
use crate::settings::{Toolchain, validate_version};
use crate::switch::{current_version, list_installed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The version is active and was left alone.
    Skipped,
    NotInstalled,
    Removed {
        version_dir: Option<PathBuf>,
        archives: Vec<PathBuf>,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub kept: Option<String>,
    pub removed: Vec<String>,
    /// Version and the reason it could not be removed.
    pub failed: Vec<(String, String)>,
}

/// Archive file name prefix for `version` on `platform`: `<name>-<version>-<os>-<arch>.`
fn archive_prefix(toolchain: &Toolchain, version: &str, platform: &Platform) -> String {
    format!(
        "{}-{}-{}-{}.",
        toolchain.name, version, platform.os, platform.arch
    )
}

/// Delete a version directory (a direct child of `untar/`) or an archive
/// (a direct child of `tar/`). Anything else is refused.
fn guarded_remove<R: Runtime>(runtime: &R, toolchain: &Toolchain, path: &Path, dir: bool) -> Result<()> {
    let parent = if dir {
        &toolchain.untar_dir
    } else {
        &toolchain.tar_dir
    };
    if !is_direct_child(path, parent) {
        return Err(VermanError::state(format!(
            "refusing to delete {}: not an entry of {}",
            path.display(),
            parent.display()
        ))
        .into());
    }
    debug!("Removing {:?}", path);
    if dir {
        runtime.remove_dir_all(path)
    } else {
        runtime.remove_file(path)
    }
}

/// Archives in `tar_dir` belonging to `version`, including partial downloads.
fn archives_of<R: Runtime>(
    runtime: &R,
    toolchain: &Toolchain,
    version: &str,
    platform: &Platform,
) -> Result<Vec<PathBuf>> {
    if !runtime.exists(&toolchain.tar_dir) {
        return Ok(Vec::new());
    }
    let prefix = archive_prefix(toolchain, version, platform);
    let mut archives: Vec<PathBuf> = runtime
        .read_dir(&toolchain.tar_dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    archives.sort();
    Ok(archives)
}

/// Remove one installed version unless it is the active one.
#[tracing::instrument(skip(runtime, toolchain, platform), fields(runtime = %toolchain.name))]
pub fn remove_version<R: Runtime>(
    runtime: &R,
    toolchain: &Toolchain,
    platform: &Platform,
    version: &str,
) -> Result<RemoveOutcome> {
    validate_version(version)?;
    if current_version(runtime, toolchain)?.as_deref() == Some(version) {
        info!("{} {} is active, not removing it", toolchain.name, version);
        return Ok(RemoveOutcome::Skipped);
    }

    let dir = toolchain.version_dir(version);
    let version_dir = if runtime.exists(&dir) {
        guarded_remove(runtime, toolchain, &dir, true)?;
        Some(dir)
    } else {
        None
    };

    let archives = archives_of(runtime, toolchain, version, platform)?;
    for archive in &archives {
        guarded_remove(runtime, toolchain, archive, false)?;
    }

    if version_dir.is_none() && archives.is_empty() {
        return Ok(RemoveOutcome::NotInstalled);
    }
    info!("Removed {} {}", toolchain.name, version);
    Ok(RemoveOutcome::Removed {
        version_dir,
        archives,
    })
}

/// Version directory the `current` link resolves into, if the link is live.
fn linked_version<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Option<String> {
    if !runtime.is_symlink(&toolchain.root_dir) {
        return None;
    }
    let target = runtime.resolve_link(&toolchain.root_dir).ok()?;
    if !runtime.exists(&target) {
        return None;
    }
    let relative = target.strip_prefix(&toolchain.untar_dir).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => name.to_str().map(str::to_string),
        _ => None,
    }
}

/// Remove every installed version except the active one. Failures are
/// collected per version instead of aborting the run.
///
/// With no version recorded every installed version is removed, except one
/// the `current` link still points into.
#[tracing::instrument(skip(runtime, toolchain, platform), fields(runtime = %toolchain.name))]
pub fn remove_all_unused<R: Runtime>(
    runtime: &R,
    toolchain: &Toolchain,
    platform: &Platform,
) -> Result<GcReport> {
    let kept = match current_version(runtime, toolchain)? {
        Some(current) => Some(current),
        None => {
            let linked = linked_version(runtime, toolchain);
            match &linked {
                Some(version) => warn!(
                    "No active {} version recorded, keeping {} because the current link points to it",
                    toolchain.name, version
                ),
                None => info!(
                    "No active {} version recorded, removing every installed version",
                    toolchain.name
                ),
            }
            linked
        }
    };

    let mut report = GcReport {
        kept: kept.clone(),
        ..GcReport::default()
    };
    for installed in list_installed(runtime, toolchain)? {
        if kept.as_deref() == Some(installed.version.as_str()) {
            continue;
        }
        match remove_version(runtime, toolchain, platform, &installed.version) {
            Ok(RemoveOutcome::Removed { .. }) => report.removed.push(installed.version),
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to remove {} {}: {:#}", toolchain.name, installed.version, e);
                report.failed.push((installed.version, format!("{:#}", e)));
            }
        }
    }
    Ok(report)
}
