//! Active-version switch.
//!
//! The active version of a runtime is the pair of the `current` link under
//! the toolchain home and the `active.json` record next to it. The link is
//! what shells use; the record is what listing and cleanup read.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::compare_versions;
use crate::envcfg::{EnvEditor, EnvOutcome, ensure_env};
use crate::error::VermanError;
use crate::runtime::path::normalize_path;
use crate::runtime::{Runtime, is_path_under, relative_symlink_path};
use crate::settings::{Toolchain, validate_version};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRecord {
    pub version: String,
    /// Binary root the link was created for.
    pub target: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Active { version: String, target: PathBuf },
    /// Link and record disagree, or the link is dangling.
    Degraded {
        recorded: Option<String>,
        reason: String,
    },
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub path: PathBuf,
    pub active: bool,
}

/// Point the toolchain's `current` link at `binary_root` and record `version`.
///
/// There is no rollback: when the new link cannot be created the runtime is
/// left without an active version.
#[tracing::instrument(skip(runtime, editor, toolchain), fields(runtime = %toolchain.name))]
pub fn activate<R: Runtime + 'static, E: EnvEditor>(
    runtime: &R,
    editor: &E,
    toolchain: &Toolchain,
    version: &str,
    binary_root: &Path,
) -> Result<EnvOutcome> {
    validate_version(version)?;
    let version_dir = toolchain.version_dir(version);
    if !is_path_under(binary_root, &version_dir) || !runtime.is_dir(binary_root) {
        return Err(VermanError::state(format!(
            "{} is not an installed directory of {} {}",
            binary_root.display(),
            toolchain.name,
            version
        ))
        .into());
    }

    let root_dir = &toolchain.root_dir;

    // 1. Drop the old link and the record that described it
    if runtime.is_symlink(root_dir) || runtime.exists(root_dir) {
        remove_root_dir(runtime, root_dir)
            .map_err(|e| VermanError::link(root_dir, format!("{:#}", e)))?;
        clear_record(runtime, toolchain)
            .map_err(|e| VermanError::link(root_dir, format!("{:#}", e)))?;
    }

    // 2. New link, relative so the base directory can be moved
    let unusable = |e: anyhow::Error| {
        VermanError::link(
            root_dir,
            format!(
                "{:#}. {} has no active version and is not usable until re-activated",
                e, toolchain.name
            ),
        )
    };
    runtime.create_dir_all(&toolchain.home).map_err(unusable)?;
    let link_target =
        relative_symlink_path(root_dir, binary_root).unwrap_or_else(|| binary_root.to_path_buf());
    debug!("Linking {:?} -> {:?}", root_dir, link_target);
    runtime.symlink(&link_target, root_dir).map_err(unusable)?;

    // 3. Environment, once per runtime
    let outcome = ensure_env(runtime, editor, &toolchain.name, &toolchain.env_entries())
        .with_context(|| format!("Failed to configure environment for {}", toolchain.name))?;

    // 4. Record
    write_record(
        runtime,
        toolchain,
        &ActiveRecord {
            version: version.to_string(),
            target: binary_root.to_path_buf(),
        },
    )?;

    info!("{} {} is now active", toolchain.name, version);
    Ok(outcome)
}

fn remove_root_dir<R: Runtime>(runtime: &R, root_dir: &Path) -> Result<()> {
    if runtime.is_symlink(root_dir) {
        runtime.remove_symlink(root_dir)
    } else if runtime.is_dir(root_dir) {
        warn!("{:?} is a real directory, removing it", root_dir);
        runtime.remove_dir_all(root_dir)
    } else {
        runtime.remove_file(root_dir)
    }
}

fn clear_record<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Result<()> {
    if runtime.exists(&toolchain.marker_path) {
        runtime.remove_file(&toolchain.marker_path)?;
    }
    Ok(())
}

fn write_record<R: Runtime>(runtime: &R, toolchain: &Toolchain, record: &ActiveRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    let tmp = toolchain.marker_path.with_extension("json.tmp");
    runtime
        .write(&tmp, json.as_bytes())
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    runtime.rename(&tmp, &toolchain.marker_path)
}

/// The persisted active record, if any. A corrupt record counts as absent.
pub fn read_record<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Result<Option<ActiveRecord>> {
    if !runtime.exists(&toolchain.marker_path) {
        return Ok(None);
    }
    let content = runtime.read_to_string(&toolchain.marker_path)?;
    match serde_json::from_str(&content) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(
                "Ignoring unreadable active-version record {:?}: {}",
                toolchain.marker_path, e
            );
            Ok(None)
        }
    }
}

/// Version recorded as active.
pub fn current_version<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Result<Option<String>> {
    Ok(read_record(runtime, toolchain)?.map(|record| record.version))
}

/// Cross-check the record against the link.
pub fn active_state<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Result<ActiveState> {
    let record = read_record(runtime, toolchain)?;
    let root_dir = &toolchain.root_dir;
    let is_link = runtime.is_symlink(root_dir);

    let state = match record {
        None if !is_link && !runtime.exists(root_dir) => ActiveState::Inactive,
        None => ActiveState::Degraded {
            recorded: None,
            reason: format!("{} exists but no active version is recorded", root_dir.display()),
        },
        Some(record) if !is_link => ActiveState::Degraded {
            recorded: Some(record.version),
            reason: format!("active-version link {} is missing", root_dir.display()),
        },
        Some(record) => {
            let resolved = runtime.resolve_link(root_dir)?;
            if normalize_path(&resolved) != normalize_path(&record.target) {
                ActiveState::Degraded {
                    recorded: Some(record.version),
                    reason: format!(
                        "link points to {} instead of {}",
                        resolved.display(),
                        record.target.display()
                    ),
                }
            } else if !runtime.exists(root_dir) {
                ActiveState::Degraded {
                    recorded: Some(record.version),
                    reason: format!("link target {} no longer exists", resolved.display()),
                }
            } else {
                ActiveState::Active {
                    version: record.version,
                    target: record.target,
                }
            }
        }
    };
    Ok(state)
}

/// Installed versions in ascending order, the recorded one marked active.
pub fn list_installed<R: Runtime>(runtime: &R, toolchain: &Toolchain) -> Result<Vec<InstalledVersion>> {
    if !runtime.exists(&toolchain.untar_dir) {
        return Ok(Vec::new());
    }
    let current = current_version(runtime, toolchain)?;

    let mut versions: Vec<InstalledVersion> = runtime
        .read_dir(&toolchain.untar_dir)?
        .into_iter()
        .filter(|path| runtime.is_dir(path))
        .filter_map(|path| {
            let version = path.file_name()?.to_str()?.to_string();
            Some(InstalledVersion {
                active: current.as_deref() == Some(version.as_str()),
                version,
                path,
            })
        })
        .collect();

    versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envcfg::MockEnvEditor;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::settings::RuntimeSettings;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, Toolchain) {
        let dir = tempdir().unwrap();
        let toolchain = Toolchain::new("julia", dir.path(), &RuntimeSettings::julia());
        (dir, toolchain)
    }

    fn installed(toolchain: &Toolchain, version: &str) -> PathBuf {
        let root = toolchain
            .version_dir(version)
            .join(format!("julia-{}", version));
        fs::create_dir_all(root.join("bin")).unwrap();
        root
    }

    fn configured_editor() -> MockEnvEditor {
        let mut editor = MockEnvEditor::new();
        editor
            .expect_is_configured()
            .returning(|_: &RealRuntime, _| Ok(true));
        editor
    }

    #[cfg_attr(
        verman_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set VERMAN_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_activate_then_current_reports_version() {
        let (_dir, toolchain) = setup();
        let root = installed(&toolchain, "1.9.3");

        activate(&RealRuntime, &configured_editor(), &toolchain, "1.9.3", &root).unwrap();

        assert_eq!(
            current_version(&RealRuntime, &toolchain).unwrap(),
            Some("1.9.3".to_string())
        );
        assert!(toolchain.root_dir.join("bin").is_dir());
        assert_eq!(
            fs::read_link(&toolchain.root_dir).unwrap(),
            PathBuf::from("untar/1.9.3/julia-1.9.3")
        );
        assert_eq!(
            active_state(&RealRuntime, &toolchain).unwrap(),
            ActiveState::Active {
                version: "1.9.3".into(),
                target: root,
            }
        );
    }

    #[cfg_attr(
        verman_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set VERMAN_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_activate_switches_between_versions() {
        let (_dir, toolchain) = setup();
        let old = installed(&toolchain, "1.9.3");
        let new = installed(&toolchain, "1.10.0");
        let editor = configured_editor();

        activate(&RealRuntime, &editor, &toolchain, "1.9.3", &old).unwrap();
        activate(&RealRuntime, &editor, &toolchain, "1.10.0", &new).unwrap();

        assert_eq!(
            current_version(&RealRuntime, &toolchain).unwrap(),
            Some("1.10.0".to_string())
        );
        assert_eq!(
            RealRuntime.resolve_link(&toolchain.root_dir).unwrap(),
            new
        );
        assert!(!toolchain.marker_path.with_extension("json.tmp").exists());
    }

    #[cfg_attr(
        verman_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set VERMAN_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_activate_configures_env_only_first_time() {
        let (_dir, toolchain) = setup();
        let root = installed(&toolchain, "1.9.3");
        let mut editor = MockEnvEditor::new();

        // --- Setup ---
        editor
            .expect_is_configured()
            .times(1)
            .returning(|_: &RealRuntime, _| Ok(false));
        editor
            .expect_apply()
            .withf(|_: &RealRuntime, section, entries| section == "julia" && entries.len() == 2)
            .times(1)
            .returning(|_: &RealRuntime, _, _| Ok("open a new shell".into()));
        editor
            .expect_is_configured()
            .returning(|_: &RealRuntime, _| Ok(true));

        // --- Execute ---
        let first = activate(&RealRuntime, &editor, &toolchain, "1.9.3", &root).unwrap();
        let second = activate(&RealRuntime, &editor, &toolchain, "1.9.3", &root).unwrap();

        // --- Verify ---
        assert!(matches!(first, EnvOutcome::Configured { .. }));
        assert_eq!(second, EnvOutcome::AlreadyConfigured);
    }

    #[test]
    fn test_activate_rejects_root_outside_version_dir() {
        let (dir, toolchain) = setup();
        installed(&toolchain, "1.9.3");
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();

        let err = activate(
            &RealRuntime,
            &MockEnvEditor::new(),
            &toolchain,
            "1.9.3",
            &elsewhere,
        )
        .unwrap_err();

        assert!(matches!(
            VermanError::find(&err),
            Some(VermanError::State { .. })
        ));
        assert!(!toolchain.root_dir.exists());
    }

    #[test]
    fn test_activate_link_failure_leaves_no_active_version() {
        let toolchain = Toolchain::new("julia", Path::new("/v"), &RuntimeSettings::julia());
        let root = toolchain.version_dir("1.10.0").join("julia-1.10.0");
        let mut runtime = MockRuntime::new();

        // --- Setup ---
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_is_symlink()
            .with(mockall::predicate::eq(toolchain.root_dir.clone()))
            .returning(|_| true);
        runtime.expect_remove_symlink().times(1).returning(|_| Ok(()));
        runtime
            .expect_exists()
            .with(mockall::predicate::eq(toolchain.marker_path.clone()))
            .returning(|_| true);
        runtime
            .expect_remove_file()
            .with(mockall::predicate::eq(toolchain.marker_path.clone()))
            .times(1)
            .returning(|_| Ok(()));
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_symlink()
            .returning(|_, _| Err(anyhow::anyhow!("permission denied")));
        // No write expectation: the record must not be written

        // --- Execute ---
        let err = activate(
            &runtime,
            &MockEnvEditor::new(),
            &toolchain,
            "1.10.0",
            &root,
        )
        .unwrap_err();

        // --- Verify ---
        match VermanError::find(&err) {
            Some(VermanError::Link { message, .. }) => {
                assert!(message.contains("permission denied"));
                assert!(message.contains("not usable until re-activated"));
            }
            other => panic!("expected Link error, got {:?}", other),
        }
    }

    #[test]
    fn test_activate_home_creation_failure_is_link_error() {
        let toolchain = Toolchain::new("julia", Path::new("/v"), &RuntimeSettings::julia());
        let root = toolchain.version_dir("1.10.0").join("julia-1.10.0");
        let mut runtime = MockRuntime::new();

        // --- Setup ---
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_is_symlink()
            .with(mockall::predicate::eq(toolchain.root_dir.clone()))
            .returning(|_| true);
        runtime.expect_remove_symlink().times(1).returning(|_| Ok(()));
        runtime
            .expect_exists()
            .with(mockall::predicate::eq(toolchain.marker_path.clone()))
            .returning(|_| false);
        runtime
            .expect_create_dir_all()
            .returning(|_| Err(anyhow::anyhow!("read-only file system")));
        // No symlink or write expectation

        // --- Execute ---
        let err = activate(
            &runtime,
            &MockEnvEditor::new(),
            &toolchain,
            "1.10.0",
            &root,
        )
        .unwrap_err();

        // --- Verify ---
        match VermanError::find(&err) {
            Some(VermanError::Link { message, .. }) => {
                assert!(message.contains("read-only file system"));
                assert!(message.contains("not usable until re-activated"));
            }
            other => panic!("expected Link error, got {:?}", other),
        }
    }

    #[test]
    fn test_activate_rejects_traversing_version() {
        let (_dir, toolchain) = setup();
        let root = installed(&toolchain, "1.9.3");

        for version in ["..", ".", ""] {
            let err = activate(
                &RealRuntime,
                &MockEnvEditor::new(),
                &toolchain,
                version,
                &root,
            )
            .unwrap_err();
            assert!(err.to_string().contains("Invalid version"), "{:?}", version);
        }

        assert!(!toolchain.root_dir.exists());
        assert!(!toolchain.marker_path.exists());
    }

    #[test]
    fn test_activate_unremovable_link_is_link_error() {
        let toolchain = Toolchain::new("julia", Path::new("/v"), &RuntimeSettings::julia());
        let root = toolchain.version_dir("1.10.0").join("julia-1.10.0");
        let mut runtime = MockRuntime::new();

        runtime.expect_is_dir().returning(|_| true);
        runtime.expect_is_symlink().returning(|_| true);
        runtime
            .expect_remove_symlink()
            .returning(|_| Err(anyhow::anyhow!("busy")));

        let err = activate(
            &runtime,
            &MockEnvEditor::new(),
            &toolchain,
            "1.10.0",
            &root,
        )
        .unwrap_err();

        assert!(matches!(
            VermanError::find(&err),
            Some(VermanError::Link { .. })
        ));
    }

    #[test]
    fn test_state_inactive_without_record_or_link() {
        let (_dir, toolchain) = setup();
        assert_eq!(
            active_state(&RealRuntime, &toolchain).unwrap(),
            ActiveState::Inactive
        );
        assert_eq!(current_version(&RealRuntime, &toolchain).unwrap(), None);
    }

    #[test]
    fn test_state_degraded_when_link_missing() {
        let (_dir, toolchain) = setup();
        let root = installed(&toolchain, "1.9.3");
        fs::write(
            &toolchain.marker_path,
            serde_json::to_string(&ActiveRecord {
                version: "1.9.3".into(),
                target: root,
            })
            .unwrap(),
        )
        .unwrap();

        match active_state(&RealRuntime, &toolchain).unwrap() {
            ActiveState::Degraded { recorded, reason } => {
                assert_eq!(recorded.as_deref(), Some("1.9.3"));
                assert!(reason.contains("missing"));
            }
            other => panic!("expected degraded, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_state_degraded_when_link_dangles() {
        let (_dir, toolchain) = setup();
        let root = installed(&toolchain, "1.9.3");
        activate(&RealRuntime, &configured_editor(), &toolchain, "1.9.3", &root).unwrap();

        fs::remove_dir_all(toolchain.version_dir("1.9.3")).unwrap();

        assert!(matches!(
            active_state(&RealRuntime, &toolchain).unwrap(),
            ActiveState::Degraded { .. }
        ));
    }

    #[test]
    fn test_corrupt_record_counts_as_absent() {
        let (_dir, toolchain) = setup();
        fs::create_dir_all(&toolchain.home).unwrap();
        fs::write(&toolchain.marker_path, "{ broken").unwrap();

        assert_eq!(current_version(&RealRuntime, &toolchain).unwrap(), None);
    }

    #[cfg_attr(
        verman_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set VERMAN_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_list_installed_sorted_and_marked() {
        let (_dir, toolchain) = setup();
        installed(&toolchain, "1.10.0");
        let active = installed(&toolchain, "1.9.3");
        installed(&toolchain, "1.6.7");
        fs::write(toolchain.untar_dir.join("stray-file"), "").unwrap();

        activate(&RealRuntime, &configured_editor(), &toolchain, "1.9.3", &active).unwrap();

        let listed = list_installed(&RealRuntime, &toolchain).unwrap();
        let summary: Vec<(&str, bool)> = listed
            .iter()
            .map(|v| (v.version.as_str(), v.active))
            .collect();
        assert_eq!(
            summary,
            vec![("1.6.7", false), ("1.9.3", true), ("1.10.0", false)]
        );
    }

    #[test]
    fn test_list_installed_without_untar_dir() {
        let (_dir, toolchain) = setup();
        assert!(list_installed(&RealRuntime, &toolchain).unwrap().is_empty());
    }
}
