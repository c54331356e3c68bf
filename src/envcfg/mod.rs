//! Environment configurator.
//!
//! Makes the active-version link reachable from new shells: exported
//! variables such as `JULIA_PKG_SERVER` and a PATH entry under the link.
//! Configuration happens once per runtime; a section marker records that it
//! was done, so re-activating a version never touches the environment again.

mod profile;
#[cfg(windows)]
mod registry;

use anyhow::Result;
use log::{debug, info};
use std::path::PathBuf;

use crate::runtime::Runtime;

pub use profile::{ProfileEditor, Shell, replace_section};
#[cfg(windows)]
pub use registry::RegistryEditor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvEntry {
    Var { key: String, value: String },
    PathPrepend(PathBuf),
}

/// Persistent environment storage for one platform.
#[cfg_attr(test, mockall::automock)]
pub trait EnvEditor: Send + Sync {
    /// Whether `section` was configured before.
    fn is_configured<R: Runtime + 'static>(&self, runtime: &R, section: &str) -> Result<bool>;

    /// Write `entries` under `section`, replacing whatever the section held.
    /// Returns a hint telling the operator how to pick up the change.
    fn apply<R: Runtime + 'static>(
        &self,
        runtime: &R,
        section: &str,
        entries: &[EnvEntry],
    ) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOutcome {
    AlreadyConfigured,
    Configured { hint: String },
}

/// Configure `section` unless it already is.
#[tracing::instrument(skip(runtime, editor, entries))]
pub fn ensure_env<R: Runtime + 'static, E: EnvEditor>(
    runtime: &R,
    editor: &E,
    section: &str,
    entries: &[EnvEntry],
) -> Result<EnvOutcome> {
    if editor.is_configured(runtime, section)? {
        debug!("Environment for {} already configured", section);
        return Ok(EnvOutcome::AlreadyConfigured);
    }

    let hint = editor.apply(runtime, section, entries)?;
    info!("Configured environment for {}", section);
    Ok(EnvOutcome::Configured { hint })
}

#[cfg(unix)]
pub type PlatformEnvEditor = ProfileEditor;

#[cfg(windows)]
pub type PlatformEnvEditor = RegistryEditor;

/// The editor used on this platform, keeping its state under `base`.
pub fn platform_editor(base: &std::path::Path) -> PlatformEnvEditor {
    PlatformEnvEditor::new(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    fn entries() -> Vec<EnvEntry> {
        vec![
            EnvEntry::Var {
                key: "JULIA_PKG_SERVER".into(),
                value: "https://pkg.julialang.org".into(),
            },
            EnvEntry::PathPrepend(PathBuf::from("/home/user/.verman/julia/current/bin")),
        ]
    }

    #[test]
    fn test_ensure_env_applies_when_unconfigured() {
        let runtime = MockRuntime::new();
        let mut editor = MockEnvEditor::new();

        // --- Setup ---
        editor
            .expect_is_configured()
            .withf(|_: &MockRuntime, section| section == "julia")
            .times(1)
            .returning(|_: &MockRuntime, _| Ok(false));
        editor
            .expect_apply()
            .withf(|_: &MockRuntime, section, entries| section == "julia" && entries.len() == 2)
            .times(1)
            .returning(|_: &MockRuntime, _, _| Ok("open a new shell".to_string()));

        // --- Execute & Verify ---
        let outcome = ensure_env(&runtime, &editor, "julia", &entries()).unwrap();
        assert_eq!(
            outcome,
            EnvOutcome::Configured {
                hint: "open a new shell".into()
            }
        );
    }

    #[test]
    fn test_ensure_env_is_noop_when_configured() {
        let runtime = MockRuntime::new();
        let mut editor = MockEnvEditor::new();

        // --- Setup ---
        editor
            .expect_is_configured()
            .returning(|_: &MockRuntime, _| Ok(true));
        editor.expect_apply::<MockRuntime>().never();

        // --- Execute & Verify ---
        let outcome = ensure_env(&runtime, &editor, "julia", &entries()).unwrap();
        assert_eq!(outcome, EnvOutcome::AlreadyConfigured);
    }

    #[test]
    fn test_ensure_env_propagates_apply_failure() {
        let runtime = MockRuntime::new();
        let mut editor = MockEnvEditor::new();

        editor
            .expect_is_configured()
            .returning(|_: &MockRuntime, _| Ok(false));
        editor
            .expect_apply()
            .returning(|_: &MockRuntime, _, _| Err(anyhow::anyhow!("read-only home")));

        let err = ensure_env(&runtime, &editor, "julia", &entries()).unwrap_err();
        assert!(err.to_string().contains("read-only home"));
    }
}
