//! Persistent user environment on Windows (`HKCU\Environment`).

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use winreg::RegKey;
use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE, RegType};
use winreg::types::{FromRegValue, ToRegValue};

use super::{EnvEditor, EnvEntry};
use crate::runtime::Runtime;

pub struct RegistryEditor {
    marker_dir: PathBuf,
}

impl RegistryEditor {
    pub fn new(base: &Path) -> Self {
        Self {
            marker_dir: base.join("env"),
        }
    }

    fn marker_path(&self, section: &str) -> PathBuf {
        self.marker_dir.join(format!("{}.configured", section))
    }
}

/// Prepend `dir` to a `;`-separated PATH unless present (case-insensitive).
pub(crate) fn prepend_path(current: &str, dir: &str) -> Option<String> {
    let present = current
        .split(';')
        .any(|entry| entry.trim_end_matches('\\').eq_ignore_ascii_case(dir.trim_end_matches('\\')));
    if present {
        return None;
    }
    Some(if current.is_empty() {
        dir.to_string()
    } else {
        format!("{};{}", dir, current)
    })
}

/// Value type to write PATH back with. `REG_SZ` and `REG_EXPAND_SZ` are kept
/// as found; a missing or unexpected type becomes `REG_EXPAND_SZ` so
/// `%VAR%` entries keep expanding.
pub(crate) fn path_value_type(existing: Option<&RegType>) -> RegType {
    match existing {
        Some(RegType::REG_SZ) => RegType::REG_SZ,
        _ => RegType::REG_EXPAND_SZ,
    }
}

impl EnvEditor for RegistryEditor {
    fn is_configured<R: Runtime + 'static>(&self, runtime: &R, section: &str) -> Result<bool> {
        Ok(runtime.exists(&self.marker_path(section)))
    }

    #[tracing::instrument(skip(self, runtime, entries))]
    fn apply<R: Runtime + 'static>(
        &self,
        runtime: &R,
        section: &str,
        entries: &[EnvEntry],
    ) -> Result<String> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let env = hkcu
            .open_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
            .context("Failed to open HKCU\\Environment registry key")?;

        for entry in entries {
            match entry {
                EnvEntry::Var { key, value } => {
                    let current: String = env.get_value(key).unwrap_or_default();
                    if &current == value {
                        debug!("{} already set", key);
                        continue;
                    }
                    env.set_value(key, value)
                        .with_context(|| format!("Failed to set {} in registry", key))?;
                }
                EnvEntry::PathPrepend(dir) => {
                    let raw = env.get_raw_value("Path").ok();
                    let current = raw
                        .as_ref()
                        .and_then(|value| String::from_reg_value(value).ok())
                        .unwrap_or_default();
                    if let Some(updated) = prepend_path(&current, &dir.to_string_lossy()) {
                        let mut value = updated.to_reg_value();
                        value.vtype = path_value_type(raw.as_ref().map(|value| &value.vtype));
                        env.set_raw_value("Path", &value)
                            .context("Failed to update PATH in registry")?;
                    }
                }
            }
        }

        runtime.create_dir_all(&self.marker_dir)?;
        runtime.write(&self.marker_path(section), b"")?;
        info!("Updated user environment for {}", section);

        Ok("Restart your terminal or log out and back in to pick up the new environment".to_string())
    }
}
