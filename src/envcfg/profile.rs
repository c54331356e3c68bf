//! Shell profile editing for POSIX systems.
//!
//! Variables are written into fragments under the base directory
//! (`env.sh`, plus `env.fish` for fish users), one named section per runtime.
//! The user's rc file only ever gets a single line sourcing the fragment.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::{EnvEditor, EnvEntry};
use crate::runtime::Runtime;

const FRAGMENT_HEADER: &str = "# Managed by verman. Change config.json instead of editing this file.\n";
const HOOK_COMMENT: &str = "# verman";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    /// Parses a shell from a path such as `/bin/zsh`.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = Path::new(path).file_name()?.to_str()?;
        match name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    /// Rc files in order of preference.
    pub fn profile_candidates(self, home: &Path) -> Vec<PathBuf> {
        match self {
            Self::Bash => vec![home.join(".bashrc"), home.join(".bash_profile")],
            Self::Zsh => vec![home.join(".zshrc")],
            Self::Fish => vec![home.join(".config").join("fish").join("config.fish")],
        }
    }
}

pub struct ProfileEditor {
    posix_fragment: PathBuf,
    fish_fragment: PathBuf,
    shell: Option<Shell>,
    home: Option<PathBuf>,
}

impl ProfileEditor {
    pub fn new(base: &Path) -> Self {
        Self {
            posix_fragment: base.join("env.sh"),
            fish_fragment: base.join("env.fish"),
            shell: None,
            home: None,
        }
    }

    /// Use this shell and home directory instead of detecting them.
    pub fn with_shell_profile(mut self, shell: Shell, home: PathBuf) -> Self {
        self.shell = Some(shell);
        self.home = Some(home);
        self
    }

    pub fn posix_fragment(&self) -> &Path {
        &self.posix_fragment
    }

    fn detect_shell<R: Runtime>(&self, runtime: &R) -> Option<Shell> {
        self.shell.or_else(|| {
            let shell = runtime.env_var("SHELL").ok()?;
            Shell::from_path(&shell)
        })
    }

    fn write_section<R: Runtime>(
        &self,
        runtime: &R,
        fragment: &Path,
        section: &str,
        body: &str,
    ) -> Result<()> {
        let existing = if runtime.exists(fragment) {
            runtime.read_to_string(fragment)?
        } else {
            FRAGMENT_HEADER.to_string()
        };
        let updated = replace_section(&existing, section, body);

        if let Some(parent) = fragment.parent() {
            runtime.create_dir_all(parent)?;
        }
        runtime
            .write(fragment, updated.as_bytes())
            .with_context(|| format!("Failed to write environment fragment {:?}", fragment))
    }

    /// Append `hook` to the first existing rc file (or create the preferred one).
    fn ensure_hook<R: Runtime>(&self, runtime: &R, candidates: &[PathBuf], hook: &str) -> Result<PathBuf> {
        let rc = candidates
            .iter()
            .find(|p| runtime.exists(p))
            .or_else(|| candidates.first())
            .cloned()
            .context("No shell profile candidates")?;

        let content = if runtime.exists(&rc) {
            runtime.read_to_string(&rc)?
        } else {
            String::new()
        };

        if content.lines().any(|line| line.trim() == hook) {
            debug!("{:?} already sources the verman fragment", rc);
            return Ok(rc);
        }

        let mut updated = content;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(hook);
        updated.push('\n');

        if let Some(parent) = rc.parent() {
            runtime.create_dir_all(parent)?;
        }
        runtime
            .write(&rc, updated.as_bytes())
            .with_context(|| format!("Failed to update shell profile {:?}", rc))?;
        info!("Added verman hook to {:?}", rc);
        Ok(rc)
    }
}

impl EnvEditor for ProfileEditor {
    fn is_configured<R: Runtime + 'static>(&self, runtime: &R, section: &str) -> Result<bool> {
        if !runtime.exists(&self.posix_fragment) {
            return Ok(false);
        }
        let content = runtime.read_to_string(&self.posix_fragment)?;
        let begin = begin_marker(section);
        Ok(content.lines().any(|line| line == begin))
    }

    #[tracing::instrument(skip(self, runtime, entries))]
    fn apply<R: Runtime + 'static>(
        &self,
        runtime: &R,
        section: &str,
        entries: &[EnvEntry],
    ) -> Result<String> {
        self.write_section(runtime, &self.posix_fragment, section, &render_posix(entries))?;
        self.write_section(runtime, &self.fish_fragment, section, &render_fish(entries))?;

        let home = self.home.clone().or_else(|| runtime.home_dir());
        let (Some(shell), Some(home)) = (self.detect_shell(runtime), home) else {
            warn!("Could not detect your shell; the verman fragment is not sourced automatically");
            return Ok(format!(
                "Add this line to your shell profile: . {}",
                sh_quote(&self.posix_fragment.to_string_lossy())
            ));
        };

        let (fragment, hook) = match shell {
            Shell::Fish => (
                &self.fish_fragment,
                format!(
                    "source {} {}",
                    sh_quote(&self.fish_fragment.to_string_lossy()),
                    HOOK_COMMENT
                ),
            ),
            Shell::Bash | Shell::Zsh => (
                &self.posix_fragment,
                format!(
                    ". {} {}",
                    sh_quote(&self.posix_fragment.to_string_lossy()),
                    HOOK_COMMENT
                ),
            ),
        };
        let rc = self.ensure_hook(runtime, &shell.profile_candidates(&home), &hook)?;

        let source = if shell == Shell::Fish { "source" } else { "." };
        Ok(format!(
            "{:?} now loads {:?}. Open a new shell or run: {} {}",
            rc,
            fragment,
            source,
            sh_quote(&fragment.to_string_lossy())
        ))
    }
}

fn begin_marker(section: &str) -> String {
    format!("# >>> verman:{} >>>", section)
}

fn end_marker(section: &str) -> String {
    format!("# <<< verman:{} <<<", section)
}

/// Replace the named section of `content` with `body`, or append it.
///
/// Everything outside the section is preserved. A begin marker without a
/// matching end marker drops the rest of the file, which can only be what
/// an interrupted write left behind.
pub fn replace_section(content: &str, section: &str, body: &str) -> String {
    let begin = begin_marker(section);
    let end = end_marker(section);

    let mut kept: Vec<&str> = Vec::new();
    let mut inside = false;
    for line in content.lines() {
        if !inside && line == begin {
            inside = true;
            continue;
        }
        if inside {
            if line == end {
                inside = false;
            }
            continue;
        }
        kept.push(line);
    }

    while kept.last().is_some_and(|line| line.trim().is_empty()) {
        kept.pop();
    }

    let mut result = kept.join("\n");
    if !result.is_empty() {
        result.push_str("\n\n");
    }
    result.push_str(&begin);
    result.push('\n');
    result.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        result.push('\n');
    }
    result.push_str(&end);
    result.push('\n');
    result
}

/// Single-quote for POSIX sh and fish.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn fish_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

fn render_posix(entries: &[EnvEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            EnvEntry::Var { key, value } => {
                out.push_str(&format!("export {}={}\n", key, sh_quote(value)));
            }
            EnvEntry::PathPrepend(dir) => {
                let dir = dir.to_string_lossy();
                // Sourcing twice must not grow PATH
                out.push_str(&format!(
                    "case \":${{PATH}}:\" in\n    *:{}:*) ;;\n    *) export PATH={}\"${{PATH:+:${{PATH}}}}\" ;;\nesac\n",
                    sh_quote(&dir),
                    sh_quote(&dir)
                ));
            }
        }
    }
    out
}

fn render_fish(entries: &[EnvEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            EnvEntry::Var { key, value } => {
                out.push_str(&format!("set -gx {} {}\n", key, fish_quote(value)));
            }
            EnvEntry::PathPrepend(dir) => {
                let dir = fish_quote(&dir.to_string_lossy());
                out.push_str(&format!(
                    "contains -- {} $PATH; or set -gx PATH {} $PATH\n",
                    dir, dir
                ));
            }
        }
    }
    out
}
