use anyhow::{Result, bail};
use log::debug;

use crate::{
    archive::ArchiveExtractor,
    download::Downloader,
    envcfg::{EnvEditor, EnvOutcome},
    gc::{GcReport, RemoveOutcome},
    manager::{InstallSource, LocalReport, RemoteVersion, UseReport},
    platform::Platform,
    runtime::Runtime,
    settings::Settings,
    switch::ActiveState,
};

pub mod config;
mod paths;

pub use config::Config;
pub use paths::{default_base_dir, resolve_base_dir};

/// List the stable versions the index offers
#[tracing::instrument(skip(config))]
pub async fn remote<R, D, E, V>(config: Config<R, D, E, V>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    let manager = config.into_manager(name)?;
    let versions = manager.remote_versions().await?;
    if versions.is_empty() {
        println!("No stable {} versions found in {}", name, manager.toolchain.index_url);
        return Ok(());
    }
    for line in format_remote(&versions, &manager.platform) {
        println!("{}", line);
    }
    Ok(())
}

/// Install if needed and activate a version
#[tracing::instrument(skip(config))]
pub async fn use_version<R, D, E, V>(config: Config<R, D, E, V>, name: &str, version: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    let manager = config.into_manager(name)?;
    println!("   resolving {} {}", name, version);
    let report = manager.use_version(version).await?;
    for line in format_use(name, &report) {
        println!("{}", line);
    }
    Ok(())
}

/// List installed versions, marking the active one
#[tracing::instrument(skip(config))]
pub fn local<R, D, E, V>(config: Config<R, D, E, V>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    let manager = config.into_manager(name)?;
    let report = manager.local()?;
    debug!("Active state: {:?}", report.state);

    if let ActiveState::Degraded { recorded, reason } = &report.state {
        eprintln!(
            "warning: {} active version{} is not usable: {}. Run `verman use {} <version>` to repair it.",
            name,
            recorded
                .as_deref()
                .map(|v| format!(" {}", v))
                .unwrap_or_default(),
            reason,
            name
        );
    }
    for line in format_local(name, &report) {
        println!("{}", line);
    }
    Ok(())
}

/// Remove one installed version
#[tracing::instrument(skip(config))]
pub fn remove<R, D, E, V>(config: Config<R, D, E, V>, name: &str, version: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    let manager = config.into_manager(name)?;
    let outcome = manager.remove(version)?;
    println!("{}", format_remove(name, version, &outcome));
    Ok(())
}

/// Remove every installed version except the active one
#[tracing::instrument(skip(config))]
pub fn remove_unused<R, D, E, V>(config: Config<R, D, E, V>, name: &str) -> Result<()>
where
    R: Runtime + 'static,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    let manager = config.into_manager(name)?;
    let report = manager.remove_unused()?;
    for line in format_gc(name, &report) {
        println!("{}", line);
    }
    for (version, reason) in &report.failed {
        eprintln!("   failed to remove {} {}: {}", name, version, reason);
    }
    if !report.failed.is_empty() {
        bail!(
            "Failed to remove {} {} version(s)",
            report.failed.len(),
            name
        );
    }
    Ok(())
}

/// List the configured runtimes
pub fn runtimes<R, D, E, V>(config: Config<R, D, E, V>) -> Result<()>
where
    R: Runtime,
    D: Downloader,
    E: ArchiveExtractor,
    V: EnvEditor,
{
    for line in format_runtimes(&config.settings) {
        println!("{}", line);
    }
    Ok(())
}

fn format_remote(versions: &[RemoteVersion], platform: &Platform) -> Vec<String> {
    versions
        .iter()
        .map(|v| {
            let mut line = format!("  {}", v.version);
            if v.installed {
                line.push_str(" (installed)");
            }
            if !v.available {
                line.push_str(&format!(" (no {} build)", platform));
            }
            line
        })
        .collect()
}

fn format_use(name: &str, report: &UseReport) -> Vec<String> {
    let mut lines = Vec::new();
    match report.source {
        InstallSource::AlreadyInstalled => {}
        InstallSource::Downloaded(bytes) => {
            lines.push(format!("   downloaded {} bytes", bytes));
            lines.push(format!("   installed {} {}", name, report.version));
        }
        InstallSource::ReusedArchive => {
            lines.push("   reused downloaded archive".to_string());
            lines.push(format!("   installed {} {}", name, report.version));
        }
    }
    lines.push(format!("Now using {} {}", name, report.version));
    if let EnvOutcome::Configured { hint } = &report.env {
        lines.push(format!("Environment configured for {}. {}", name, hint));
    }
    lines
}

fn format_local(name: &str, report: &LocalReport) -> Vec<String> {
    if report.installed.is_empty() {
        return vec![format!("No {} versions installed.", name)];
    }
    report
        .installed
        .iter()
        .map(|v| {
            if v.active {
                format!("* {} (current)", v.version)
            } else {
                format!("  {}", v.version)
            }
        })
        .collect()
}

fn format_remove(name: &str, version: &str, outcome: &RemoveOutcome) -> String {
    match outcome {
        RemoveOutcome::Skipped => format!(
            "{} {} is the active version, not removing it.",
            name, version
        ),
        RemoveOutcome::NotInstalled => format!("{} {} is not installed.", name, version),
        RemoveOutcome::Removed { archives, .. } => {
            if archives.is_empty() {
                format!("Removed {} {}", name, version)
            } else {
                format!(
                    "Removed {} {} and {} archive(s)",
                    name,
                    version,
                    archives.len()
                )
            }
        }
    }
}

fn format_gc(name: &str, report: &GcReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .removed
        .iter()
        .map(|v| format!("Removed {} {}", name, v))
        .collect();
    if lines.is_empty() && report.failed.is_empty() {
        lines.push(format!("No unused {} versions.", name));
    }
    match &report.kept {
        Some(kept) => lines.push(format!("Kept {} {} (current)", name, kept)),
        None => lines.push(format!("No active {} version.", name)),
    }
    lines
}

fn format_runtimes(settings: &Settings) -> Vec<String> {
    if settings.runtimes.is_empty() {
        return vec!["No runtimes configured.".to_string()];
    }
    settings
        .runtimes
        .iter()
        .map(|(name, rt)| match &rt.mirror_url {
            Some(mirror) => format!("{}\t{} (mirror: {})", name, rt.index_url, mirror),
            None => format!("{}\t{}", name, rt.index_url),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use crate::settings::RuntimeSettings;
    use crate::switch::InstalledVersion;
    use std::path::PathBuf;

    fn installed(version: &str, active: bool) -> InstalledVersion {
        InstalledVersion {
            version: version.to_string(),
            path: PathBuf::from("/v/julia/untar").join(version),
            active,
        }
    }

    #[test]
    fn test_format_local_marks_current() {
        let report = LocalReport {
            installed: vec![installed("1.6.7", false), installed("1.9.3", true)],
            state: ActiveState::Active {
                version: "1.9.3".into(),
                target: PathBuf::from("/v/julia/untar/1.9.3/julia-1.9.3"),
            },
        };

        assert_eq!(
            format_local("julia", &report),
            vec!["  1.6.7".to_string(), "* 1.9.3 (current)".to_string()]
        );
    }

    #[test]
    fn test_format_local_nothing_installed() {
        let report = LocalReport {
            installed: vec![],
            state: ActiveState::Inactive,
        };
        assert_eq!(
            format_local("julia", &report),
            vec!["No julia versions installed.".to_string()]
        );
    }

    #[test]
    fn test_format_remote() {
        let versions = vec![
            RemoteVersion {
                version: "1.6.7".into(),
                available: false,
                installed: false,
            },
            RemoteVersion {
                version: "1.9.3".into(),
                available: true,
                installed: true,
            },
        ];
        let lines = format_remote(&versions, &Platform::new(Os::Linux, Arch::X86_64));
        assert_eq!(
            lines,
            vec![
                "  1.6.7 (no linux-x86_64 build)".to_string(),
                "  1.9.3 (installed)".to_string()
            ]
        );
    }

    #[test]
    fn test_format_use_reports_env_hint_once() {
        let mut report = UseReport {
            version: "1.9.3".into(),
            binary_root: PathBuf::from("/v/julia/untar/1.9.3/julia-1.9.3"),
            source: InstallSource::Downloaded(1024),
            env: EnvOutcome::Configured {
                hint: "Open a new shell.".into(),
            },
        };
        let lines = format_use("julia", &report);
        assert_eq!(lines.last().unwrap(), "Environment configured for julia. Open a new shell.");
        assert!(lines.contains(&"Now using julia 1.9.3".to_string()));

        report.source = InstallSource::AlreadyInstalled;
        report.env = EnvOutcome::AlreadyConfigured;
        assert_eq!(format_use("julia", &report), vec!["Now using julia 1.9.3".to_string()]);
    }

    #[test]
    fn test_format_remove() {
        assert_eq!(
            format_remove("julia", "1.9.3", &RemoveOutcome::Skipped),
            "julia 1.9.3 is the active version, not removing it."
        );
        assert_eq!(
            format_remove("julia", "0.1", &RemoveOutcome::NotInstalled),
            "julia 0.1 is not installed."
        );
        assert_eq!(
            format_remove(
                "julia",
                "1.6.7",
                &RemoveOutcome::Removed {
                    version_dir: Some(PathBuf::from("/v/julia/untar/1.6.7")),
                    archives: vec![PathBuf::from("/v/julia/tar/julia-1.6.7-linux-x86_64.tar.gz")],
                }
            ),
            "Removed julia 1.6.7 and 1 archive(s)"
        );
    }

    #[test]
    fn test_format_gc() {
        let none = GcReport::default();
        assert_eq!(
            format_gc("julia", &none),
            vec![
                "No unused julia versions.".to_string(),
                "No active julia version.".to_string()
            ]
        );

        let without_active = GcReport {
            kept: None,
            removed: vec!["1.6.7".into(), "1.9.3".into()],
            failed: vec![],
        };
        assert_eq!(
            format_gc("julia", &without_active),
            vec![
                "Removed julia 1.6.7".to_string(),
                "Removed julia 1.9.3".to_string(),
                "No active julia version.".to_string()
            ]
        );

        let report = GcReport {
            kept: Some("1.9.3".into()),
            removed: vec!["1.6.7".into()],
            failed: vec![],
        };
        assert_eq!(
            format_gc("julia", &report),
            vec![
                "Removed julia 1.6.7".to_string(),
                "Kept julia 1.9.3 (current)".to_string()
            ]
        );
    }

    #[test]
    fn test_format_runtimes() {
        let mut settings = Settings::default();
        let mut tool = RuntimeSettings::new("https://example.com/index.json");
        tool.mirror_url = Some("https://mirror.example.com/".into());
        settings.runtimes.insert("tool".into(), tool);

        assert_eq!(
            format_runtimes(&settings),
            vec![
                "julia\thttps://julialang-s3.julialang.net/bin/versions.json".to_string(),
                "tool\thttps://example.com/index.json (mirror: https://mirror.example.com/)"
                    .to_string()
            ]
        );
    }
}
