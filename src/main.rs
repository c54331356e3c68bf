use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use verman::commands::{self, Config};

/// verman - runtime version manager
///
/// Install and switch between released versions of language runtimes.
///
/// Examples:
///   verman remote julia        # List stable Julia versions
///   verman use julia 1.9.3     # Install (if needed) and activate Julia 1.9.3
///   verman local julia         # List installed versions
#[derive(Parser, Debug)]
#[command(author, version = env!("VERMAN_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory holding every runtime (overrides defaults; also via VERMAN_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "VERMAN_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Settings file (defaults to <root>/config.json; also via VERMAN_CONFIG)
    #[arg(
        long = "config",
        short = 'c',
        env = "VERMAN_CONFIG",
        value_name = "FILE",
        global = true
    )]
    pub config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List stable versions available for download
    #[command(visible_alias = "r")]
    Remote(RuntimeArgs),

    /// Install a version if needed and make it the active one
    #[command(visible_alias = "u")]
    Use(VersionArgs),

    /// List installed versions and show the active one
    #[command(visible_alias = "l")]
    Local(RuntimeArgs),

    /// Remove an installed version (the active one is kept)
    #[command(visible_alias = "rm")]
    Remove(VersionArgs),

    /// Remove every installed version except the active one
    #[command(name = "remove-unused", visible_alias = "ru")]
    RemoveUnused(RuntimeArgs),

    /// List configured runtimes
    Runtimes,
}

#[derive(clap::Args, Debug)]
pub struct RuntimeArgs {
    /// Runtime name, e.g. "julia"
    #[arg(value_name = "RUNTIME")]
    pub runtime: String,
}

#[derive(clap::Args, Debug)]
pub struct VersionArgs {
    /// Runtime name, e.g. "julia"
    #[arg(value_name = "RUNTIME")]
    pub runtime: String,

    /// Version, e.g. "1.9.3"
    #[arg(value_name = "VERSION")]
    pub version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config::new(verman::runtime::RealRuntime, cli.root, cli.config)?;

    match cli.command {
        Commands::Remote(args) => commands::remote(config, &args.runtime).await?,
        Commands::Use(args) => commands::use_version(config, &args.runtime, &args.version).await?,
        Commands::Local(args) => commands::local(config, &args.runtime)?,
        Commands::Remove(args) => commands::remove(config, &args.runtime, &args.version)?,
        Commands::RemoveUnused(args) => commands::remove_unused(config, &args.runtime)?,
        Commands::Runtimes => commands::runtimes(config)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_use_parsing() {
        let cli = Cli::try_parse_from(["verman", "use", "julia", "1.9.3"]).unwrap();
        match cli.command {
            Commands::Use(args) => {
                assert_eq!(args.runtime, "julia");
                assert_eq!(args.version, "1.9.3");
            }
            _ => panic!("Expected Use command"),
        }
        assert_eq!(cli.root, None);
    }

    #[test]
    fn test_cli_aliases() {
        for (alias, expected) in [("r", "remote"), ("l", "local"), ("ru", "remove-unused")] {
            let cli = Cli::try_parse_from(["verman", alias, "julia"]).unwrap();
            let matched = match cli.command {
                Commands::Remote(_) => "remote",
                Commands::Local(_) => "local",
                Commands::RemoveUnused(_) => "remove-unused",
                _ => "other",
            };
            assert_eq!(matched, expected);
        }

        let cli = Cli::try_parse_from(["verman", "u", "julia", "1.9.3"]).unwrap();
        assert!(matches!(cli.command, Commands::Use(_)));
        let cli = Cli::try_parse_from(["verman", "rm", "julia", "1.9.3"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove(_)));
    }

    #[test]
    fn test_cli_global_root_and_config() {
        let cli = Cli::try_parse_from([
            "verman", "--root", "/tmp/v", "local", "julia", "-c", "/tmp/c.json",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/v")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn test_cli_use_requires_version() {
        assert!(Cli::try_parse_from(["verman", "use", "julia"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["verman", "julia"]).is_err());
    }
}
