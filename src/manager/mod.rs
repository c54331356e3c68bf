//! Version manager: the engine behind every command, parametrized by a
//! [`Toolchain`] so each runtime only differs in its settings.

use anyhow::Result;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::archive::ArchiveExtractor;
use crate::catalog::{VersionCatalog, fetch_catalog, select_package};
use crate::download::{Downloader, FetchOutcome, fetch_package};
use crate::envcfg::{EnvEditor, EnvOutcome};
use crate::gc::{self, GcReport, RemoveOutcome};
use crate::http::HttpClient;
use crate::install::{install, locate_binary_root};
use crate::platform::Platform;
use crate::runtime::Runtime;
use crate::settings::{DEFAULT_DOWNLOAD_TIMEOUT_SECS, Toolchain, validate_version};
use crate::switch::{self, ActiveState, InstalledVersion, activate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version: String,
    /// Whether the index has an archive for this platform.
    pub available: bool,
    pub installed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSource {
    /// Switched to an existing installation without touching the network.
    AlreadyInstalled,
    Downloaded(u64),
    ReusedArchive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseReport {
    pub version: String,
    pub binary_root: PathBuf,
    pub source: InstallSource,
    pub env: EnvOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReport {
    pub installed: Vec<InstalledVersion>,
    pub state: ActiveState,
}

pub struct VersionManager<R: Runtime, D: Downloader, E: ArchiveExtractor, V: EnvEditor> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub downloader: D,
    pub extractor: E,
    pub editor: V,
    pub toolchain: Toolchain,
    pub platform: Platform,
    pub timeout: Duration,
    catalog: OnceCell<VersionCatalog>,
}

impl<R: Runtime + 'static, D: Downloader, E: ArchiveExtractor, V: EnvEditor> VersionManager<R, D, E, V> {
    pub fn new(
        runtime: R,
        http_client: HttpClient,
        downloader: D,
        extractor: E,
        editor: V,
        toolchain: Toolchain,
        platform: Platform,
    ) -> Self {
        Self {
            runtime,
            http_client,
            downloader,
            extractor,
            editor,
            toolchain,
            platform,
            timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            catalog: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The remote catalog, fetched at most once per manager.
    pub async fn catalog(&self) -> Result<&VersionCatalog> {
        self.catalog
            .get_or_try_init(|| fetch_catalog(&self.http_client, &self.toolchain))
            .await
    }

    /// Stable remote versions in ascending order.
    #[tracing::instrument(skip(self), fields(runtime = %self.toolchain.name))]
    pub async fn remote_versions(&self) -> Result<Vec<RemoteVersion>> {
        let catalog = self.catalog().await?;
        let versions = catalog
            .sorted_versions()
            .into_iter()
            .map(|version| RemoteVersion {
                available: catalog
                    .packages(version)
                    .is_some_and(|packages| packages.iter().any(|p| p.platform == self.platform)),
                installed: self.runtime.is_dir(&self.toolchain.version_dir(version)),
                version: version.to_string(),
            })
            .collect();
        Ok(versions)
    }

    /// Make `version` the active one, installing it first if needed.
    ///
    /// A version whose directory still has a binary root is switched to
    /// offline. Any failure before activation leaves the active version as it
    /// was.
    #[tracing::instrument(skip(self), fields(runtime = %self.toolchain.name))]
    pub async fn use_version(&self, version: &str) -> Result<UseReport> {
        validate_version(version)?;
        let version_dir = self.toolchain.version_dir(version);

        if self.runtime.exists(&version_dir) {
            match locate_binary_root(&self.runtime, &version_dir, &self.toolchain.binary_marker)? {
                Some(binary_root) => {
                    info!("{} {} is already installed", self.toolchain.name, version);
                    let env = activate(
                        &self.runtime,
                        &self.editor,
                        &self.toolchain,
                        version,
                        &binary_root,
                    )?;
                    return Ok(UseReport {
                        version: version.to_string(),
                        binary_root,
                        source: InstallSource::AlreadyInstalled,
                        env,
                    });
                }
                None => warn!(
                    "{:?} looks like an interrupted install, installing again",
                    version_dir
                ),
            }
        }

        let catalog = self.catalog().await?;
        let package = select_package(
            catalog,
            version,
            self.platform,
            self.toolchain.mirror.as_ref(),
        )?;

        let archive = self.toolchain.tar_dir.join(&package.file_name);
        let fetched = fetch_package(
            &self.runtime,
            &self.downloader,
            &package,
            &archive,
            self.timeout,
        )
        .await?;
        debug!("Fetch outcome: {:?}", fetched);

        let binary_root = install(
            &self.runtime,
            &self.extractor,
            &archive,
            &version_dir,
            &self.toolchain.binary_marker,
        )?;

        let env = activate(
            &self.runtime,
            &self.editor,
            &self.toolchain,
            version,
            &binary_root,
        )?;

        Ok(UseReport {
            version: version.to_string(),
            binary_root,
            source: match fetched {
                FetchOutcome::Downloaded(bytes) => InstallSource::Downloaded(bytes),
                FetchOutcome::Reused => InstallSource::ReusedArchive,
            },
            env,
        })
    }

    pub fn local(&self) -> Result<LocalReport> {
        Ok(LocalReport {
            installed: switch::list_installed(&self.runtime, &self.toolchain)?,
            state: switch::active_state(&self.runtime, &self.toolchain)?,
        })
    }

    pub fn remove(&self, version: &str) -> Result<RemoveOutcome> {
        gc::remove_version(&self.runtime, &self.toolchain, &self.platform, version)
    }

    pub fn remove_unused(&self) -> Result<GcReport> {
        gc::remove_all_unused(&self.runtime, &self.toolchain, &self.platform)
    }
}
