use anyhow::{Context, Result};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    archive::{ArchiveExtractor, ArchiveExtractorImpl},
    download::{Downloader, HttpDownloader},
    envcfg::{EnvEditor, PlatformEnvEditor, platform_editor},
    http::HttpClient,
    manager::VersionManager,
    platform::Platform,
    runtime::Runtime,
    settings::Settings,
};

use super::paths::{resolve_base_dir, resolve_settings_path};

const USER_AGENT: &str = "verman-cli";
const CONNECT_TIMEOUT_SECS: u64 = 30;

pub struct Config<R: Runtime, D: Downloader, E: ArchiveExtractor, V: EnvEditor> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub downloader: D,
    pub extractor: E,
    pub editor: V,
    pub base: PathBuf,
    pub settings: Settings,
}

impl<R: Runtime> Config<R, HttpDownloader, ArchiveExtractorImpl, PlatformEnvEditor> {
    pub fn new(runtime: R, base: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let base = resolve_base_dir(&runtime, base)?;
        let settings_path = resolve_settings_path(&base, config_path);
        let settings = Settings::load_or_init(&runtime, &settings_path)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        let http_client = HttpClient::new(client);
        let downloader = HttpDownloader::new(http_client.clone());
        let editor = platform_editor(&base);

        Ok(Self {
            runtime,
            http_client,
            downloader,
            extractor: ArchiveExtractorImpl::new(),
            editor,
            base,
            settings,
        })
    }
}

impl<R: Runtime + 'static, D: Downloader, E: ArchiveExtractor, V: EnvEditor> Config<R, D, E, V> {
    /// Turn this configuration into the engine for runtime `name`.
    pub fn into_manager(self, name: &str) -> Result<VersionManager<R, D, E, V>> {
        let toolchain = self.settings.toolchain(name, &self.base)?;
        let platform = Platform::detect().context("This operating system or CPU is not supported")?;
        let timeout = self.settings.download_timeout();

        Ok(VersionManager::new(
            self.runtime,
            self.http_client,
            self.downloader,
            self.extractor,
            self.editor,
            toolchain,
            platform,
        )
        .with_timeout(timeout))
    }
}
