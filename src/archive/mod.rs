mod tar;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::path::Path;

pub use self::tar::{Compression, TarExtractor};
pub use self::zip::ZipExtractor;

/// Format-specific archive extractor.
///
/// Entries are unpacked into `extract_to` as they appear in the archive.
/// Nothing is stripped: the installer looks for the binary root afterwards.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    fn can_handle(&self, archive_path: &Path) -> bool;

    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()>;
}

/// Picks the extractor from the archive's file extension.
pub struct ArchiveExtractorImpl {
    gzip: TarExtractor,
    xz: TarExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            gzip: TarExtractor::new(Compression::Gzip),
            xz: TarExtractor::new(Compression::Xz),
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.gzip.can_handle(archive_path)
            || self.xz.can_handle(archive_path)
            || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.gzip.can_handle(archive_path) {
            return self.gzip.extract(runtime, archive_path, extract_to);
        }
        if self.xz.can_handle(archive_path) {
            return self.xz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}
