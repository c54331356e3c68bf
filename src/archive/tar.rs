use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::io::Read;
use std::path::Path;
use tar::Archive;
use xz2::read::XzDecoder;

use super::ArchiveExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Xz,
}

impl Compression {
    fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Compression::Gzip => &[".tar.gz", ".tgz"],
            Compression::Xz => &[".tar.xz", ".txz"],
        }
    }
}

/// Extractor for compressed tarballs.
pub struct TarExtractor {
    compression: Compression,
}

impl TarExtractor {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn decoder(&self, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        match self.compression {
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
        }
    }
}

impl ArchiveExtractor for TarExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        self.compression
            .suffixes()
            .iter()
            .any(|suffix| name.ends_with(suffix))
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting {:?} tarball to {:?}...", self.compression, extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        let mut archive = Archive::new(self.decoder(file));
        archive.set_preserve_permissions(true);
        archive.set_overwrite(true);

        let mut unpacked = 0usize;
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry
                .with_context(|| format!("Corrupt entry in archive {:?}", archive_path))?;
            let entry_path = entry.path()?.to_path_buf();

            // unpack_in refuses absolute paths and `..` components
            if !entry
                .unpack_in(extract_to)
                .with_context(|| format!("Failed to extract {:?}", entry_path))?
            {
                debug!("Skipping entry outside extraction dir: {:?}", entry_path);
                continue;
            }
            unpacked += 1;
        }

        if unpacked == 0 {
            bail!("Archive {:?} contains no entries", archive_path);
        }

        info!("Extracted {} entries.", unpacked);
        Ok(())
    }
}
