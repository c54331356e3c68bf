use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::ArchiveExtractor;

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // ZipArchive needs Read + Seek; Runtime::open only gives Read
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))?;

        if archive.len() == 0 {
            bail!("Archive {:?} contains no entries", archive_path);
        }

        let mut unpacked = 0usize;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let Some(entry_path) = entry.enclosed_name() else {
                debug!("Skipping entry with unsafe path: {:?}", entry.name());
                continue;
            };
            let full_path = extract_to.join(entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;
            drop(dest_file);

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode()
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
            unpacked += 1;
        }

        info!("Extracted {} files.", unpacked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_archives;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_can_handle_zip() {
        let extractor = ZipExtractor;
        assert!(extractor.can_handle(Path::new("julia-1.9.3-win64.zip")));
        assert!(extractor.can_handle(Path::new("JULIA.ZIP")));
        assert!(!extractor.can_handle(Path::new("julia.tar.gz")));
    }

    #[test]
    fn test_extract_nested_layout() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("julia.zip");
        let out = dir.path().join("out");
        fs::create_dir(&out)?;
        test_archives::zip(
            &archive,
            &[
                ("julia-1.9.3/bin/julia.exe", "exe"),
                ("julia-1.9.3/lib/libjulia.dll", "dll"),
            ],
        )?;

        ZipExtractor.extract(&RealRuntime, &archive, &out)?;

        assert_eq!(fs::read_to_string(out.join("julia-1.9.3/bin/julia.exe"))?, "exe");
        assert_eq!(fs::read_to_string(out.join("julia-1.9.3/lib/libjulia.dll"))?, "dll");
        Ok(())
    }

    #[test]
    fn test_extract_skips_path_traversal_entries() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("evil.zip");
        let out = dir.path().join("out");
        fs::create_dir(&out)?;
        test_archives::zip(
            &archive,
            &[("../escaped.txt", "evil"), ("julia/bin/julia", "ok")],
        )?;

        ZipExtractor.extract(&RealRuntime, &archive, &out)?;

        assert!(!dir.path().join("escaped.txt").exists());
        assert!(out.join("julia/bin/julia").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_sets_unix_permissions() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("julia.zip");
        test_archives::zip(&archive, &[("julia/bin/julia", "binary")]).unwrap();
        let bytes = fs::read(&archive).unwrap();

        let mut runtime = MockRuntime::new();

        // --- Setup ---
        runtime
            .expect_open()
            .returning(move |_| Ok(Box::new(std::io::Cursor::new(bytes.clone()))));
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_create_file()
            .returning(|_| Ok(Box::new(std::io::sink())));
        runtime
            .expect_set_permissions()
            .withf(|path, mode| path == Path::new("/out/julia/bin/julia") && mode & 0o777 == 0o755)
            .times(1)
            .returning(|_, _| Ok(()));

        // --- Execute & Verify ---
        ZipExtractor
            .extract(&runtime, &PathBuf::from("/tmp/julia.zip"), Path::new("/out"))
            .unwrap();
    }

    #[test]
    fn test_extract_invalid_zip() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("bad.zip");
        File::create(&archive)?.write_all(b"not a zip")?;

        let result = ZipExtractor.extract(&RealRuntime, &archive, dir.path());
        assert!(result.is_err());
        Ok(())
    }
}
