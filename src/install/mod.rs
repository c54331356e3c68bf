//! Installer: unpack an archive into its version directory and find the
//! directory the active-version link should point at.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveExtractor;
use crate::error::VermanError;
use crate::runtime::Runtime;

/// How far below the version directory the binary root may be nested.
pub const MAX_SEARCH_DEPTH: usize = 4;

/// Extract `archive` into a fresh `dest` and return its binary root.
///
/// Any existing `dest` is removed first. If extraction fails or no binary
/// root exists, `dest` is removed again and an extraction error is returned.
#[tracing::instrument(skip(runtime, extractor))]
pub fn install<R: Runtime + 'static, E: ArchiveExtractor>(
    runtime: &R,
    extractor: &E,
    archive: &Path,
    dest: &Path,
    marker: &str,
) -> Result<PathBuf> {
    if runtime.exists(dest) {
        debug!("Removing previous contents of {:?}", dest);
        runtime.remove_dir_all(dest)?;
    }

    if !extractor.can_handle(archive) {
        return Err(VermanError::extraction(archive, "unsupported archive format").into());
    }

    runtime.create_dir_all(dest)?;

    info!("Extracting {:?} into {:?}", archive, dest);
    if let Err(e) = extractor.extract(runtime, archive, dest) {
        remove_partial(runtime, dest);
        return Err(VermanError::extraction(archive, format!("{:#}", e)).into());
    }

    match locate_binary_root(runtime, dest, marker)? {
        Some(root) => {
            debug!("Binary root: {:?}", root);
            Ok(root)
        }
        None => {
            remove_partial(runtime, dest);
            Err(VermanError::extraction(
                archive,
                format!("no '{}' directory found in the extracted files", marker),
            )
            .into())
        }
    }
}

/// Breadth-first search for the shallowest directory under `dir` (inclusive)
/// that has a subdirectory named `marker`.
pub fn locate_binary_root<R: Runtime>(
    runtime: &R,
    dir: &Path,
    marker: &str,
) -> Result<Option<PathBuf>> {
    if !runtime.is_dir(dir) {
        return Ok(None);
    }

    let mut queue = VecDeque::from([(dir.to_path_buf(), 0usize)]);
    while let Some((current, depth)) = queue.pop_front() {
        if runtime.is_dir(&current.join(marker)) {
            return Ok(Some(current));
        }
        if depth >= MAX_SEARCH_DEPTH {
            continue;
        }

        let mut children = runtime.read_dir(&current)?;
        children.sort();
        for child in children {
            if runtime.is_dir(&child) && !runtime.is_symlink(&child) {
                queue.push_back((child, depth + 1));
            }
        }
    }
    Ok(None)
}

fn remove_partial<R: Runtime>(runtime: &R, dest: &Path) {
    if let Err(e) = runtime.remove_dir_all(dest) {
        warn!("Failed to clean up {:?}: {:#}", dest, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExtractorImpl, MockArchiveExtractor, test_archives};
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_install_tarball_returns_nested_binary_root() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("julia-1.9.3-linux-x86_64.tar.gz");
        test_archives::tar_gz(
            &archive,
            &[
                ("julia-1.9.3/bin/julia", "binary"),
                ("julia-1.9.3/share/julia/stdlib/Pkg/bin/helper", "nested bin"),
            ],
        )
        .unwrap();
        let dest = dir.path().join("untar").join("1.9.3");

        let root = install(
            &RealRuntime,
            &ArchiveExtractorImpl::new(),
            &archive,
            &dest,
            "bin",
        )
        .unwrap();

        assert_eq!(root, dest.join("julia-1.9.3"));
    }

    #[test]
    fn test_install_flat_zip_binary_root_is_version_dir() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool-2.0.0-windows-x86_64.zip");
        test_archives::zip(&archive, &[("bin/tool.exe", "exe")]).unwrap();
        let dest = dir.path().join("untar").join("2.0.0");

        let root = install(
            &RealRuntime,
            &ArchiveExtractorImpl::new(),
            &archive,
            &dest,
            "bin",
        )
        .unwrap();

        assert_eq!(root, dest);
    }

    #[test]
    fn test_install_replaces_existing_version_dir() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("untar").join("1.9.3");
        fs::create_dir_all(dest.join("stale")).unwrap();
        fs::write(dest.join("stale").join("leftover"), "old").unwrap();

        let archive = dir.path().join("julia.tar.gz");
        test_archives::tar_gz(&archive, &[("julia-1.9.3/bin/julia", "binary")]).unwrap();

        install(
            &RealRuntime,
            &ArchiveExtractorImpl::new(),
            &archive,
            &dest,
            "bin",
        )
        .unwrap();

        assert!(!dest.join("stale").exists());
        assert!(dest.join("julia-1.9.3/bin/julia").exists());
    }

    #[test]
    fn test_install_without_marker_removes_dest() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("julia.tar.gz");
        test_archives::tar_gz(&archive, &[("julia-1.9.3/README.md", "no binaries")]).unwrap();
        let dest = dir.path().join("untar").join("1.9.3");

        let err = install(
            &RealRuntime,
            &ArchiveExtractorImpl::new(),
            &archive,
            &dest,
            "bin",
        )
        .unwrap_err();

        assert!(matches!(
            VermanError::find(&err),
            Some(VermanError::Extraction { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_install_corrupt_archive_removes_dest() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("julia.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        let dest = dir.path().join("untar").join("1.9.3");

        let err = install(
            &RealRuntime,
            &ArchiveExtractorImpl::new(),
            &archive,
            &dest,
            "bin",
        )
        .unwrap_err();

        assert!(matches!(
            VermanError::find(&err),
            Some(VermanError::Extraction { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_install_unsupported_format_creates_nothing() {
        let mut runtime = MockRuntime::new();
        let dest = PathBuf::from("/v/julia/untar/1.9.3");

        // --- Setup ---
        runtime
            .expect_exists()
            .with(eq(dest.clone()))
            .returning(|_| false);

        let mut extractor = MockArchiveExtractor::new();
        extractor.expect_can_handle().returning(|_| false);

        // --- Execute & Verify ---
        // create_dir_all is not expected: the mock panics if it is called
        let err = install(
            &runtime,
            &extractor,
            Path::new("/v/julia/tar/julia.dmg"),
            &dest,
            "bin",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported archive format"));
    }

    #[test]
    fn test_install_extractor_failure_is_extraction_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("untar").join("1.9.3");

        let mut extractor = MockArchiveExtractor::new();
        extractor.expect_can_handle().returning(|_| true);
        extractor
            .expect_extract()
            .returning(|_: &RealRuntime, _, dest| {
                fs::create_dir_all(dest.join("julia-1.9.3"))?;
                Err(anyhow::anyhow!("unexpected end of archive"))
            });

        let err = install(
            &RealRuntime,
            &extractor,
            Path::new("julia.tar.gz"),
            &dest,
            "bin",
        )
        .unwrap_err();

        assert!(err.to_string().contains("unexpected end of archive"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_locate_binary_root_prefers_shallowest() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c/bin")).unwrap();
        fs::create_dir_all(dir.path().join("z/bin")).unwrap();

        let root = locate_binary_root(&RealRuntime, dir.path(), "bin").unwrap();
        assert_eq!(root, Some(dir.path().join("z")));
    }

    #[test]
    fn test_locate_binary_root_respects_depth_limit() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1/2/3/4/5/bin")).unwrap();

        let root = locate_binary_root(&RealRuntime, dir.path(), "bin").unwrap();
        assert_eq!(root, None);
    }

    #[test]
    fn test_locate_binary_root_ignores_marker_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("julia")).unwrap();
        fs::write(dir.path().join("julia").join("bin"), "a file, not a dir").unwrap();

        let root = locate_binary_root(&RealRuntime, dir.path(), "bin").unwrap();
        assert_eq!(root, None);
    }

    #[test]
    fn test_locate_binary_root_missing_dir() {
        let dir = tempdir().unwrap();
        let root = locate_binary_root(&RealRuntime, &dir.path().join("nope"), "bin").unwrap();
        assert_eq!(root, None);
    }
}
