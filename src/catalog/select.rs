use anyhow::Result;
use log::{debug, warn};
use url::Url;

use super::{Package, VersionCatalog};
use crate::error::VermanError;
use crate::platform::Platform;
use crate::settings::Mirror;

/// Pick the package of `version` built for `platform`.
///
/// The first package with an exact OS and architecture match wins. When a
/// mirror is configured the returned package's URL is rewritten through it.
pub fn select_package(
    catalog: &VersionCatalog,
    version: &str,
    platform: Platform,
    mirror: Option<&Mirror>,
) -> Result<Package> {
    let found = catalog
        .packages(version)
        .and_then(|packages| packages.iter().find(|p| p.platform == platform));

    let Some(package) = found else {
        return Err(VermanError::NotFound {
            runtime: catalog.runtime().to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
        }
        .into());
    };

    let mut package = package.clone();
    if let Some(mirror) = mirror {
        package.url = apply_mirror(&package.url, mirror);
    }
    debug!("Selected {} from {}", package.file_name, package.url);
    Ok(package)
}

/// Replace everything up to and including the first `mirror.marker` in `url`
/// with `mirror.base_url`.
///
/// `https://julialang-s3.julialang.net/bin/linux/x64/1.9/julia.tar.gz` through
/// a mirror `https://mirrors.example.com/julia/bin/` becomes
/// `https://mirrors.example.com/julia/bin/linux/x64/1.9/julia.tar.gz`.
/// A URL without the marker, or an unusable mirror base, is returned unchanged.
pub fn apply_mirror(url: &str, mirror: &Mirror) -> String {
    let Some((_, rest)) = url.split_once(mirror.marker.as_str()) else {
        debug!("No {:?} in {}, not using mirror", mirror.marker, url);
        return url.to_string();
    };

    let mut base = match Url::parse(mirror.base_url.trim()) {
        Ok(base) => base,
        Err(e) => {
            warn!("Ignoring invalid mirror URL {:?}: {}", mirror.base_url, e);
            return url.to_string();
        }
    };
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    match base.join(rest) {
        Ok(rewritten) => rewritten.to_string(),
        Err(e) => {
            warn!("Cannot join {:?} onto mirror {}: {}", rest, base, e);
            url.to_string()
        }
    }
}
