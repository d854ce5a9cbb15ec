//! Writable directory resolution and download path/URL helpers.
//!
//! The on-disk layout is `<maps_dir>[/<data_dir>]/<version>/<file>` where
//! version directories are plain integers. The maps directory itself is
//! resolved from an explicit override, the `MAPDEPOT_MAPS_DIR` environment
//! variable, or a platform default, in that order.

use std::env;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable overriding the maps directory.
pub const MAPS_DIR_ENV: &str = "MAPDEPOT_MAPS_DIR";

/// Default relative location of the maps directory under the platform data
/// directory.
pub const DEFAULT_MAPS_DIR_RELATIVE: &str = "mapdepot/maps";

/// Error resolving a writable directory.
#[derive(Debug, Error)]
pub enum PathError {
    /// The platform reports no data directory for the current user.
    #[error("no platform data directory available")]
    NoDataDir,
}

/// How the maps directory was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapsDirSource {
    /// The caller passed an explicit path.
    Explicit,
    /// The path came from [`MAPS_DIR_ENV`].
    EnvVar,
    /// Platform default.
    Default,
}

/// Resolution result for the maps directory.
#[derive(Debug, Clone)]
pub struct MapsDirResolution {
    /// The resolved path.
    pub path: PathBuf,
    /// How the path was determined.
    pub source: MapsDirSource,
}

/// Return the platform default maps directory.
pub fn default_maps_dir() -> Result<PathBuf, PathError> {
    let data = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(data.join(DEFAULT_MAPS_DIR_RELATIVE))
}

/// Resolve the maps directory from an explicit override, env var, or default.
pub fn resolve_maps_dir(explicit: Option<&str>) -> Result<MapsDirResolution, PathError> {
    if let Some(path) = explicit {
        return Ok(MapsDirResolution {
            path: PathBuf::from(path),
            source: MapsDirSource::Explicit,
        });
    }

    if let Ok(env_path) = env::var(MAPS_DIR_ENV) {
        if !env_path.trim().is_empty() {
            return Ok(MapsDirResolution {
                path: PathBuf::from(env_path),
                source: MapsDirSource::EnvVar,
            });
        }
    }

    Ok(MapsDirResolution {
        path: default_maps_dir()?,
        source: MapsDirSource::Default,
    })
}

/// Directory holding one data version's files.
#[must_use]
pub fn version_dir(maps_dir: &Path, data_dir: Option<&str>, version: i64) -> PathBuf {
    let mut dir = maps_dir.to_path_buf();
    if let Some(sub) = data_dir {
        dir.push(sub);
    }
    dir.push(version.to_string());
    dir
}

/// Parse a directory name as a data version.
///
/// Only non-negative integer names are version directories.
#[must_use]
pub fn parse_version_dir_name(name: &str) -> Option<i64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Percent-encode a file name for use in a download URL path segment.
#[must_use]
pub fn percent_encode_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.as_bytes() {
        match *b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*b as char);
            }
            b => write!(&mut out, "%{b:02X}").unwrap(),
        }
    }
    out
}

/// Build the download URL of one file on one mirror.
#[must_use]
pub fn file_download_url(server: &str, version: i64, file_name: &str) -> String {
    format!(
        "{}/{version}/{}",
        server.trim_end_matches('/'),
        percent_encode_component(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_dir_layout() {
        assert_eq!(
            version_dir(Path::new("/maps"), None, 150_101),
            PathBuf::from("/maps/150101")
        );
        assert_eq!(
            version_dir(Path::new("/maps"), Some("staging"), 150_101),
            PathBuf::from("/maps/staging/150101")
        );
    }

    #[test]
    fn version_dir_names_are_integers_only() {
        assert_eq!(parse_version_dir_name("150101"), Some(150_101));
        assert_eq!(parse_version_dir_name("0"), Some(0));
        assert_eq!(parse_version_dir_name(""), None);
        assert_eq!(parse_version_dir_name("150101a"), None);
        assert_eq!(parse_version_dir_name("-3"), None);
        assert_eq!(parse_version_dir_name("tmp"), None);
    }

    #[test]
    fn url_encodes_file_name() {
        assert_eq!(
            file_download_url("https://mirror.example.com/maps", 150_101, "Cote dIvoire.mwm"),
            "https://mirror.example.com/maps/150101/Cote%20dIvoire.mwm"
        );
    }

    #[test]
    fn url_strips_trailing_slash() {
        assert_eq!(
            file_download_url("https://m.example.com/", 1, "A.mwm"),
            "https://m.example.com/1/A.mwm"
        );
    }

    #[test]
    fn resolve_prefers_explicit() {
        let resolved = resolve_maps_dir(Some("/tmp/explicit-maps")).unwrap();
        assert_eq!(resolved.source, MapsDirSource::Explicit);
        assert!(resolved.path.ends_with("explicit-maps"));
    }
}
