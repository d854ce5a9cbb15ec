//! On-disk materialization of a map unit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::country::{CountryFile, MapOptions};

/// One specific version of a map unit as it exists on disk.
///
/// A unit can be present in several versions at once (during updates);
/// each version lives in its own directory and gets its own value of this
/// type. The `files` mask records which artifacts the version actually has.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalCountryFile {
    directory: PathBuf,
    country_file: CountryFile,
    version: i64,
    files: MapOptions,
}

impl LocalCountryFile {
    /// Describe a (possibly not yet downloaded) version in `directory`.
    ///
    /// The files mask starts empty; call [`sync_with_disk`](Self::sync_with_disk)
    /// or [`set_present`](Self::set_present) to populate it.
    pub fn new(directory: impl Into<PathBuf>, country_file: CountryFile, version: i64) -> Self {
        Self {
            directory: directory.into(),
            country_file,
            version,
            files: MapOptions::empty(),
        }
    }

    /// Directory holding this version's files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The unit's file-naming record.
    #[must_use]
    pub fn country_file(&self) -> &CountryFile {
        &self.country_file
    }

    /// Data version of this materialization.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Artifacts present on disk, as of the last sync.
    #[must_use]
    pub const fn files(&self) -> MapOptions {
        self.files
    }

    /// Whether `options` are all present.
    #[must_use]
    pub fn has(&self, options: MapOptions) -> bool {
        self.files.contains(options)
    }

    /// Full path of a single artifact.
    #[must_use]
    pub fn path(&self, option: MapOptions) -> PathBuf {
        self.directory.join(self.country_file.file_name(option))
    }

    /// Size of a single on-disk artifact, or `None` if it is absent.
    #[must_use]
    pub fn file_size(&self, option: MapOptions) -> Option<u64> {
        fs::metadata(self.path(option)).ok().map(|m| m.len())
    }

    /// Mark `options` present without touching the disk.
    ///
    /// Used by the download path, which knows what it just wrote.
    pub fn set_present(&mut self, options: MapOptions) {
        self.files |= options;
    }

    /// Probe the disk and rebuild the files mask from what is there.
    pub fn sync_with_disk(&mut self) {
        self.files = MapOptions::empty();
        for option in (MapOptions::MAP | MapOptions::CAR_ROUTING).components() {
            if self.path(option).exists() {
                self.files |= option;
            }
        }
    }

    /// Remove the selected artifacts from disk and from the mask.
    ///
    /// Missing files are not an error; the mask ends up matching the disk
    /// either way.
    pub fn delete_from_disk(&mut self, options: MapOptions) -> io::Result<()> {
        for option in options.components() {
            let path = self.path(option);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            self.files -= option;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn country_file() -> CountryFile {
        CountryFile::new("Minsk", 10, 4)
    }

    #[test]
    fn paths_follow_file_naming() {
        let local = LocalCountryFile::new("/maps/150101", country_file(), 150_101);
        assert_eq!(local.path(MapOptions::MAP), Path::new("/maps/150101/Minsk.mwm"));
        assert_eq!(
            local.path(MapOptions::CAR_ROUTING),
            Path::new("/maps/150101/Minsk.mwm.routing")
        );
    }

    #[test]
    fn sync_with_disk_reflects_existing_files() {
        let dir = tempdir().unwrap();
        let mut local = LocalCountryFile::new(dir.path(), country_file(), 1);
        fs::write(local.path(MapOptions::MAP), b"map").unwrap();

        local.sync_with_disk();
        assert_eq!(local.files(), MapOptions::MAP);

        fs::write(local.path(MapOptions::CAR_ROUTING), b"routing").unwrap();
        local.sync_with_disk();
        assert_eq!(local.files(), MapOptions::MAP | MapOptions::CAR_ROUTING);
    }

    #[test]
    fn delete_from_disk_removes_files_and_mask_bits() {
        let dir = tempdir().unwrap();
        let mut local = LocalCountryFile::new(dir.path(), country_file(), 1);
        fs::write(local.path(MapOptions::MAP), b"map").unwrap();
        fs::write(local.path(MapOptions::CAR_ROUTING), b"routing").unwrap();
        local.sync_with_disk();

        local.delete_from_disk(MapOptions::CAR_ROUTING).unwrap();
        assert_eq!(local.files(), MapOptions::MAP);
        assert!(!local.path(MapOptions::CAR_ROUTING).exists());
        assert!(local.path(MapOptions::MAP).exists());
    }

    #[test]
    fn delete_of_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let mut local = LocalCountryFile::new(dir.path(), country_file(), 1);
        assert!(local.delete_from_disk(MapOptions::MAP).is_ok());
    }
}
