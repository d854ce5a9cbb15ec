//! Local file registry.
//!
//! Tracks every on-disk materialization of every map unit. Two tables:
//! catalog-backed units keyed by [`CountryId`] (a unit can be present in
//! several versions at once, newest first), and "fake" units keyed by
//! [`CountryFile`] — the World overview maps and user-supplied files that
//! the catalog does not list.
//!
//! The registry is the single source of truth for the maps directory:
//! after any operation the on-disk files exactly match the registered
//! entries.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use mapdepot_core::{
    parse_file_name, paths, CountryFile, CountryId, LocalCountryFile, MapOptions,
};

use crate::catalog::CountryTree;

/// Registry of local map files, real and fake.
pub struct LocalFileRegistry {
    maps_dir: PathBuf,
    data_dir: Option<String>,
    /// Versions of catalog-backed units, newest first.
    files: HashMap<CountryId, Vec<LocalCountryFile>>,
    /// Units the catalog does not know; insertion-ordered for stable
    /// listings.
    fake_files: IndexMap<CountryFile, LocalCountryFile>,
}

impl LocalFileRegistry {
    /// Create an empty registry over `maps_dir`.
    pub fn new(maps_dir: impl Into<PathBuf>, data_dir: Option<String>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            data_dir,
            files: HashMap::new(),
            fake_files: IndexMap::new(),
        }
    }

    /// The writable maps directory.
    #[must_use]
    pub fn maps_dir(&self) -> &Path {
        &self.maps_dir
    }

    /// Directory of one data version's files.
    #[must_use]
    pub fn version_dir(&self, version: i64) -> PathBuf {
        paths::version_dir(&self.maps_dir, self.data_dir.as_deref(), version)
    }

    /// Forget all registrations. Disk contents are untouched.
    pub fn clear(&mut self) {
        self.files.clear();
        self.fake_files.clear();
    }

    /// Register one on-disk version of a catalog-backed unit.
    ///
    /// The version list stays sorted newest first with at most one entry
    /// per version; registering an already-known version unions the file
    /// masks.
    pub fn register(&mut self, id: &CountryId, local: LocalCountryFile) {
        let versions = self.files.entry(id.clone()).or_default();
        match versions.iter_mut().find(|v| v.version() == local.version()) {
            Some(existing) => existing.set_present(local.files()),
            None => {
                let at = versions
                    .iter()
                    .position(|v| v.version() < local.version())
                    .unwrap_or(versions.len());
                versions.insert(at, local);
            }
        }
    }

    /// Register a unit the catalog does not list.
    pub fn register_fake(&mut self, local: LocalCountryFile) {
        self.fake_files.insert(local.country_file().clone(), local);
    }

    /// Forget one version of a unit. Disk contents are untouched.
    pub fn deregister(&mut self, id: &CountryId, version: i64) {
        if let Some(versions) = self.files.get_mut(id) {
            versions.retain(|v| v.version() != version);
            if versions.is_empty() {
                self.files.remove(id);
            }
        }
    }

    /// Newest registered version of a unit.
    #[must_use]
    pub fn latest_local_file(&self, id: &CountryId) -> Option<&LocalCountryFile> {
        self.files.get(id).and_then(|versions| versions.first())
    }

    /// A specific registered version of a unit.
    #[must_use]
    pub fn local_file(&self, id: &CountryId, version: i64) -> Option<&LocalCountryFile> {
        self.files
            .get(id)?
            .iter()
            .find(|v| v.version() == version)
    }

    /// Fake unit by its file record.
    #[must_use]
    pub fn fake_file(&self, file: &CountryFile) -> Option<&LocalCountryFile> {
        self.fake_files.get(file)
    }

    /// Ids of all registered real units.
    #[must_use]
    pub fn real_map_ids(&self) -> Vec<CountryId> {
        self.files.keys().cloned().collect()
    }

    /// Every registered local map: the newest version of each real unit
    /// plus all fakes.
    #[must_use]
    pub fn local_maps(&self) -> Vec<&LocalCountryFile> {
        let mut maps: Vec<_> = self
            .files
            .values()
            .filter_map(|versions| versions.first())
            .collect();
        maps.extend(self.fake_files.values());
        maps
    }

    /// Number of downloaded real units. Fakes do not count.
    #[must_use]
    pub fn downloaded_files_count(&self) -> usize {
        self.files.len()
    }

    /// Remove the selected artifacts of every registered version of a unit
    /// from disk and from the registry.
    ///
    /// Deleting the map implies deleting the routing overlay; a version
    /// with no remaining artifacts is dropped entirely.
    pub fn delete_country_files(
        &mut self,
        id: &CountryId,
        options: MapOptions,
    ) -> io::Result<()> {
        let options = options.normalized_for_delete();
        let Some(versions) = self.files.get_mut(id) else {
            return Ok(());
        };
        for local in versions.iter_mut() {
            local.delete_from_disk(options)?;
        }
        versions.retain(|v| !v.files().is_empty());
        if versions.is_empty() {
            self.files.remove(id);
        }
        Ok(())
    }

    /// Drop every version of a unit older than `keep_version`, files
    /// included. Used after a newer version registered successfully.
    pub fn delete_older_versions(&mut self, id: &CountryId, keep_version: i64) -> io::Result<()> {
        let Some(versions) = self.files.get_mut(id) else {
            return Ok(());
        };
        for local in versions.iter_mut().filter(|v| v.version() < keep_version) {
            debug!(id = %id, version = local.version(), "deleting superseded version");
            local.delete_from_disk(MapOptions::MAP | MapOptions::CAR_ROUTING)?;
        }
        versions.retain(|v| v.version() >= keep_version);
        if versions.is_empty() {
            self.files.remove(id);
        }
        Ok(())
    }

    /// Remove one fake unit's files from disk and forget it.
    pub fn delete_fake_file(&mut self, file: &CountryFile) -> io::Result<()> {
        if let Some(mut local) = self.fake_files.shift_remove(file) {
            local.delete_from_disk(MapOptions::MAP | MapOptions::CAR_ROUTING)?;
        }
        Ok(())
    }

    /// Rescan the maps directory and rebuild the registry from scratch.
    ///
    /// All previous registrations are dropped first. When a unit is found
    /// in several versions, only the newest stays on disk; older versions
    /// are deleted. Units the catalog knows are registered under every id
    /// sharing the file name, everything else becomes a fake.
    pub fn register_all_local_maps(&mut self, catalog: &CountryTree) {
        self.clear();

        let mut found: HashMap<String, Vec<(i64, MapOptions)>> = HashMap::new();
        let root = match self.data_dir.as_deref() {
            Some(sub) => self.maps_dir.join(sub),
            None => self.maps_dir.clone(),
        };
        for (version, dir) in list_version_dirs(&root) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot read version directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some((base, option)) = parse_file_name(name) else {
                    continue;
                };
                let versions = found.entry(base.to_string()).or_default();
                match versions.iter_mut().find(|(v, _)| *v == version) {
                    Some((_, options)) => *options |= option,
                    None => versions.push((version, option)),
                }
            }
        }

        for (base, mut versions) in found {
            versions.sort_by_key(|(v, _)| std::cmp::Reverse(*v));
            let ids = catalog.find_all_indexes_by_file(&base);
            let country_file = ids
                .first()
                .and_then(|id| catalog.country(id))
                .and_then(|c| c.file().cloned())
                .unwrap_or_else(|| CountryFile::new(base.clone(), 0, 0));

            let (newest_version, newest_options) = versions[0];

            // Only the newest version survives on disk.
            for &(old_version, old_options) in &versions[1..] {
                let mut stale = LocalCountryFile::new(
                    self.version_dir(old_version),
                    country_file.clone(),
                    old_version,
                );
                stale.set_present(old_options);
                debug!(
                    file = %base,
                    version = old_version,
                    "deleting outdated local version"
                );
                if let Err(e) = stale.delete_from_disk(old_options) {
                    warn!(file = %base, version = old_version, error = %e,
                        "failed to delete outdated version");
                }
            }

            let mut local = LocalCountryFile::new(
                self.version_dir(newest_version),
                country_file,
                newest_version,
            );
            local.set_present(newest_options);

            if ids.is_empty() {
                debug!(file = %base, version = newest_version, "registering fake unit");
                self.register_fake(local);
            } else {
                for id in ids {
                    self.register(id, local.clone());
                }
            }
        }
    }
}

/// Integer-named subdirectories of `root`, as (version, path) pairs.
fn list_version_dirs(root: &Path) -> Vec<(i64, PathBuf)> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<(i64, PathBuf)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name();
            let version = paths::parse_version_dir_name(name.to_str()?)?;
            Some((version, e.path()))
        })
        .collect();
    dirs.sort_by_key(|(v, _)| *v);
    dirs
}
