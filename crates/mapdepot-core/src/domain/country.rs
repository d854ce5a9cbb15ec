//! Country identity and file naming.
//!
//! Pure data types with no I/O dependencies.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of a map data file on disk.
pub const MAP_FILE_EXTENSION: &str = ".mwm";
/// Extension of a routing overlay file on disk.
pub const ROUTING_FILE_EXTENSION: &str = ".mwm.routing";

/// Identifier of a node in the country tree.
///
/// Ids are opaque strings assigned by the catalog source and are unique
/// within one catalog load. The same type names both leaf map units and
/// interior groups.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryId(String);

impl CountryId {
    /// Create an id from a raw catalog string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CountryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

bitflags! {
    /// Which artifacts of a map unit are selected.
    ///
    /// The routing overlay is useless without its map, so download sets are
    /// normalized with [`MapOptions::normalized_for_download`] before they
    /// reach the queue, and delete sets with
    /// [`MapOptions::normalized_for_delete`] before they reach the registry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MapOptions: u8 {
        /// The map data itself.
        const MAP = 0b01;
        /// The car routing overlay.
        const CAR_ROUTING = 0b10;
    }
}

impl MapOptions {
    /// Downloading the routing overlay always implies downloading the map.
    #[must_use]
    pub fn normalized_for_download(self) -> Self {
        if self.contains(Self::CAR_ROUTING) {
            self | Self::MAP
        } else {
            self
        }
    }

    /// Deleting the map always implies deleting the routing overlay.
    #[must_use]
    pub fn normalized_for_delete(self) -> Self {
        if self.contains(Self::MAP) {
            self | Self::CAR_ROUTING
        } else {
            self
        }
    }

    /// Individual options in canonical download order (map first).
    pub fn components(self) -> impl Iterator<Item = Self> {
        [Self::MAP, Self::CAR_ROUTING]
            .into_iter()
            .filter(move |opt| self.contains(*opt))
    }

    /// Number of selected options.
    #[must_use]
    pub fn component_count(self) -> usize {
        self.components().count()
    }
}

/// File-naming record of a leaf map unit.
///
/// Carries the base file name and the sizes the catalog declares for each
/// downloadable artifact of the unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryFile {
    name: String,
    map_size: u64,
    routing_size: u64,
}

impl CountryFile {
    /// Create a record for `name` with the declared remote sizes.
    pub fn new(name: impl Into<String>, map_size: u64, routing_size: u64) -> Self {
        Self {
            name: name.into(),
            map_size,
            routing_size,
        }
    }

    /// Base file name without any extension.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared remote size of the selected options, summed.
    #[must_use]
    pub fn remote_size(&self, options: MapOptions) -> u64 {
        let mut total = 0;
        if options.contains(MapOptions::MAP) {
            total += self.map_size;
        }
        if options.contains(MapOptions::CAR_ROUTING) {
            total += self.routing_size;
        }
        total
    }

    /// On-disk file name of a single option.
    ///
    /// `option` must name exactly one artifact.
    #[must_use]
    pub fn file_name(&self, option: MapOptions) -> String {
        debug_assert_eq!(option.component_count(), 1);
        if option.contains(MapOptions::CAR_ROUTING) {
            format!("{}{ROUTING_FILE_EXTENSION}", self.name)
        } else {
            format!("{}{MAP_FILE_EXTENSION}", self.name)
        }
    }
}

/// Split an on-disk file name into its base name and the option it carries.
///
/// Returns `None` for file names that are not map artifacts.
#[must_use]
pub fn parse_file_name(file_name: &str) -> Option<(&str, MapOptions)> {
    // Routing first: its extension is a superset of the map extension.
    if let Some(base) = file_name.strip_suffix(ROUTING_FILE_EXTENSION) {
        return Some((base, MapOptions::CAR_ROUTING));
    }
    if let Some(base) = file_name.strip_suffix(MAP_FILE_EXTENSION) {
        return Some((base, MapOptions::MAP));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_download_implies_map() {
        let opts = MapOptions::CAR_ROUTING.normalized_for_download();
        assert!(opts.contains(MapOptions::MAP));
        assert!(opts.contains(MapOptions::CAR_ROUTING));
    }

    #[test]
    fn map_delete_implies_routing() {
        let opts = MapOptions::MAP.normalized_for_delete();
        assert_eq!(opts, MapOptions::MAP | MapOptions::CAR_ROUTING);
    }

    #[test]
    fn components_are_in_canonical_order() {
        let all = MapOptions::MAP | MapOptions::CAR_ROUTING;
        let parts: Vec<_> = all.components().collect();
        assert_eq!(parts, vec![MapOptions::MAP, MapOptions::CAR_ROUTING]);
    }

    #[test]
    fn file_names_carry_extensions() {
        let file = CountryFile::new("Belarus", 100, 20);
        assert_eq!(file.file_name(MapOptions::MAP), "Belarus.mwm");
        assert_eq!(file.file_name(MapOptions::CAR_ROUTING), "Belarus.mwm.routing");
    }

    #[test]
    fn remote_size_sums_selected_options() {
        let file = CountryFile::new("Belarus", 100, 20);
        assert_eq!(file.remote_size(MapOptions::MAP), 100);
        assert_eq!(file.remote_size(MapOptions::CAR_ROUTING), 20);
        assert_eq!(file.remote_size(MapOptions::MAP | MapOptions::CAR_ROUTING), 120);
        assert_eq!(file.remote_size(MapOptions::empty()), 0);
    }

    #[test]
    fn parse_file_name_distinguishes_extensions() {
        assert_eq!(
            parse_file_name("Belarus.mwm"),
            Some(("Belarus", MapOptions::MAP))
        );
        assert_eq!(
            parse_file_name("Belarus.mwm.routing"),
            Some(("Belarus", MapOptions::CAR_ROUTING))
        );
        assert_eq!(parse_file_name("notes.txt"), None);
    }
}
