//! Status derivation and the query surface.
//!
//! Status for one unit is derived from queue position, the failed set and
//! the registry, in that order; group status folds leaf statuses by the
//! reporting precedence of [`NodeStatus::aggregate_rank`].

use std::path::PathBuf;

use mapdepot_core::{
    paths, ClientNodeAttrs, CountryFile, CountryId, LocalAndRemoteSize, LocalCountryFile,
    MapOptions, NodeStatus, Progress, ServerNodeAttrs,
};

use super::Storage;

impl Storage {
    /// Current data version declared by the catalog.
    #[must_use]
    pub fn current_data_version(&self) -> i64 {
        self.catalog.version()
    }

    /// Fast status of a node; does not check local versions for staleness.
    #[must_use]
    pub fn country_status(&self, id: &CountryId) -> NodeStatus {
        self.node_status(id, false)
    }

    /// Full status of a node, staleness included.
    #[must_use]
    pub fn country_status_ex(&self, id: &CountryId) -> NodeStatus {
        self.node_status(id, true)
    }

    fn node_status(&self, id: &CountryId, check_version: bool) -> NodeStatus {
        let Some(country) = self.catalog.country(id) else {
            return NodeStatus::Unknown;
        };
        if country.is_leaf() {
            return self.leaf_status(id, check_version);
        }
        let mut status: Option<NodeStatus> = None;
        for leaf in self.catalog.leaves_under(id) {
            let leaf_status = self.leaf_status(&leaf, check_version);
            status = Some(match status {
                Some(folded) => folded.combined_with(leaf_status),
                None => leaf_status,
            });
        }
        status.unwrap_or(NodeStatus::NotDownloaded)
    }

    fn leaf_status(&self, id: &CountryId, check_version: bool) -> NodeStatus {
        if self.queue.is_head(id) {
            return NodeStatus::Downloading;
        }
        if self.queue.is_queued(id) {
            return NodeStatus::InQueue;
        }
        if self.queue.is_failed(id) {
            return NodeStatus::DownloadFailed;
        }
        match self.registry.latest_local_file(id) {
            Some(local) if check_version && local.version() < self.catalog.version() => {
                NodeStatus::OnDiskOutOfDate
            }
            Some(_) => NodeStatus::OnDisk,
            None => NodeStatus::NotDownloaded,
        }
    }

    /// Whether every leaf under `id` has a local map file.
    ///
    /// `false` for unknown ids and for fake units, which never appear in
    /// the catalog.
    #[must_use]
    pub fn is_node_downloaded(&self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        let leaves = self.catalog.leaves_under(id);
        !leaves.is_empty()
            && leaves.iter().all(|leaf| {
                self.registry
                    .latest_local_file(leaf)
                    .is_some_and(|local| local.has(MapOptions::MAP))
            })
    }

    /// Downloaded content under the direct children of `parent`.
    ///
    /// A direct child with two or more downloaded leaves contributes its
    /// own id; a child with exactly one contributes that leaf's id; a
    /// child with none is omitted. Only real (catalog-listed) maps count.
    #[must_use]
    pub fn get_downloaded_children(&self, parent: &CountryId) -> Vec<CountryId> {
        let mut result = Vec::new();
        for child in self.catalog.children_of(parent) {
            let downloaded: Vec<CountryId> = self
                .catalog
                .leaves_under(&child)
                .into_iter()
                .filter(|leaf| self.registry.latest_local_file(leaf).is_some())
                .collect();
            match downloaded.len() {
                0 => {}
                1 => result.push(downloaded.into_iter().next().expect("len checked")),
                _ => result.push(child),
            }
        }
        result
    }

    /// Ids of all downloaded catalog-listed units, in id order.
    #[must_use]
    pub fn get_local_real_maps(&self) -> Vec<CountryId> {
        let mut ids = self.registry.real_map_ids();
        ids.sort();
        ids
    }

    /// Every local map, fakes included.
    #[must_use]
    pub fn get_local_maps(&self) -> Vec<LocalCountryFile> {
        self.registry.local_maps().into_iter().cloned().collect()
    }

    /// Number of downloaded real units.
    #[must_use]
    pub fn get_downloaded_files_count(&self) -> usize {
        self.registry.downloaded_files_count()
    }

    /// Catalog leaves whose local version is out of date, in catalog order.
    #[must_use]
    pub fn get_outdated_countries(&self) -> Vec<CountryId> {
        self.catalog
            .leaves_under(self.catalog.root_id())
            .into_iter()
            .filter(|leaf| self.country_status_ex(leaf) == NodeStatus::OnDiskOutOfDate)
            .collect()
    }

    /// Local and declared remote sizes of one unit's selected options.
    ///
    /// While the unit is downloading, the local side reports the bytes
    /// received so far.
    #[must_use]
    pub fn country_size_in_bytes(&self, id: &CountryId, options: MapOptions) -> LocalAndRemoteSize {
        let Some(file) = self.catalog.country(id).and_then(|c| c.file()) else {
            return LocalAndRemoteSize::default();
        };
        let remote = file.remote_size(options);
        let local = if self.queue.is_head(id) {
            self.queue.head().map_or(0, |head| head.progress().done)
        } else {
            self.registry.latest_local_file(id).map_or(0, |local| {
                options
                    .components()
                    .filter(|&option| local.has(option))
                    .filter_map(|option| local.file_size(option))
                    .sum()
            })
        };
        LocalAndRemoteSize { local, remote }
    }

    /// Attributes of a node as available on the server.
    #[must_use]
    pub fn server_node_attrs(&self, id: &CountryId) -> Option<ServerNodeAttrs> {
        let country = self.catalog.country(id)?;
        let node_size = match country.file() {
            Some(file) => file.remote_size(MapOptions::MAP),
            None => self
                .catalog
                .leaves_under(id)
                .iter()
                .filter_map(|leaf| self.catalog.country(leaf).and_then(|c| c.file()))
                .map(|file| file.remote_size(MapOptions::MAP))
                .sum(),
        };
        Some(ServerNodeAttrs {
            node_size,
            children_count: country.is_expandable().then(|| country.child_count()),
            parent_id: self.catalog.parent_of(id).cloned(),
        })
    }

    /// Attributes of a node as present on this device.
    #[must_use]
    pub fn client_node_attrs(&self, id: &CountryId) -> Option<ClientNodeAttrs> {
        let country = self.catalog.country(id)?;

        if let Some(file) = country.file() {
            let local = self.registry.latest_local_file(id);
            let status = self.leaf_status(id, true);
            let download_progress = match status {
                NodeStatus::Downloading => {
                    self.queue.head().map_or(0, |head| head.progress().percent())
                }
                _ if local.is_some() => 100,
                _ => 0,
            };
            return Some(ClientNodeAttrs {
                node_size: local.map_or(0, |_| file.remote_size(MapOptions::MAP)),
                maps_downloaded: None,
                version: local.map(LocalCountryFile::version),
                download_progress,
                status,
            });
        }

        // Group: sum downloaded leaves; progress is byte-weighted across
        // the subtree.
        let mut node_size = 0;
        let mut maps_downloaded = 0;
        let mut bytes_total = 0u64;
        let mut bytes_done = 0u64;
        for leaf in self.catalog.leaves_under(id) {
            let Some(file) = self.catalog.country(&leaf).and_then(|c| c.file()) else {
                continue;
            };
            let size = file.remote_size(MapOptions::MAP);
            bytes_total += size;
            if self.registry.latest_local_file(&leaf).is_some() {
                node_size += size;
                maps_downloaded += 1;
                bytes_done += size;
            } else if self.queue.is_head(&leaf) {
                bytes_done += self
                    .queue
                    .head()
                    .map_or(0, |head| head.progress().done.min(size));
            }
        }
        Some(ClientNodeAttrs {
            node_size,
            maps_downloaded: Some(maps_downloaded),
            version: None,
            download_progress: Progress::new(bytes_done, bytes_total).percent(),
            status: self.node_status(id, true),
        })
    }

    /// Id of the unit currently downloading.
    #[must_use]
    pub fn currently_downloading(&self) -> Option<&CountryId> {
        self.queue.head().map(|head| head.id())
    }

    /// Whether any unit is downloading or queued.
    #[must_use]
    pub fn is_download_in_progress(&self) -> bool {
        self.queue.head().is_some()
    }

    /// Newest local version of a catalog-listed unit.
    #[must_use]
    pub fn latest_local_file(&self, id: &CountryId) -> Option<&LocalCountryFile> {
        self.registry.latest_local_file(id)
    }

    /// Newest local version by file record; falls back to fake units.
    #[must_use]
    pub fn latest_local_file_for(&self, file: &CountryFile) -> Option<&LocalCountryFile> {
        if let Some(id) = self.catalog.find_country_id_by_file(file.name()) {
            if let Some(local) = self.registry.latest_local_file(id) {
                return Some(local);
            }
        }
        self.registry.fake_file(file)
    }

    /// Download URL of one unit artifact on one mirror.
    #[must_use]
    pub fn file_download_url(
        &self,
        base_url: &str,
        id: &CountryId,
        option: MapOptions,
    ) -> Option<String> {
        let file = self.catalog.country(id)?.file()?;
        Some(paths::file_download_url(
            base_url,
            self.catalog.version(),
            &file.file_name(option),
        ))
    }

    /// Destination path of one unit artifact for the current version.
    #[must_use]
    pub fn file_download_path(&self, id: &CountryId, option: MapOptions) -> Option<PathBuf> {
        let file = self.catalog.country(id)?.file()?;
        Some(
            self.registry
                .version_dir(self.catalog.version())
                .join(file.file_name(option)),
        )
    }
}
