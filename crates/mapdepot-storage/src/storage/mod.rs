//! The storage coordinator.
//!
//! [`Storage`] is the facade of the subsystem: it owns the catalog, the
//! local file registry, the download queue, the downloader gateway and the
//! observer bus, and orchestrates them under the public node operations.
//!
//! # Threading
//!
//! `Storage` is single-threaded by construction: every method takes
//! `&mut self` and there is no interior locking. The downloader does its
//! I/O elsewhere and marshals results into the event channel; the owning
//! thread drains that channel through [`Storage::process_events`] (or the
//! [`Storage::run`] loop). No downloader result touches any state outside
//! that drain.
//!
//! # Notifications
//!
//! Observer callbacks never run in the middle of a mutation. Operations
//! queue notifications into a local list and drain it once the mutation is
//! complete; ancestor fan-out for one event therefore finishes before the
//! next event is processed.

mod persist;
mod status;

pub use persist::QUEUE_FILE_NAME;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info, warn};

use mapdepot_core::{
    CountryId, DownloadError, DownloaderEvent, ErrorCode, LegacyMigrator, LocalCountryFile,
    MapFilesDownloader, MapOptions, NodeStatus, Progress, StorageError,
};

use crate::catalog::CountryTree;
use crate::gateway::{DownloaderGateway, FileSpec, UnitOutcome, UnitPlan};
use crate::observers::{ChangeCallback, ObserverBus, ProgressCallback, StatusCallback};
use crate::queue::{DownloadQueue, Enqueued};
use crate::registry::LocalFileRegistry;

/// Callback invoked when all requested files of a unit finished and the
/// new local version became available.
pub type MapReadyCallback = Box<dyn FnMut(&LocalCountryFile) + Send>;

/// Callback jumping the application's map view to a node.
pub type ShowHandler = Box<dyn FnMut(&CountryId) + Send>;

/// Static configuration of a storage instance.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Writable maps directory.
    pub maps_dir: PathBuf,
    /// Optional subdirectory for side-channel downloads. An instance with
    /// a data dir is only good for downloading, not for serving maps.
    pub data_dir: Option<String>,
}

impl StorageConfig {
    /// Configuration over `maps_dir` with no data subdirectory.
    pub fn new(maps_dir: impl Into<PathBuf>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            data_dir: None,
        }
    }

    /// Route downloads into `<maps_dir>/<dir>`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

/// External collaborators of a storage instance.
pub struct StorageDeps {
    /// The file downloader.
    pub downloader: Arc<dyn MapFilesDownloader>,
    /// The legacy layout migrator.
    pub migrator: Arc<dyn LegacyMigrator>,
}

enum Notification {
    Status(CountryId),
    Progress(CountryId, Progress),
    Error(CountryId, ErrorCode),
}

/// The map storage subsystem facade.
pub struct Storage {
    catalog: CountryTree,
    registry: LocalFileRegistry,
    queue: DownloadQueue,
    gateway: DownloaderGateway,
    observers: ObserverBus,
    migrator: Arc<dyn LegacyMigrator>,
    events: UnboundedReceiver<DownloaderEvent>,
    config: StorageConfig,
    map_ready: Option<MapReadyCallback>,
    show_handler: Option<ShowHandler>,
    pending_notifications: Vec<Notification>,
}

impl Storage {
    /// Build a storage instance from a country description document.
    ///
    /// The registry starts empty; call
    /// [`register_all_local_maps`](Self::register_all_local_maps) to pick
    /// up what is already on disk.
    pub fn new(
        countries_json: &str,
        config: StorageConfig,
        deps: StorageDeps,
    ) -> Result<Self, StorageError> {
        let catalog = CountryTree::from_json(countries_json)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gateway = DownloaderGateway::new(deps.downloader, events_tx);
        let registry = LocalFileRegistry::new(config.maps_dir.clone(), config.data_dir.clone());
        info!(
            version = catalog.version(),
            countries = catalog.countries_count(catalog.root_id()),
            maps_dir = %config.maps_dir.display(),
            "storage initialized"
        );
        Ok(Self {
            catalog,
            registry,
            queue: DownloadQueue::new(),
            gateway,
            observers: ObserverBus::new(),
            migrator: deps.migrator,
            events: events_rx,
            config,
            map_ready: None,
            show_handler: None,
            pending_notifications: Vec::new(),
        })
    }

    /// Register the "map file available" callback.
    pub fn init(&mut self, map_ready: MapReadyCallback) {
        self.map_ready = Some(map_ready);
    }

    /// Register the handler behind [`show_node`](Self::show_node).
    pub fn set_show_handler(&mut self, handler: ShowHandler) {
        self.show_handler = Some(handler);
    }

    /// The loaded country tree.
    #[must_use]
    pub fn catalog(&self) -> &CountryTree {
        &self.catalog
    }

    /// The writable maps directory.
    #[must_use]
    pub fn maps_dir(&self) -> &Path {
        &self.config.maps_dir
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event drain
    // ─────────────────────────────────────────────────────────────────────

    /// Drain every pending downloader event. Returns how many were handled.
    ///
    /// This is the marshaling point: downloader results enter the
    /// subsystem here and nowhere else. Observer fan-out for each event
    /// completes before the next event is taken.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            self.apply_event(event);
            self.flush_notifications();
            handled += 1;
        }
        handled
    }

    /// Drive the event drain forever on the owning task.
    pub async fn run(&mut self) {
        while let Some(event) = self.events.recv().await {
            self.apply_event(event);
            self.flush_notifications();
        }
    }

    fn apply_event(&mut self, event: DownloaderEvent) {
        match event {
            DownloaderEvent::ServerList(result) => {
                if let Some(outcome) = self.gateway.on_server_list(result) {
                    self.finish_unit(outcome);
                }
            }
            DownloaderEvent::FileProgress(progress) => {
                if let Some((id, unit)) = self.gateway.on_file_progress(progress) {
                    if self.queue.is_head(&id) {
                        if let Some(option) = self.gateway.current_file() {
                            self.queue.set_head_current_file(option);
                        }
                        self.queue.set_head_progress(unit);
                        self.pending_notifications
                            .push(Notification::Progress(id, unit));
                    }
                }
            }
            DownloaderEvent::FileFinished(result) => {
                if let Some(outcome) = self.gateway.on_file_finished(result) {
                    self.finish_unit(outcome);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node operations
    // ─────────────────────────────────────────────────────────────────────

    /// Download a node: the unit itself for a leaf, every not-yet-present
    /// leaf of the subtree for a group. Returns `false` for unknown ids.
    pub fn download_node(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        for leaf in self.catalog.leaves_under(id) {
            if self.country_status_ex(&leaf) != NodeStatus::OnDisk {
                self.download_country(&leaf, MapOptions::MAP);
            }
        }
        true
    }

    /// Queue one unit for download with an explicit option set.
    ///
    /// The set is normalized first: requesting the routing overlay pulls
    /// in the map, and options already current on disk are elided. A set
    /// that normalizes to nothing is a no-op. Group ids fall back to
    /// [`download_node`](Self::download_node).
    pub fn download_country(&mut self, id: &CountryId, options: MapOptions) -> bool {
        let Some(country) = self.catalog.country(id) else {
            return false;
        };
        if country.is_expandable() {
            return self.download_node(id);
        }

        let options = self.normalize_download_set(id, options);
        if options.is_empty() {
            debug!(id = %id, "download elided, local files already current");
            return true;
        }

        match self.queue.enqueue(id.clone(), options) {
            Enqueued::NewHead => {
                self.start_head();
            }
            Enqueued::Appended | Enqueued::Merged => {}
        }
        debug!(id = %id, queued = self.queue.len(), "unit queued");
        self.notify_status(id.clone());
        self.flush_notifications();
        true
    }

    /// Delete every leaf under a node: queued downloads are dropped and
    /// all local versions removed. Returns `false` for unknown ids.
    pub fn delete_node(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        for leaf in self.catalog.leaves_under(id) {
            self.delete_country(&leaf, MapOptions::MAP);
        }
        true
    }

    /// Delete one unit's files.
    ///
    /// Deleting the map implies deleting the routing overlay. The unit
    /// also leaves the queue and the failed set.
    pub fn delete_country(&mut self, id: &CountryId, options: MapOptions) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        self.delete_from_downloader(id);
        self.queue.clear_failed(id);
        if let Err(e) = self.registry.delete_country_files(id, options) {
            warn!(id = %id, error = %e, "failed to delete local files");
        }
        self.notify_status(id.clone());
        self.flush_notifications();
        true
    }

    /// Remove a user-supplied map version that the catalog does not list.
    pub fn delete_custom_country_version(&mut self, local: &LocalCountryFile) {
        if let Err(e) = self.registry.delete_fake_file(local.country_file()) {
            warn!(file = %local.country_file().name(), error = %e,
                "failed to delete custom map");
        }
    }

    /// Queue updates for every out-of-date leaf under a node. Returns
    /// `false` for unknown ids.
    pub fn update_node(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        for leaf in self.catalog.leaves_under(id) {
            if self.country_status_ex(&leaf) == NodeStatus::OnDiskOutOfDate {
                let options = self
                    .registry
                    .latest_local_file(&leaf)
                    .map_or(MapOptions::MAP, LocalCountryFile::files);
                self.download_country(&leaf, options);
            }
        }
        true
    }

    /// Remove a node's leaves from the download queue, aborting the active
    /// transfer when the head is affected. Returns `false` for unknown ids.
    pub fn cancel_node_downloading(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        for leaf in self.catalog.leaves_under(id) {
            self.delete_from_downloader(&leaf);
        }
        true
    }

    /// Re-queue every failed leaf under a node. Returns `false` for
    /// unknown ids.
    pub fn restore_node_downloading(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        for leaf in self.catalog.leaves_under(id) {
            if self.queue.is_failed(&leaf) {
                let mut options = MapOptions::MAP;
                if self
                    .registry
                    .latest_local_file(&leaf)
                    .is_some_and(|l| l.has(MapOptions::CAR_ROUTING))
                {
                    options |= MapOptions::CAR_ROUTING;
                }
                self.download_country(&leaf, options);
            }
        }
        true
    }

    /// Jump the application's map view to a node.
    ///
    /// Returns `false` iff the id is unknown or the node has no local
    /// data; the jump itself is delegated to the registered handler.
    pub fn show_node(&mut self, id: &CountryId) -> bool {
        if !self.catalog.contains(id) {
            return false;
        }
        let has_local = self
            .catalog
            .leaves_under(id)
            .iter()
            .any(|leaf| self.registry.latest_local_file(leaf).is_some());
        if !has_local {
            return false;
        }
        if let Some(handler) = &mut self.show_handler {
            handler(id);
        }
        true
    }

    /// Remove one unit from the download queue.
    ///
    /// Cancelling the head aborts the active transfer and starts the next
    /// unit. Returns whether the unit was queued at all.
    pub fn delete_from_downloader(&mut self, id: &CountryId) -> bool {
        let removed = if self.queue.is_head(id) {
            self.gateway.cancel();
            self.queue.pop_head();
            self.notify_status(id.clone());
            self.start_next_after_head();
            true
        } else if self.queue.remove(id).is_some() {
            self.notify_status(id.clone());
            true
        } else {
            false
        };
        self.flush_notifications();
        removed
    }

    /// Run the platform's legacy layout migration, then rebuild the
    /// registry from the migrated directory.
    pub fn migrate(&mut self) -> Result<(), StorageError> {
        self.gateway.cancel();
        self.queue.clear();
        let migrator = Arc::clone(&self.migrator);
        migrator.migrate(&self.config.maps_dir)?;
        self.register_all_local_maps();
        info!("legacy migration finished");
        Ok(())
    }

    /// Rescan the maps directory and rebuild the registry.
    pub fn register_all_local_maps(&mut self) {
        self.registry.register_all_local_maps(&self.catalog);
        info!(
            downloaded = self.registry.downloaded_files_count(),
            "local maps registered"
        );
    }

    /// Forget all local registrations and drop the whole queue.
    pub fn clear(&mut self) {
        self.gateway.cancel();
        self.queue.clear();
        self.registry.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe a legacy observer pair. Returns its slot id.
    pub fn subscribe(&mut self, change: ChangeCallback, progress: ProgressCallback) -> i32 {
        self.observers.subscribe(change, progress)
    }

    /// Unsubscribe a legacy observer. Stale slots are ignored.
    pub fn unsubscribe(&mut self, slot: i32) {
        self.observers.unsubscribe(slot);
    }

    /// Subscribe a status callback. Returns its subscription index.
    pub fn subscribe_status_callback(&mut self, callback: StatusCallback) -> usize {
        self.observers.subscribe_status(callback)
    }

    /// Unsubscribe a status callback. Stale keys are ignored.
    pub fn unsubscribe_status_callback(&mut self, key: usize) {
        self.observers.unsubscribe_status(key);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Normalize a requested download set for one unit: routing pulls in
    /// the map, and options whose newest local version already matches the
    /// remote version are dropped.
    fn normalize_download_set(&self, id: &CountryId, options: MapOptions) -> MapOptions {
        let mut options = options.normalized_for_download();
        if let Some(local) = self.registry.latest_local_file(id) {
            if local.version() == self.catalog.version() {
                for option in options.components() {
                    if local.has(option) {
                        options -= option;
                    }
                }
            }
        }
        options
    }

    /// Hand the queue head to the gateway.
    fn start_head(&mut self) {
        let Some(head) = self.queue.head() else {
            return;
        };
        let id = head.id().clone();
        let options = head.options();

        let Some(file) = self
            .catalog
            .country(&id)
            .and_then(|c| c.file().cloned())
        else {
            // A queued group id would be a coordinator bug.
            warn!(id = %id, "queued unit has no file record");
            self.finish_unit(UnitOutcome {
                id,
                requested: options,
                downloaded: MapOptions::empty(),
                error: Some(DownloadError::verification("unit has no file record")),
            });
            return;
        };

        let version = self.catalog.version();
        let dir = self.registry.version_dir(version);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create version directory");
            self.finish_unit(UnitOutcome {
                id,
                requested: options,
                downloaded: MapOptions::empty(),
                error: Some(DownloadError::from_io_error(&e)),
            });
            return;
        }

        let files = options
            .components()
            .map(|option| {
                let file_name = file.file_name(option);
                FileSpec {
                    option,
                    path: dir.join(&file_name),
                    file_name,
                    size: file.remote_size(option),
                }
            })
            .collect();
        self.gateway.start(UnitPlan { id, version, files });
    }

    /// After the head left the queue: start the next unit and report its
    /// status flip from queued to downloading.
    fn start_next_after_head(&mut self) {
        if let Some(next) = self.queue.head().map(|h| h.id().clone()) {
            self.start_head();
            self.notify_status(next);
        }
    }

    /// Terminal handling of a unit download.
    fn finish_unit(&mut self, outcome: UnitOutcome) {
        if !self.queue.is_head(&outcome.id) {
            // Cancelled while the event was in flight.
            debug!(id = %outcome.id, "dropping outcome of a unit no longer queued");
            return;
        }
        self.queue.pop_head();
        let id = outcome.id.clone();

        let mut error = outcome.error.clone();
        let mut ready = None;
        if !outcome.downloaded.is_empty() {
            match self.register_downloaded_files(&id, outcome.downloaded) {
                Ok(local) => ready = Some(local),
                Err(e) => {
                    warn!(id = %id, error = %e, "registration of downloaded files failed");
                    if error.is_none() {
                        error = Some(e);
                    }
                }
            }
        }

        match (&error, ready) {
            (None, Some(local)) => {
                info!(id = %id, version = local.version(), "map unit downloaded");
                if let Some(map_ready) = &mut self.map_ready {
                    map_ready(&local);
                }
            }
            _ => {
                // A unit whose map still registered at the current version
                // counts as downloaded; everything else enters the failed
                // set.
                let map_registered = self.registry.latest_local_file(&id).is_some_and(|l| {
                    l.version() == self.catalog.version() && l.has(MapOptions::MAP)
                });
                if !map_registered {
                    self.queue.mark_failed(id.clone());
                }
                let code = error
                    .as_ref()
                    .map_or(ErrorCode::NoInternetConnection, DownloadError::error_code);
                self.pending_notifications
                    .push(Notification::Error(id.clone(), code));
            }
        }

        self.notify_status(id);
        self.start_next_after_head();
    }

    /// Verify and register the downloaded artifacts of one unit.
    ///
    /// Each file must match its declared size; mismatches are deleted from
    /// disk. The verified subset is registered under every id sharing the
    /// file name. `Ok` means everything requested was registered.
    fn register_downloaded_files(
        &mut self,
        id: &CountryId,
        options: MapOptions,
    ) -> Result<LocalCountryFile, DownloadError> {
        let file = self
            .catalog
            .country(id)
            .and_then(|c| c.file().cloned())
            .ok_or_else(|| DownloadError::verification("unit has no file record"))?;
        let version = self.catalog.version();
        let mut local =
            LocalCountryFile::new(self.registry.version_dir(version), file.clone(), version);

        let mut failure = None;
        for option in options.components() {
            let path = local.path(option);
            let declared = file.remote_size(option);
            let verified = match fs::metadata(&path) {
                Ok(meta) if declared == 0 || meta.len() == declared => Ok(()),
                Ok(meta) => Err(DownloadError::verification(format!(
                    "size mismatch for {}: expected {declared}, got {}",
                    path.display(),
                    meta.len()
                ))),
                Err(e) => Err(DownloadError::from_io_error(&e)),
            };
            match verified {
                Ok(()) => local.set_present(option),
                Err(e) => {
                    warn!(id = %id, path = %path.display(), error = %e,
                        "deleting unverifiable download artifact");
                    let _ = fs::remove_file(&path);
                    failure.get_or_insert(e);
                }
            }
        }

        if local.files().is_empty() {
            return Err(failure.unwrap_or_else(|| {
                DownloadError::verification("no downloaded files to register")
            }));
        }
        for each in self.catalog.find_all_indexes_by_file(file.name()).to_vec() {
            self.registry.register(&each, local.clone());
            if let Err(e) = self.registry.delete_older_versions(&each, version) {
                warn!(id = %each, error = %e, "failed to delete superseded versions");
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(local),
        }
    }

    fn notify_status(&mut self, id: CountryId) {
        self.pending_notifications.push(Notification::Status(id));
    }

    /// Drain queued notifications, expanding status changes into ancestor
    /// chains.
    fn flush_notifications(&mut self) {
        let pending = std::mem::take(&mut self.pending_notifications);
        for notification in pending {
            match notification {
                Notification::Status(id) => {
                    let mut chain = vec![id.clone()];
                    chain.extend(self.catalog.ancestors_of(&id));
                    self.observers.notify_status_chain(&chain);
                    self.observers.notify_changed(&id);
                }
                Notification::Progress(id, progress) => {
                    self.observers.notify_progress(&id, progress);
                }
                Notification::Error(id, code) => {
                    self.observers.notify_error(&id, code);
                }
            }
        }
    }
}
