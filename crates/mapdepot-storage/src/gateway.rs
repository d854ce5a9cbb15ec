//! Downloader gateway.
//!
//! Adapts the external [`MapFilesDownloader`] to unit-level downloads: it
//! resolves the mirror list once, then walks the unit's files in canonical
//! order (map first, routing second), issuing one transfer at a time. The
//! gateway itself is a synchronous state machine; every downloader result
//! reaches it through the event channel drained by the coordinator.
//!
//! One unit is active at a time. Cancelling clears the active unit, so a
//! late finish event from the aborted transfer finds no unit and is
//! dropped.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use mapdepot_core::{
    paths, CountryId, DownloadError, DownloaderEventSender, FileRequest, MapFilesDownloader,
    MapOptions, Progress,
};

/// One file of a planned unit download.
#[derive(Clone, Debug)]
pub struct FileSpec {
    /// Which artifact this file is.
    pub option: MapOptions,
    /// File name on the mirrors and on disk.
    pub file_name: String,
    /// Absolute destination path.
    pub path: PathBuf,
    /// Declared size.
    pub size: u64,
}

/// A unit download plan: the files of one queued country, in canonical
/// download order.
#[derive(Clone, Debug)]
pub struct UnitPlan {
    /// Unit id.
    pub id: CountryId,
    /// Data version being downloaded.
    pub version: i64,
    /// Files to fetch, map first.
    pub files: Vec<FileSpec>,
}

impl UnitPlan {
    /// Sum of the declared sizes of all planned files.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// The requested option set.
    #[must_use]
    pub fn requested(&self) -> MapOptions {
        self.files
            .iter()
            .fold(MapOptions::empty(), |acc, f| acc | f.option)
    }
}

/// Terminal result of a unit download.
#[derive(Clone, Debug)]
pub struct UnitOutcome {
    /// Unit id.
    pub id: CountryId,
    /// What was asked for.
    pub requested: MapOptions,
    /// Options whose files finished before the unit ended.
    pub downloaded: MapOptions,
    /// The failure, if the unit did not complete.
    pub error: Option<DownloadError>,
}

impl UnitOutcome {
    /// Whether every requested file arrived.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct ActiveUnit {
    plan: UnitPlan,
    current: usize,
    downloaded: MapOptions,
    completed_bytes: u64,
}

/// The single logical download channel.
pub struct DownloaderGateway {
    downloader: Arc<dyn MapFilesDownloader>,
    events: DownloaderEventSender,
    servers: Option<Vec<String>>,
    active: Option<ActiveUnit>,
}

impl DownloaderGateway {
    /// Create a gateway over the external downloader.
    pub fn new(downloader: Arc<dyn MapFilesDownloader>, events: DownloaderEventSender) -> Self {
        Self {
            downloader,
            events,
            servers: None,
            active: None,
        }
    }

    /// Whether no unit is downloading.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Id of the downloading unit.
    #[must_use]
    pub fn active_id(&self) -> Option<&CountryId> {
        self.active.as_ref().map(|a| &a.plan.id)
    }

    /// Option of the file currently transferring.
    #[must_use]
    pub fn current_file(&self) -> Option<MapOptions> {
        let active = self.active.as_ref()?;
        active.plan.files.get(active.current).map(|f| f.option)
    }

    /// Begin downloading a unit.
    ///
    /// The first call also kicks off mirror list resolution; files start
    /// transferring once the list arrives.
    pub fn start(&mut self, plan: UnitPlan) {
        debug_assert!(self.active.is_none(), "gateway already has an active unit");
        debug!(id = %plan.id, files = plan.files.len(), version = plan.version, "unit download started");
        self.active = Some(ActiveUnit {
            plan,
            current: 0,
            downloaded: MapOptions::empty(),
            completed_bytes: 0,
        });
        if self.servers.is_some() {
            self.issue_current();
        } else {
            self.downloader.request_server_list(self.events.clone());
        }
    }

    /// Abort the active unit, if any.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(id = %active.plan.id, "unit download cancelled");
            self.downloader.cancel();
        }
    }

    /// Mirror list arrived.
    ///
    /// Returns the unit outcome when the failure kills the active unit.
    pub fn on_server_list(
        &mut self,
        result: Result<Vec<String>, DownloadError>,
    ) -> Option<UnitOutcome> {
        match result {
            Ok(urls) if !urls.is_empty() => {
                debug!(mirrors = urls.len(), "server list resolved");
                self.servers = Some(urls);
                if self.active.is_some() {
                    self.issue_current();
                }
                None
            }
            Ok(_) => self.fail_active(DownloadError::network("empty server list")),
            Err(e) => {
                warn!(error = %e, "server list request failed");
                self.fail_active(e)
            }
        }
    }

    /// Bytes arrived for the transferring file.
    ///
    /// Returns the unit id and its aggregate progress: bytes of already
    /// finished files plus the in-flight file's progress, over the plan
    /// total.
    pub fn on_file_progress(&self, progress: Progress) -> Option<(CountryId, Progress)> {
        let active = self.active.as_ref()?;
        let unit = Progress::new(
            active.completed_bytes + progress.done,
            active.plan.total_bytes(),
        );
        Some((active.plan.id.clone(), unit))
    }

    /// The transferring file finished.
    ///
    /// On success the next file is issued; the outcome is returned once
    /// the whole unit succeeds or any file fails. Events arriving with no
    /// active unit (aborted transfers) are dropped.
    pub fn on_file_finished(&mut self, result: Result<(), DownloadError>) -> Option<UnitOutcome> {
        if self.active.is_none() {
            debug!("dropping finish event for aborted transfer");
            return None;
        }
        match result {
            Ok(()) => {
                let finished = {
                    let active = self.active.as_mut().expect("checked above");
                    let spec = &active.plan.files[active.current];
                    active.downloaded |= spec.option;
                    active.completed_bytes += spec.size;
                    active.current += 1;
                    active.current >= active.plan.files.len()
                };
                if finished {
                    let active = self.active.take().expect("checked above");
                    debug!(id = %active.plan.id, "unit download finished");
                    Some(UnitOutcome {
                        id: active.plan.id.clone(),
                        requested: active.plan.requested(),
                        downloaded: active.downloaded,
                        error: None,
                    })
                } else {
                    self.issue_current();
                    None
                }
            }
            Err(e) => self.fail_active(e),
        }
    }

    fn fail_active(&mut self, error: DownloadError) -> Option<UnitOutcome> {
        let active = self.active.take()?;
        warn!(id = %active.plan.id, error = %error, "unit download failed");
        Some(UnitOutcome {
            id: active.plan.id.clone(),
            requested: active.plan.requested(),
            downloaded: active.downloaded,
            error: Some(error),
        })
    }

    fn issue_current(&self) {
        let (active, servers) = match (&self.active, &self.servers) {
            (Some(active), Some(servers)) => (active, servers),
            _ => return,
        };
        let spec = &active.plan.files[active.current];
        let urls = servers
            .iter()
            .map(|server| paths::file_download_url(server, active.plan.version, &spec.file_name))
            .collect();
        self.downloader.download_file(
            FileRequest {
                urls,
                path: spec.path.clone(),
                size: spec.size,
            },
            self.events.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records requests instead of performing them.
    #[derive(Default)]
    struct RecordingDownloader {
        server_list_requests: Mutex<usize>,
        file_requests: Mutex<Vec<FileRequest>>,
        cancels: Mutex<usize>,
    }

    impl MapFilesDownloader for RecordingDownloader {
        fn request_server_list(&self, _events: DownloaderEventSender) {
            *self.server_list_requests.lock().unwrap() += 1;
        }

        fn download_file(&self, request: FileRequest, _events: DownloaderEventSender) {
            self.file_requests.lock().unwrap().push(request);
        }

        fn cancel(&self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    fn plan() -> UnitPlan {
        UnitPlan {
            id: CountryId::from("Alpha"),
            version: 100,
            files: vec![
                FileSpec {
                    option: MapOptions::MAP,
                    file_name: "Alpha.mwm".to_string(),
                    path: PathBuf::from("/maps/100/Alpha.mwm"),
                    size: 60,
                },
                FileSpec {
                    option: MapOptions::CAR_ROUTING,
                    file_name: "Alpha.mwm.routing".to_string(),
                    path: PathBuf::from("/maps/100/Alpha.mwm.routing"),
                    size: 40,
                },
            ],
        }
    }

    fn gateway() -> (DownloaderGateway, Arc<RecordingDownloader>) {
        let downloader = Arc::new(RecordingDownloader::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let gateway = DownloaderGateway::new(downloader.clone(), tx);
        (gateway, downloader)
    }

    #[test]
    fn start_requests_server_list_first() {
        let (mut gateway, downloader) = gateway();
        gateway.start(plan());

        assert_eq!(*downloader.server_list_requests.lock().unwrap(), 1);
        assert!(downloader.file_requests.lock().unwrap().is_empty());
        assert_eq!(gateway.active_id(), Some(&CountryId::from("Alpha")));
    }

    #[test]
    fn server_list_starts_the_first_file() {
        let (mut gateway, downloader) = gateway();
        gateway.start(plan());

        let outcome = gateway.on_server_list(Ok(vec![
            "https://a.example.com".to_string(),
            "https://b.example.com".to_string(),
        ]));
        assert!(outcome.is_none());

        let requests = downloader.file_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].urls,
            vec![
                "https://a.example.com/100/Alpha.mwm",
                "https://b.example.com/100/Alpha.mwm"
            ]
        );
        assert_eq!(requests[0].size, 60);
        drop(requests);
        assert_eq!(gateway.current_file(), Some(MapOptions::MAP));
    }

    #[test]
    fn files_are_sequenced_in_canonical_order() {
        let (mut gateway, downloader) = gateway();
        gateway.start(plan());
        gateway.on_server_list(Ok(vec!["https://m.example.com".to_string()]));

        assert!(gateway.on_file_finished(Ok(())).is_none());
        assert_eq!(gateway.current_file(), Some(MapOptions::CAR_ROUTING));
        assert_eq!(downloader.file_requests.lock().unwrap().len(), 2);

        let outcome = gateway.on_file_finished(Ok(())).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.downloaded, MapOptions::MAP | MapOptions::CAR_ROUTING);
        assert!(gateway.is_idle());
    }

    #[test]
    fn unit_progress_aggregates_finished_files() {
        let (mut gateway, _) = gateway();
        gateway.start(plan());
        gateway.on_server_list(Ok(vec!["https://m.example.com".to_string()]));

        let (_, p) = gateway.on_file_progress(Progress::new(30, 60)).unwrap();
        assert_eq!(p, Progress::new(30, 100));

        let _ = gateway.on_file_finished(Ok(()));
        let (_, p) = gateway.on_file_progress(Progress::new(10, 40)).unwrap();
        assert_eq!(p, Progress::new(70, 100));
    }

    #[test]
    fn file_failure_fails_the_unit_with_partial_downloads() {
        let (mut gateway, _) = gateway();
        gateway.start(plan());
        gateway.on_server_list(Ok(vec!["https://m.example.com".to_string()]));
        gateway.on_file_finished(Ok(()));

        let outcome = gateway
            .on_file_finished(Err(DownloadError::network("connection reset")))
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.downloaded, MapOptions::MAP);
        assert_eq!(outcome.requested, MapOptions::MAP | MapOptions::CAR_ROUTING);
        assert!(gateway.is_idle());
    }

    #[test]
    fn server_list_failure_fails_the_unit() {
        let (mut gateway, _) = gateway();
        gateway.start(plan());

        let outcome = gateway
            .on_server_list(Err(DownloadError::network("dns failure")))
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.downloaded, MapOptions::empty());
    }

    #[test]
    fn server_list_is_cached_across_units() {
        let (mut gateway, downloader) = gateway();
        gateway.start(plan());
        gateway.on_server_list(Ok(vec!["https://m.example.com".to_string()]));
        gateway.on_file_finished(Ok(()));
        gateway.on_file_finished(Ok(()));

        gateway.start(plan());
        // No second server list request; the file request goes out at once.
        assert_eq!(*downloader.server_list_requests.lock().unwrap(), 1);
        assert_eq!(downloader.file_requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn cancel_aborts_and_drops_late_events() {
        let (mut gateway, downloader) = gateway();
        gateway.start(plan());
        gateway.on_server_list(Ok(vec!["https://m.example.com".to_string()]));

        gateway.cancel();
        assert_eq!(*downloader.cancels.lock().unwrap(), 1);
        assert!(gateway.is_idle());

        // The aborted transfer's eventual failure is dropped.
        assert!(gateway
            .on_file_finished(Err(DownloadError::Cancelled))
            .is_none());
        assert!(gateway.on_file_progress(Progress::new(1, 2)).is_none());
    }
}
