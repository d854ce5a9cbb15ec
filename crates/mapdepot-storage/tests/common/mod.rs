//! Shared test fixtures: a scripted fake downloader and observer
//! recorders.

use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use mapdepot_core::{
    CountryId, DownloadError, DownloaderEvent, DownloaderEventSender, ErrorCode, FileRequest,
    MapFilesDownloader, Progress,
};
use mapdepot_storage::observers::StatusCallback;
use mapdepot_storage::Storage;

/// Planned behavior of the next file transfer.
pub enum FileScript {
    /// Stream progress, write the file at its declared size, report success.
    Success,
    /// Like `Success`, but write the file at the given size instead of the
    /// declared one. For exercising verification failures.
    SuccessWithSize(u64),
    /// Report the failure without writing anything.
    Fail(DownloadError),
    /// Stream one progress tick at half the file, then go quiet until
    /// cancelled.
    Stall,
}

#[derive(Default)]
struct FakeState {
    servers: Vec<String>,
    server_list_error: Option<DownloadError>,
    scripts: VecDeque<FileScript>,
    requests: Vec<FileRequest>,
    cancels: usize,
    stalled: Option<DownloaderEventSender>,
}

/// A downloader that answers every request synchronously from a script.
///
/// Unscripted transfers succeed. Events land in the storage channel at
/// once, so a single `process_events` call drives a whole download chain
/// to completion.
pub struct FakeDownloader {
    state: Mutex<FakeState>,
}

impl FakeDownloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                servers: vec!["https://mirror.test/maps".to_string()],
                ..FakeState::default()
            }),
        })
    }

    /// Queue the behavior of the next file transfer.
    pub fn script_file(&self, script: FileScript) {
        self.state.lock().unwrap().scripts.push_back(script);
    }

    /// Make the next server list request fail.
    pub fn fail_server_list(&self, error: DownloadError) {
        self.state.lock().unwrap().server_list_error = Some(error);
    }

    /// Every file request seen so far.
    pub fn requests(&self) -> Vec<FileRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of cancel calls seen so far.
    pub fn cancel_count(&self) -> usize {
        self.state.lock().unwrap().cancels
    }
}

impl MapFilesDownloader for FakeDownloader {
    fn request_server_list(&self, events: DownloaderEventSender) {
        let mut state = self.state.lock().unwrap();
        let result = match state.server_list_error.take() {
            Some(error) => Err(error),
            None => Ok(state.servers.clone()),
        };
        let _ = events.send(DownloaderEvent::ServerList(result));
    }

    fn download_file(&self, request: FileRequest, events: DownloaderEventSender) {
        let mut state = self.state.lock().unwrap();
        let script = state.scripts.pop_front().unwrap_or(FileScript::Success);
        state.requests.push(request.clone());
        match script {
            FileScript::Success | FileScript::SuccessWithSize(_) => {
                let written = match script {
                    FileScript::SuccessWithSize(size) => size,
                    _ => request.size,
                };
                let _ = events.send(DownloaderEvent::FileProgress(Progress::new(
                    request.size / 2,
                    request.size,
                )));
                if let Some(parent) = request.path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&request.path, vec![0u8; written as usize]).unwrap();
                let _ = events.send(DownloaderEvent::FileProgress(Progress::new(
                    request.size,
                    request.size,
                )));
                let _ = events.send(DownloaderEvent::FileFinished(Ok(())));
            }
            FileScript::Fail(error) => {
                let _ = events.send(DownloaderEvent::FileFinished(Err(error)));
            }
            FileScript::Stall => {
                let _ = events.send(DownloaderEvent::FileProgress(Progress::new(
                    request.size / 2,
                    request.size,
                )));
                state.stalled = Some(events);
            }
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancels += 1;
        // The aborted transfer still reports its demise, late.
        if let Some(events) = state.stalled.take() {
            let _ = events.send(DownloaderEvent::FileFinished(Err(DownloadError::Cancelled)));
        }
    }
}

/// Records status and error notifications delivered to a status callback.
#[derive(Clone, Default)]
pub struct StatusRecorder {
    statuses: Arc<Mutex<Vec<CountryId>>>,
    errors: Arc<Mutex<Vec<(CountryId, ErrorCode)>>>,
}

impl StatusRecorder {
    pub fn subscribe(storage: &mut Storage) -> Self {
        let recorder = Self::default();
        let statuses = recorder.statuses.clone();
        let errors = recorder.errors.clone();
        storage.subscribe_status_callback(StatusCallback {
            on_status_changed: Box::new(move |id| statuses.lock().unwrap().push(id.clone())),
            on_error: Box::new(move |id, code| errors.lock().unwrap().push((id.clone(), code))),
        });
        recorder
    }

    pub fn statuses(&self) -> Vec<CountryId> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(CountryId, ErrorCode)> {
        self.errors.lock().unwrap().clone()
    }
}
