//! Map files downloader port.
//!
//! The port is fire-and-forget: requests return immediately and every
//! result is marshaled back through the [`DownloaderEvent`] channel the
//! caller hands in. This keeps the coordinator single-threaded while the
//! implementation is free to do its I/O on background threads or an async
//! runtime.
//!
//! At most one file transfer is in flight at a time; the gateway enforces
//! this by never issuing a second [`MapFilesDownloader::download_file`]
//! before the previous one reported [`DownloaderEvent::FileFinished`].

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::events::DownloaderEvent;

/// Sender half of the downloader event channel.
pub type DownloaderEventSender = UnboundedSender<DownloaderEvent>;

/// A single file transfer request.
#[derive(Clone, Debug)]
pub struct FileRequest {
    /// Candidate URLs, one per mirror, tried in order.
    pub urls: Vec<String>,
    /// Absolute destination path.
    pub path: PathBuf,
    /// Declared size of the file, for progress totals and verification.
    pub size: u64,
}

/// Port for the external file downloader.
///
/// Implementations report through the event sender passed with each
/// request; they never call back into the coordinator directly.
pub trait MapFilesDownloader: Send + Sync {
    /// Request the list of download mirrors.
    ///
    /// Completion arrives as [`DownloaderEvent::ServerList`].
    fn request_server_list(&self, events: DownloaderEventSender);

    /// Start transferring one file.
    ///
    /// Progress arrives as [`DownloaderEvent::FileProgress`] ticks and
    /// completion as [`DownloaderEvent::FileFinished`].
    fn download_file(&self, request: FileRequest, events: DownloaderEventSender);

    /// Abort the in-flight transfer, if any.
    ///
    /// Best-effort: a transfer that already completed may still deliver
    /// its finish event, which the caller must be prepared to drop.
    fn cancel(&self);
}

/// A downloader that silently drops every request.
///
/// Useful for constructing a storage instance in tests and tools that
/// never exercise the download path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMapFilesDownloader;

impl MapFilesDownloader for NoopMapFilesDownloader {
    fn request_server_list(&self, _events: DownloaderEventSender) {}

    fn download_file(&self, _request: FileRequest, _events: DownloaderEventSender) {}

    fn cancel(&self) {}
}
