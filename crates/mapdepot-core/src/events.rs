//! Events crossing the downloader/coordinator boundary.
//!
//! The downloader does its I/O on whatever threads it likes; every result
//! is marshaled into a [`DownloaderEvent`] and sent over an unbounded
//! channel to the thread that owns the storage coordinator. Draining that
//! channel is the only place downloader results enter the subsystem.

use serde::{Deserialize, Serialize};

use crate::errors::DownloadError;

/// Byte progress of a single transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes received so far.
    pub done: u64,
    /// Total bytes expected; 0 when unknown.
    pub total: u64,
}

impl Progress {
    /// Create a progress value.
    #[must_use]
    pub const fn new(done: u64, total: u64) -> Self {
        Self { done, total }
    }

    /// Completion percentage, 0..=100.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = self.done.saturating_mul(100) / self.total;
        if percent > 100 { 100 } else { percent as u8 }
    }
}

/// A downloader result delivered to the coordinator thread.
#[derive(Debug)]
pub enum DownloaderEvent {
    /// The mirror list request finished.
    ServerList(Result<Vec<String>, DownloadError>),
    /// Bytes arrived for the file currently being transferred.
    FileProgress(Progress),
    /// The file currently being transferred finished.
    FileFinished(Result<(), DownloadError>),
}
