//! Ports to external collaborators.

mod downloader;
mod migration;

pub use downloader::{
    DownloaderEventSender, FileRequest, MapFilesDownloader, NoopMapFilesDownloader,
};
pub use migration::{LegacyMigrator, NoopMigrator};
