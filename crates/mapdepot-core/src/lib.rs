//! Domain types and ports for the mapdepot map storage subsystem.
//!
//! This crate holds the pure data model (country identities, map option
//! sets, on-disk file descriptions), the status and error model, the
//! events that cross the downloader boundary, and the ports implemented by
//! external collaborators. No networking and no orchestration live here;
//! see `mapdepot-storage` for the coordinator.

pub mod domain;
pub mod errors;
pub mod events;
pub mod paths;
pub mod ports;
pub mod status;

pub use domain::{
    CountryFile, CountryId, LocalCountryFile, MapOptions, parse_file_name, MAP_FILE_EXTENSION,
    ROUTING_FILE_EXTENSION,
};
pub use errors::{CatalogError, DownloadError, StorageError};
pub use events::{DownloaderEvent, Progress};
pub use ports::{
    DownloaderEventSender, FileRequest, LegacyMigrator, MapFilesDownloader,
    NoopMapFilesDownloader, NoopMigrator,
};
pub use status::{
    ClientNodeAttrs, ErrorCode, LocalAndRemoteSize, NodeStatus, ServerNodeAttrs, UpdateInfo,
};
