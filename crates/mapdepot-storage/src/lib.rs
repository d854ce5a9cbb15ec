//! The map storage subsystem.
//!
//! Governs the lifecycle of versioned map files on a device: the country
//! catalog, the local file registry, the single-consumer download queue,
//! the downloader gateway, and the observer fan-out, all orchestrated by
//! the [`Storage`] coordinator.
//!
//! # Modules
//!
//! - [`catalog`] - the immutable country tree and its lookup indexes
//! - [`registry`] - local map files, real and fake, reconciled with disk
//! - [`queue`] - FIFO of pending units plus the failed set
//! - [`gateway`] - sequences per-file downloads of the head unit
//! - [`observers`] - change/progress/status/error fan-out
//! - [`storage`] - the coordinator facade

pub mod catalog;
pub mod gateway;
pub mod observers;
pub mod queue;
pub mod registry;
pub mod storage;

pub use catalog::{Country, CountryTree};
pub use gateway::{DownloaderGateway, FileSpec, UnitOutcome, UnitPlan};
pub use observers::{ObserverBus, StatusCallback};
pub use queue::{DownloadQueue, Enqueued, QueuedCountry};
pub use registry::LocalFileRegistry;
pub use storage::{
    MapReadyCallback, ShowHandler, Storage, StorageConfig, StorageDeps, QUEUE_FILE_NAME,
};
