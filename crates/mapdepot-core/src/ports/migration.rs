//! Legacy on-disk layout migration port.
//!
//! Older releases stored map files in a flat directory without version
//! subdirectories. The platform layer knows how to move them; the storage
//! coordinator only invokes it and rescans afterwards.

use std::io;
use std::path::Path;

/// Port for the platform's legacy layout migration.
pub trait LegacyMigrator: Send + Sync {
    /// Migrate whatever legacy artifacts exist under `maps_dir` into the
    /// versioned layout.
    fn migrate(&self, maps_dir: &Path) -> io::Result<()>;
}

/// A migrator that does nothing; for installations with no legacy data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMigrator;

impl LegacyMigrator for NoopMigrator {
    fn migrate(&self, _maps_dir: &Path) -> io::Result<()> {
        Ok(())
    }
}
