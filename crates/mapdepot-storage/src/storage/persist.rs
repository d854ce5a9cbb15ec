//! Queue persistence and bulk update operations.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mapdepot_core::{CountryId, MapOptions, NodeStatus, StorageError, UpdateInfo};

use super::Storage;

/// File under the maps directory holding the persisted download queue.
pub const QUEUE_FILE_NAME: &str = "download_queue.json";

#[derive(Serialize, Deserialize)]
struct QueueEntry {
    id: CountryId,
    options: MapOptions,
}

impl Storage {
    fn queue_file_path(&self) -> PathBuf {
        self.config.maps_dir.join(QUEUE_FILE_NAME)
    }

    /// Persist the queued units and their requested options, in queue
    /// order.
    pub fn save_download_queue(&self) -> Result<(), StorageError> {
        let entries: Vec<QueueEntry> = self
            .queue
            .iter()
            .map(|queued| QueueEntry {
                id: queued.id().clone(),
                options: queued.options(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        fs::create_dir_all(&self.config.maps_dir)?;
        fs::write(self.queue_file_path(), json)?;
        debug!(entries = entries.len(), "download queue saved");
        Ok(())
    }

    /// Re-enqueue a previously persisted queue.
    ///
    /// Restoration goes through the normal enqueue path, so units that
    /// became current in the meantime are elided. A missing queue file is
    /// not an error.
    pub fn restore_download_queue(&mut self) -> Result<(), StorageError> {
        let text = match fs::read_to_string(self.queue_file_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<QueueEntry> = serde_json::from_str(&text)?;
        info!(entries = entries.len(), "restoring download queue");
        for entry in entries {
            self.download_country(&entry.id, entry.options);
        }
        Ok(())
    }

    /// Summary for the "update all maps" affordance: how many units are
    /// out of date and how many bytes their updates declare.
    #[must_use]
    pub fn get_update_info(&self) -> UpdateInfo {
        let mut update_info = UpdateInfo::default();
        for leaf in self.catalog.leaves_under(self.catalog.root_id()) {
            if self.country_status_ex(&leaf) != NodeStatus::OnDiskOutOfDate {
                continue;
            }
            let Some(file) = self.catalog.country(&leaf).and_then(|c| c.file()) else {
                continue;
            };
            let options = self
                .registry
                .latest_local_file(&leaf)
                .map_or(MapOptions::MAP, |local| local.files());
            update_info.files_to_update += 1;
            update_info.total_update_size += file.remote_size(options);
        }
        update_info
    }

    /// Switch to a new map hierarchy: delete every local map and re-queue
    /// the previously owned coverage.
    ///
    /// Ids the new catalog no longer lists are dropped; fake units stay on
    /// disk.
    pub fn update_all_and_change_hierarchy(&mut self) -> bool {
        let mut coverage: Vec<(CountryId, MapOptions)> = self
            .registry
            .real_map_ids()
            .into_iter()
            .filter(|id| self.catalog.contains(id))
            .filter_map(|id| {
                let options = self.registry.latest_local_file(&id)?.files();
                Some((id, options))
            })
            .collect();
        coverage.sort_by(|a, b| a.0.cmp(&b.0));
        info!(units = coverage.len(), "updating all maps for new hierarchy");

        for (id, _) in &coverage {
            self.delete_country(id, MapOptions::MAP);
        }
        for (id, options) in coverage {
            self.download_country(&id, options);
        }
        true
    }
}
