//! Node status model and attribute DTOs.
//!
//! A node is either a leaf map unit or an interior group; the same status
//! enum describes both. Group status is an aggregate of the leaves in the
//! subtree, combined by the reporting precedence encoded in
//! [`NodeStatus::aggregate_rank`].

use serde::{Deserialize, Serialize};

use crate::domain::CountryId;

/// Status of a map unit or a group of map units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// No local version, not queued, no recent failure.
    NotDownloaded,
    /// Latest local version matches the current data version.
    OnDisk,
    /// A local version exists but is older than the current data version.
    OnDiskOutOfDate,
    /// The unit is the head of the download queue.
    Downloading,
    /// The unit is queued behind the head.
    InQueue,
    /// The last download attempt failed and the unit left the queue.
    DownloadFailed,
    /// The id names neither a catalog node nor a fake unit.
    Unknown,
}

impl NodeStatus {
    /// String form for logs and wire payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotDownloaded => "not_downloaded",
            Self::OnDisk => "on_disk",
            Self::OnDiskOutOfDate => "on_disk_out_of_date",
            Self::Downloading => "downloading",
            Self::InQueue => "in_queue",
            Self::DownloadFailed => "download_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Reporting precedence when folding leaf statuses into a group status.
    ///
    /// Higher wins: Downloading > InQueue > DownloadFailed >
    /// OnDiskOutOfDate > NotDownloaded > OnDisk. A group is `OnDisk` only
    /// when every leaf is.
    #[must_use]
    pub const fn aggregate_rank(&self) -> u8 {
        match self {
            Self::OnDisk => 0,
            Self::NotDownloaded => 1,
            Self::OnDiskOutOfDate => 2,
            Self::DownloadFailed => 3,
            Self::InQueue => 4,
            Self::Downloading => 5,
            Self::Unknown => 6,
        }
    }

    /// Fold two statuses by reporting precedence.
    #[must_use]
    pub const fn combined_with(self, other: Self) -> Self {
        if other.aggregate_rank() > self.aggregate_rank() {
            other
        } else {
            self
        }
    }
}

/// Error condition surfaced to status observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The operation finished without errors.
    NoError,
    /// Not enough free space to store the downloaded files.
    NotEnoughSpace,
    /// The download could not reach any mirror.
    NoInternetConnection,
}

/// Attributes of a node as declared by the remote catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerNodeAttrs {
    /// Declared size: one unit's map size for a leaf, the subtree sum for
    /// a group.
    pub node_size: u64,
    /// Number of direct children; `None` for leaves.
    pub children_count: Option<usize>,
    /// Parent id; `None` for the root.
    pub parent_id: Option<CountryId>,
}

/// Attributes of a node as present on this device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientNodeAttrs {
    /// Downloaded bytes: one unit's local map size for a leaf, the sum of
    /// downloaded leaves for a group.
    pub node_size: u64,
    /// Number of downloaded leaves in the subtree; `None` for leaves.
    pub maps_downloaded: Option<usize>,
    /// Version of the downloaded unit; `None` for groups and for units
    /// with no local data.
    pub version: Option<i64>,
    /// Byte-weighted download progress across the subtree, 0..=100.
    pub download_progress: u8,
    /// Aggregated status of the node.
    pub status: NodeStatus,
}

/// Local and declared remote byte sizes of a unit's selected options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalAndRemoteSize {
    /// Bytes present (or downloaded so far) on this device.
    pub local: u64,
    /// Bytes declared by the remote catalog.
    pub remote: u64,
}

/// Summary backing the "update all maps" affordance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Number of map units whose local version is out of date.
    pub files_to_update: usize,
    /// Sum of the remote sizes of those units.
    pub total_update_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_precedence_prefers_activity() {
        assert_eq!(
            NodeStatus::OnDisk.combined_with(NodeStatus::Downloading),
            NodeStatus::Downloading
        );
        assert_eq!(
            NodeStatus::InQueue.combined_with(NodeStatus::DownloadFailed),
            NodeStatus::InQueue
        );
        assert_eq!(
            NodeStatus::NotDownloaded.combined_with(NodeStatus::OnDisk),
            NodeStatus::NotDownloaded
        );
    }

    #[test]
    fn on_disk_loses_to_everything() {
        for other in [
            NodeStatus::NotDownloaded,
            NodeStatus::OnDiskOutOfDate,
            NodeStatus::DownloadFailed,
            NodeStatus::InQueue,
            NodeStatus::Downloading,
        ] {
            assert_eq!(NodeStatus::OnDisk.combined_with(other), other);
        }
    }
}
