//! Error types.
//!
//! Download-side errors are serializable and carry string payloads rather
//! than wrapping `std::io::Error`, so they can cross process and wire
//! boundaries unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CountryId;
use crate::status::ErrorCode;

/// Error produced while downloading or registering a map unit.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// No mirror could be reached, or the transfer broke mid-flight.
    #[error("network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
    },

    /// The device ran out of free space for the downloaded file.
    #[error("not enough space on device")]
    OutOfSpace,

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g. "not found", "permission denied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The transfer was aborted by the user.
    #[error("download cancelled")]
    Cancelled,

    /// A downloaded file did not match its declared size or header.
    #[error("file verification failed: {message}")]
    Verification {
        /// What did not match.
        message: String,
    },
}

impl DownloadError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture a `std::io::Error` as a serializable payload.
    ///
    /// Disk-full conditions are promoted to [`DownloadError::OutOfSpace`].
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            return Self::OutOfSpace;
        }
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    /// Create a verification error.
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification {
            message: message.into(),
        }
    }

    /// Whether this error is a user cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Client-facing error code for observer callbacks.
    ///
    /// Everything that is not an out-of-space condition is reported as a
    /// connectivity problem; timeouts and verification faults included.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::OutOfSpace => ErrorCode::NotEnoughSpace,
            _ => ErrorCode::NoInternetConnection,
        }
    }
}

/// Error produced while loading the country catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The description document is not valid JSON of the expected shape.
    #[error("malformed country description: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two nodes carry the same id.
    #[error("duplicate country id: {0}")]
    DuplicateId(CountryId),
}

/// Error surfaced by storage coordinator operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The id names neither a catalog node nor a fake unit.
    #[error("unknown country id: {0}")]
    UnknownCountry(CountryId),

    /// Loading the catalog failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Filesystem fault in the registry or the persisted queue.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted download queue could not be encoded or decoded.
    #[error("queue persistence error: {0}")]
    QueuePersistence(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            DownloadError::OutOfSpace.error_code(),
            ErrorCode::NotEnoughSpace
        );
        assert_eq!(
            DownloadError::network("timeout").error_code(),
            ErrorCode::NoInternetConnection
        );
        assert_eq!(
            DownloadError::verification("size mismatch").error_code(),
            ErrorCode::NoInternetConnection
        );
    }

    #[test]
    fn io_error_round_trips_through_serde() {
        let err = DownloadError::io("NotFound", "no such file");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: DownloadError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn storage_full_promotes_to_out_of_space() {
        let io_err = std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full");
        assert_eq!(DownloadError::from_io_error(&io_err), DownloadError::OutOfSpace);
    }
}
