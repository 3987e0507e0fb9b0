use bridge_traits::{BridgeError, InventoryOrigin};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A remote inventory could not be obtained. Fatal for the run.
    #[error("Failed to fetch {origin} inventory: {message}")]
    Fetch {
        origin: InventoryOrigin,
        message: String,
    },

    /// Persisted cache data could not be decoded. Treated as a cache miss.
    #[error("Cache data is corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    /// Per-item download failure
    #[error("Download of {filename} ({source_id}) failed: {message}")]
    Download {
        source_id: String,
        filename: String,
        message: String,
    },

    /// Per-item size or hash mismatch after download
    #[error("Verification mismatch for {filename} ({source_id}): {message}")]
    Verification {
        source_id: String,
        filename: String,
        message: String,
    },

    #[error("Target directory error: {0}")]
    TargetDir(String),

    #[error("Expected {expected} inventory, got {actual}")]
    OriginMismatch {
        expected: InventoryOrigin,
        actual: InventoryOrigin,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ReconcileError {
    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReconcileError::CacheCorrupt(_)
                | ReconcileError::CacheWrite(_)
                | ReconcileError::Download { .. }
                | ReconcileError::Verification { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ReconcileError::Fetch {
            origin: InventoryOrigin::Immich,
            message: "HTTP 401".to_string(),
        };
        assert_eq!(error.to_string(), "Failed to fetch Immich inventory: HTTP 401");

        let error = ReconcileError::Verification {
            source_id: "2".to_string(),
            filename: "b.jpg".to_string(),
            message: "expected 200 bytes, received 150".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Verification mismatch for b.jpg (2): expected 200 bytes, received 150"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(ReconcileError::Fetch {
            origin: InventoryOrigin::OneDrive,
            message: String::new(),
        }
        .is_fatal());
        assert!(!ReconcileError::CacheCorrupt("eof".to_string()).is_fatal());
        assert!(!ReconcileError::Download {
            source_id: "1".to_string(),
            filename: "a.jpg".to_string(),
            message: "reset".to_string(),
        }
        .is_fatal());
    }
}
