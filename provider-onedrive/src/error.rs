//! Error types for the OneDrive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// OneDrive provider errors
#[derive(Error, Debug)]
pub enum OneDriveError {
    /// Token missing, expired or lacking `Files.Read`
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Camera roll folder not found: {path}")]
    CameraRollNotFound { path: String },

    /// Graph returned a non-success status
    #[error("Graph API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse Graph response: {0}")]
    ParseError(String),

    /// `@odata.nextLink` pointed back at an already visited page
    #[error("Pagination loop detected at {0}")]
    PaginationLoop(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for OneDrive operations
pub type Result<T> = std::result::Result<T, OneDriveError>;

impl From<OneDriveError> for BridgeError {
    fn from(error: OneDriveError) -> Self {
        match error {
            OneDriveError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = OneDriveError::ApiError {
            status_code: 403,
            message: "Access denied".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Graph API error (status 403): Access denied"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = OneDriveError::AuthenticationFailed("token expired".to_string());
        let bridge_error: BridgeError = error.into();

        assert!(matches!(bridge_error, BridgeError::OperationFailed(ref m) if m.contains("token expired")));

        let inner = OneDriveError::BridgeError(BridgeError::NotAvailable("offline".to_string()));
        assert!(matches!(BridgeError::from(inner), BridgeError::NotAvailable(_)));
    }
}
