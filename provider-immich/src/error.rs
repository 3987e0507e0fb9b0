//! Error types for the Immich provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Immich provider errors
#[derive(Error, Debug)]
pub enum ImmichError {
    /// API key missing, revoked or lacking `asset.read`
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Immich API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse Immich response: {0}")]
    ParseError(String),

    /// `nextPage` pointed at a page that was already fetched
    #[error("Pagination loop detected at page {0}")]
    PaginationLoop(u32),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Immich operations
pub type Result<T> = std::result::Result<T, ImmichError>;

impl From<ImmichError> for BridgeError {
    fn from(error: ImmichError) -> Self {
        match error {
            ImmichError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
