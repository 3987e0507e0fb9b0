//! # Immich Provider
//!
//! Implements `ImmichSource` for the Immich server API.
//!
//! Assets are listed through `POST /api/search/metadata`, page by page, and
//! normalized into `MediaRecord`s. Immich reports checksums as base64 SHA-1;
//! they are converted to lowercase hex so they compare directly with
//! OneDrive's `sha1Hash`.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{ImmichConnector, DEFAULT_PAGE_SIZE};
pub use error::{ImmichError, Result};
