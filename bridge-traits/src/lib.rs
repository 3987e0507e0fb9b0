//! # Host Bridge Traits
//!
//! Contracts between the reconciliation core and everything outside it.
//!
//! ## Overview
//!
//! The core never talks to the network or the disk directly. Each capability
//! it needs is a trait here, with desktop implementations in `bridge-desktop`
//! and remote-system connectors in the `provider-*` crates.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry on transient statuses
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O including atomic rename
//!
//! ### Media sources
//! - [`OneDriveSource`](media::OneDriveSource) - Camera-roll listing and downloads
//! - [`ImmichSource`](media::ImmichSource) - Library listing
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Connectors convert
//! their own error enums into it so the core sees one error type per seam.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across the collector's download tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod media;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media::{
    ByteStream, DownloadRef, ImmichSource, Inventory, InventoryOrigin, MediaRecord,
    OneDriveSource,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
