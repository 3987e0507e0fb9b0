//! # OneDrive Provider
//!
//! Implements `OneDriveSource` for the Microsoft Graph API.
//!
//! ## Overview
//!
//! This module provides:
//! - Camera-roll listing with `@odata.nextLink` pagination
//! - Normalization of drive items into `MediaRecord`s (folders skipped)
//! - Streaming downloads through the `/content` endpoint
//!
//! Authentication is a bearer token supplied by the caller; no OAuth flow is
//! performed here.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{OneDriveConnector, DEFAULT_CAMERA_ROLL_PATH, GRAPH_API_BASE};
pub use error::{OneDriveError, Result};
