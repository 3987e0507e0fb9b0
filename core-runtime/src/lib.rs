//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the binary and the engine:
//! - Logging and tracing infrastructure
//! - Application configuration (credentials, endpoints, paths)
//!
//! ## Overview
//!
//! Nothing in here knows about photos. It establishes the logging conventions
//! and the fail-fast configuration checks the rest of the workspace relies on.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
