//! # Reconciliation Engine
//!
//! Finds camera-roll files that exist in OneDrive but not in Immich and
//! downloads them for review.
//!
//! ## Components
//!
//! - [`cache`]: persisted OneDrive inventory with atomic replace
//! - [`matcher`]: hash / composite-key matching over indexed inventories
//! - [`collector`]: bounded parallel downloads with verification
//! - [`coordinator`]: the plan / collect workflow tying them together

pub mod cache;
pub mod collector;
pub mod coordinator;
pub mod error;
pub mod matcher;

pub use cache::{CacheSnapshot, CacheStore, FileCacheStore, MemoryCacheStore, MetadataCache};
pub use collector::{
    CollectionOutcome, CollectionReport, CollectionResult, Collector, CollectorConfig,
    FailureKind, FailureReason, SkipReason,
};
pub use coordinator::{
    OneDriveProvenance, ReconcileConfig, ReconcileCoordinator, ReconcilePlan, RunSummary,
};
pub use error::{ReconcileError, Result};
pub use matcher::{MatchReport, MatchStrategy, Matcher, MatcherConfig};
