//! # Reconcile Coordinator
//!
//! Orchestrates one reconciliation run between a OneDrive camera roll and an
//! Immich library.
//!
//! ## Workflow
//!
//! 1. **Plan** ([`ReconcileCoordinator::plan`])
//!    - Load the cached OneDrive inventory unless a refresh is requested
//!    - Otherwise list OneDrive live and save the result to the cache
//!    - List Immich live (never cached)
//!    - Match the two inventories into a missing set
//! 2. **Collect** ([`ReconcileCoordinator::collect`])
//!    - Download the missing set into the target directory
//!    - Summarize totals and per-item failures
//!
//! Failing to list either side aborts the run. A cache that cannot be saved
//! only produces a warning, and download problems are reported per item.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_reconcile::{FileCacheStore, MetadataCache, ReconcileConfig, ReconcileCoordinator};
//! use std::sync::Arc;
//!
//! let cache = MetadataCache::new(FileCacheStore::new(fs.clone(), "onedrive_camera_roll_cache.json"));
//! let coordinator = ReconcileCoordinator::new(
//!     ReconcileConfig::default(),
//!     onedrive,
//!     immich,
//!     fs,
//!     cache,
//!     Arc::new(SystemClock),
//! )?;
//!
//! let plan = coordinator.plan().await?;
//! let summary = coordinator.collect(&plan).await?;
//! println!("{} copied, {} failed", summary.copied(), summary.failed());
//! ```

use bridge_traits::{
    Clock, FileSystemAccess, ImmichSource, Inventory, InventoryOrigin, MediaRecord,
    OneDriveSource,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::cache::{CacheSnapshot, CacheStore, MetadataCache};
use crate::collector::{
    CollectionReport, CollectionResult, Collector, CollectorConfig,
    DEFAULT_DOWNLOAD_IDLE_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
};
use crate::error::{ReconcileError, Result};
use crate::matcher::{
    MatchReport, MatchStrategy, Matcher, MatcherConfig, DEFAULT_TIMESTAMP_TOLERANCE,
};

/// Upper bound for `max_concurrent_downloads`
pub const MAX_CONCURRENT_DOWNLOADS: usize = 32;

/// Upper bound for the timestamp tolerance window
pub const MAX_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Reconciliation configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Ignore the cached OneDrive inventory and list it live
    pub refresh_onedrive: bool,

    /// Where missing files are downloaded
    pub target_dir: PathBuf,

    /// Number of simultaneous downloads
    pub max_concurrent_downloads: usize,

    /// Window for comparing capture timestamps
    pub timestamp_tolerance: Duration,

    /// Treat any Immich asset with the same filename as a match
    pub match_filename_only: bool,

    /// A download that receives nothing for this long fails
    pub download_idle_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            refresh_onedrive: false,
            target_dir: PathBuf::from("immich_missing_files"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            match_filename_only: false,
            download_idle_timeout: DEFAULT_DOWNLOAD_IDLE_TIMEOUT,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0
            || self.max_concurrent_downloads > MAX_CONCURRENT_DOWNLOADS
        {
            return Err(ReconcileError::InvalidConfig(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENT_DOWNLOADS, self.max_concurrent_downloads
            )));
        }

        if self.timestamp_tolerance > MAX_TIMESTAMP_TOLERANCE {
            return Err(ReconcileError::InvalidConfig(format!(
                "timestamp tolerance must not exceed {} seconds",
                MAX_TIMESTAMP_TOLERANCE.as_secs()
            )));
        }

        if self.target_dir.as_os_str().is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "target directory must not be empty".to_string(),
            ));
        }

        if self.download_idle_timeout.is_zero() {
            return Err(ReconcileError::InvalidConfig(
                "download idle timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig::default()
            .with_timestamp_tolerance(self.timestamp_tolerance)
            .with_filename_only(self.match_filename_only)
    }

    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            target_dir: self.target_dir.clone(),
            max_concurrent_downloads: self.max_concurrent_downloads,
            download_idle_timeout: self.download_idle_timeout,
        }
    }
}

/// How the OneDrive inventory for a plan was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneDriveProvenance {
    /// Loaded from a snapshot saved at the given time
    Cache { saved_at: DateTime<Utc> },
    /// Listed live during this run
    Live { cache_saved: bool },
}

/// Result of the planning phase
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub onedrive: Inventory,
    pub immich: Inventory,
    pub provenance: OneDriveProvenance,
    pub matches: MatchReport,
}

impl ReconcilePlan {
    /// OneDrive records with no Immich counterpart, in OneDrive order
    pub fn missing(&self) -> &[MediaRecord] {
        &self.matches.missing
    }
}

/// Totals for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub onedrive_total: usize,
    pub immich_total: usize,
    pub missing: usize,
    pub matched_by_hash: usize,
    pub matched_by_composite: usize,
    pub matched_by_filename: usize,
    /// `None` when collection was not run (dry run)
    pub collection: Option<CollectionReport>,
}

impl RunSummary {
    pub fn from_plan(plan: &ReconcilePlan) -> Self {
        Self {
            onedrive_total: plan.onedrive.len(),
            immich_total: plan.immich.len(),
            missing: plan.missing().len(),
            matched_by_hash: plan.matches.matched_with(MatchStrategy::ContentHash),
            matched_by_composite: plan.matches.matched_with(MatchStrategy::CompositeKey),
            matched_by_filename: plan.matches.matched_with(MatchStrategy::FilenameOnly),
            collection: None,
        }
    }

    pub fn copied(&self) -> usize {
        self.collection.as_ref().map_or(0, |c| c.copied())
    }

    pub fn skipped(&self) -> usize {
        self.collection.as_ref().map_or(0, |c| c.skipped())
    }

    pub fn failed(&self) -> usize {
        self.collection.as_ref().map_or(0, |c| c.failed())
    }

    pub fn failures(&self) -> Vec<&CollectionResult> {
        self.collection
            .as_ref()
            .map(|c| c.failures().collect())
            .unwrap_or_default()
    }
}

/// Reconcile coordinator
pub struct ReconcileCoordinator<S: CacheStore> {
    config: ReconcileConfig,
    onedrive: Arc<dyn OneDriveSource>,
    immich: Arc<dyn ImmichSource>,
    cache: MetadataCache<S>,
    clock: Arc<dyn Clock>,
    matcher: Matcher,
    collector: Collector,
}

impl<S: CacheStore> ReconcileCoordinator<S> {
    /// Create a coordinator, validating the configuration
    pub fn new(
        config: ReconcileConfig,
        onedrive: Arc<dyn OneDriveSource>,
        immich: Arc<dyn ImmichSource>,
        file_system: Arc<dyn FileSystemAccess>,
        cache: MetadataCache<S>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let matcher = Matcher::new(config.matcher_config())?;
        let collector = Collector::new(config.collector_config(), onedrive.clone(), file_system);

        Ok(Self {
            config,
            onedrive,
            immich,
            cache,
            clock,
            matcher,
            collector,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn cache(&self) -> &MetadataCache<S> {
        &self.cache
    }

    /// Build the inventories and compute the missing set
    #[instrument(skip(self), fields(refresh = self.config.refresh_onedrive))]
    pub async fn plan(&self) -> Result<ReconcilePlan> {
        info!("Phase 1: Loading OneDrive inventory");
        let (onedrive, provenance) = self.onedrive_inventory().await?;
        info!(records = onedrive.len(), "OneDrive inventory ready");

        info!("Phase 2: Listing Immich library");
        let immich = self
            .immich
            .list_library()
            .await
            .map_err(|e| ReconcileError::Fetch {
                origin: InventoryOrigin::Immich,
                message: e.to_string(),
            })?;
        info!(records = immich.len(), "Immich inventory ready");

        info!("Phase 3: Matching inventories");
        let matches = self.matcher.find_missing(&onedrive, &immich)?;

        Ok(ReconcilePlan {
            onedrive,
            immich,
            provenance,
            matches,
        })
    }

    /// Download the plan's missing set and summarize the run
    #[instrument(skip(self, plan), fields(missing = plan.missing().len()))]
    pub async fn collect(&self, plan: &ReconcilePlan) -> Result<RunSummary> {
        info!("Phase 4: Collecting {} missing files", plan.missing().len());
        let report = self.collector.collect(plan.missing()).await?;

        let summary = RunSummary {
            collection: Some(report),
            ..RunSummary::from_plan(plan)
        };

        info!(
            onedrive = summary.onedrive_total,
            immich = summary.immich_total,
            missing = summary.missing,
            copied = summary.copied(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Reconciliation complete"
        );

        Ok(summary)
    }

    /// Plan and collect in one call
    pub async fn run(&self) -> Result<RunSummary> {
        let plan = self.plan().await?;
        self.collect(&plan).await
    }

    async fn onedrive_inventory(&self) -> Result<(Inventory, OneDriveProvenance)> {
        if self.config.refresh_onedrive {
            info!("Refresh requested, bypassing OneDrive cache");
        } else if let Some(snapshot) = self.cache.load().await {
            let age = snapshot.age(self.clock.now());
            info!(
                age_minutes = age.num_minutes(),
                "Using cached OneDrive inventory"
            );
            return Ok((
                snapshot.inventory,
                OneDriveProvenance::Cache {
                    saved_at: snapshot.saved_at,
                },
            ));
        }

        let inventory = self
            .onedrive
            .list_camera_roll()
            .await
            .map_err(|e| ReconcileError::Fetch {
                origin: InventoryOrigin::OneDrive,
                message: e.to_string(),
            })?;

        if inventory.origin() != InventoryOrigin::OneDrive {
            return Err(ReconcileError::OriginMismatch {
                expected: InventoryOrigin::OneDrive,
                actual: inventory.origin(),
            });
        }

        let snapshot = CacheSnapshot::new(inventory, self.clock.now());
        let cache_saved = match self.cache.save(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save OneDrive cache, continuing without it");
                false
            }
        };

        Ok((snapshot.inventory, OneDriveProvenance::Live { cache_saved }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconcileConfig::default();

        assert!(!config.refresh_onedrive);
        assert!(!config.match_filename_only);
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.timestamp_tolerance, Duration::from_secs(2));
        assert_eq!(config.target_dir, PathBuf::from("immich_missing_files"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero = ReconcileConfig {
            max_concurrent_downloads: 0,
            ..ReconcileConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ReconcileError::InvalidConfig(_))));

        let wide = ReconcileConfig {
            timestamp_tolerance: Duration::from_secs(2 * 24 * 60 * 60),
            ..ReconcileConfig::default()
        };
        assert!(wide.validate().is_err());

        let nowhere = ReconcileConfig {
            target_dir: PathBuf::new(),
            ..ReconcileConfig::default()
        };
        assert!(nowhere.validate().is_err());

        let impatient = ReconcileConfig {
            download_idle_timeout: Duration::ZERO,
            ..ReconcileConfig::default()
        };
        assert!(impatient.validate().is_err());
    }

    #[test]
    fn test_filename_only_flag_reaches_matcher() {
        let config = ReconcileConfig {
            match_filename_only: true,
            ..ReconcileConfig::default()
        };
        assert!(config
            .matcher_config()
            .strategies
            .contains(&MatchStrategy::FilenameOnly));
        assert!(!ReconcileConfig::default()
            .matcher_config()
            .strategies
            .contains(&MatchStrategy::FilenameOnly));
    }
}
