//! # Matcher
//!
//! Decides which OneDrive records have no counterpart in Immich.
//!
//! Each [`MatchStrategy`] owns an index built once over the Immich inventory;
//! every OneDrive record is then checked against the enabled strategies in
//! order. Lookups are hash-map probes, never a pairwise scan.

use bridge_traits::{Inventory, InventoryOrigin, MediaRecord};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{ReconcileError, Result};

/// Default window for comparing capture timestamps
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(2);

/// A rule under which a OneDrive record counts as present in Immich
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchStrategy {
    /// Identical SHA-1 on both sides
    ContentHash,
    /// Same filename and size, capture times within tolerance
    CompositeKey,
    /// Same filename, nothing else compared
    FilenameOnly,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::ContentHash => write!(f, "content hash"),
            MatchStrategy::CompositeKey => write!(f, "filename + size + time"),
            MatchStrategy::FilenameOnly => write!(f, "filename only"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Strategies in priority order
    pub strategies: Vec<MatchStrategy>,
    pub timestamp_tolerance: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategies: vec![MatchStrategy::ContentHash, MatchStrategy::CompositeKey],
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
        }
    }
}

impl MatcherConfig {
    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }

    /// Append or remove the filename-only fallback
    pub fn with_filename_only(mut self, enabled: bool) -> Self {
        self.strategies.retain(|s| *s != MatchStrategy::FilenameOnly);
        if enabled {
            self.strategies.push(MatchStrategy::FilenameOnly);
        }
        self
    }
}

/// Outcome of one matching pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// OneDrive records without a counterpart, in OneDrive order
    pub missing: Vec<MediaRecord>,
    /// How many OneDrive records each strategy matched first
    pub matched_by: HashMap<MatchStrategy, usize>,
    pub onedrive_total: usize,
    pub immich_total: usize,
}

impl MatchReport {
    pub fn matched_total(&self) -> usize {
        self.matched_by.values().sum()
    }

    pub fn matched_with(&self, strategy: MatchStrategy) -> usize {
        self.matched_by.get(&strategy).copied().unwrap_or(0)
    }
}

/// Immich-side lookup tables, one per enabled strategy
struct ImmichIndex<'a> {
    by_hash: HashSet<&'a str>,
    by_composite: HashMap<(&'a str, u64), Vec<Option<DateTime<Utc>>>>,
    by_filename: HashSet<&'a str>,
}

impl<'a> ImmichIndex<'a> {
    fn build(immich: &'a Inventory, strategies: &[MatchStrategy]) -> Self {
        let mut index = Self {
            by_hash: HashSet::new(),
            by_composite: HashMap::new(),
            by_filename: HashSet::new(),
        };

        for strategy in strategies {
            match strategy {
                MatchStrategy::ContentHash => {
                    index.by_hash = immich
                        .records()
                        .iter()
                        .filter_map(|r| r.content_hash())
                        .collect();
                }
                MatchStrategy::CompositeKey => {
                    for record in immich.records() {
                        if let Some(size) = record.size_bytes() {
                            index
                                .by_composite
                                .entry((record.filename(), size))
                                .or_default()
                                .push(record.captured_at());
                        }
                    }
                }
                MatchStrategy::FilenameOnly => {
                    index.by_filename = immich.records().iter().map(|r| r.filename()).collect();
                }
            }
        }

        index
    }
}

/// Computes the missing set between two inventories
#[derive(Debug, Clone)]
pub struct Matcher {
    strategies: Vec<MatchStrategy>,
    tolerance: chrono::Duration,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        if config.strategies.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "at least one match strategy is required".to_string(),
            ));
        }

        let tolerance = chrono::Duration::from_std(config.timestamp_tolerance).map_err(|_| {
            ReconcileError::InvalidConfig(format!(
                "timestamp tolerance {:?} is out of range",
                config.timestamp_tolerance
            ))
        })?;

        let mut strategies = Vec::with_capacity(config.strategies.len());
        for strategy in config.strategies {
            if !strategies.contains(&strategy) {
                strategies.push(strategy);
            }
        }

        Ok(Self {
            strategies,
            tolerance,
        })
    }

    pub fn strategies(&self) -> &[MatchStrategy] {
        &self.strategies
    }

    /// Find OneDrive records with no Immich counterpart
    #[instrument(skip_all, fields(onedrive = onedrive.len(), immich = immich.len()))]
    pub fn find_missing(&self, onedrive: &Inventory, immich: &Inventory) -> Result<MatchReport> {
        expect_origin(onedrive, InventoryOrigin::OneDrive)?;
        expect_origin(immich, InventoryOrigin::Immich)?;

        let index = ImmichIndex::build(immich, &self.strategies);
        let mut matched_by: HashMap<MatchStrategy, usize> = HashMap::new();
        let mut missing = Vec::new();

        for record in onedrive.records() {
            match self.first_match(record, &index) {
                Some(strategy) => {
                    debug!(
                        source_id = record.source_id(),
                        filename = record.filename(),
                        strategy = %strategy,
                        "Found in Immich"
                    );
                    *matched_by.entry(strategy).or_insert(0) += 1;
                }
                None => missing.push(record.clone()),
            }
        }

        info!(
            missing = missing.len(),
            by_hash = matched_by.get(&MatchStrategy::ContentHash).copied().unwrap_or(0),
            by_composite = matched_by.get(&MatchStrategy::CompositeKey).copied().unwrap_or(0),
            by_filename = matched_by.get(&MatchStrategy::FilenameOnly).copied().unwrap_or(0),
            "Matching complete"
        );

        Ok(MatchReport {
            missing,
            matched_by,
            onedrive_total: onedrive.len(),
            immich_total: immich.len(),
        })
    }

    fn first_match(&self, record: &MediaRecord, index: &ImmichIndex<'_>) -> Option<MatchStrategy> {
        self.strategies
            .iter()
            .copied()
            .find(|strategy| self.matches(*strategy, record, index))
    }

    fn matches(&self, strategy: MatchStrategy, record: &MediaRecord, index: &ImmichIndex<'_>) -> bool {
        match strategy {
            MatchStrategy::ContentHash => record
                .content_hash()
                .is_some_and(|hash| index.by_hash.contains(hash)),
            MatchStrategy::CompositeKey => {
                let Some(size) = record.size_bytes() else {
                    return false;
                };
                index
                    .by_composite
                    .get(&(record.filename(), size))
                    .is_some_and(|candidates| {
                        candidates
                            .iter()
                            .any(|captured| self.within_tolerance(record.captured_at(), *captured))
                    })
            }
            MatchStrategy::FilenameOnly => index.by_filename.contains(record.filename()),
        }
    }

    /// A missing timestamp on either side does not rule a candidate out
    fn within_tolerance(&self, a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() <= self.tolerance,
            _ => true,
        }
    }
}

fn expect_origin(inventory: &Inventory, expected: InventoryOrigin) -> Result<()> {
    if inventory.origin() != expected {
        return Err(ReconcileError::OriginMismatch {
            expected,
            actual: inventory.origin(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const H1: &str = "1111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222";

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn onedrive(records: Vec<MediaRecord>) -> Inventory {
        Inventory::new(InventoryOrigin::OneDrive, at(0), records).unwrap()
    }

    fn immich(records: Vec<MediaRecord>) -> Inventory {
        Inventory::new(InventoryOrigin::Immich, at(0), records).unwrap()
    }

    fn ids(report: &MatchReport) -> Vec<&str> {
        report.missing.iter().map(|r| r.source_id()).collect()
    }

    fn default_matcher() -> Matcher {
        Matcher::new(MatcherConfig::default()).unwrap()
    }

    #[test]
    fn test_hash_match_across_unrelated_ids_and_names() {
        let od = onedrive(vec![MediaRecord::new("od-1", "IMG_1.jpg")
            .with_size(100)
            .with_content_hash(H1)]);
        let im = immich(vec![MediaRecord::new("uuid-9", "renamed.jpg").with_content_hash(H1)]);

        let report = default_matcher().find_missing(&od, &im).unwrap();

        assert!(report.missing.is_empty());
        assert_eq!(report.matched_with(MatchStrategy::ContentHash), 1);
    }

    #[test]
    fn test_missing_set_preserves_onedrive_order() {
        let od = onedrive(vec![
            MediaRecord::new("3", "c.jpg").with_size(3),
            MediaRecord::new("1", "a.jpg").with_size(1).with_content_hash(H1),
            MediaRecord::new("2", "b.jpg").with_size(2),
        ]);
        let im = immich(vec![MediaRecord::new("x", "zzz.jpg").with_content_hash(H1)]);

        let report = default_matcher().find_missing(&od, &im).unwrap();

        assert_eq!(ids(&report), vec!["3", "2"]);
        assert_eq!(report.onedrive_total, 3);
        assert_eq!(report.immich_total, 1);
    }

    #[test]
    fn test_composite_key_respects_tolerance() {
        let od = onedrive(vec![
            MediaRecord::new("1", "a.jpg").with_size(10).with_captured_at(at(0)),
            MediaRecord::new("2", "b.jpg").with_size(20).with_captured_at(at(0)),
        ]);
        let im = immich(vec![
            MediaRecord::new("x", "a.jpg").with_size(10).with_captured_at(at(2)),
            MediaRecord::new("y", "b.jpg").with_size(20).with_captured_at(at(3)),
        ]);

        let report = default_matcher().find_missing(&od, &im).unwrap();

        assert_eq!(ids(&report), vec!["2"]);
        assert_eq!(report.matched_with(MatchStrategy::CompositeKey), 1);
    }

    #[test]
    fn test_composite_key_requires_equal_size_and_name() {
        let od = onedrive(vec![
            MediaRecord::new("1", "a.jpg").with_size(10),
            MediaRecord::new("2", "b.jpg").with_size(20),
        ]);
        let im = immich(vec![
            MediaRecord::new("x", "a.jpg").with_size(11),
            MediaRecord::new("y", "B.jpg").with_size(20),
        ]);

        let report = default_matcher().find_missing(&od, &im).unwrap();
        assert_eq!(ids(&report), vec!["1", "2"]);
    }

    #[test]
    fn test_missing_timestamp_matches_on_name_and_size() {
        let od = onedrive(vec![MediaRecord::new("1", "a.jpg").with_size(10).with_captured_at(at(0))]);
        let im = immich(vec![MediaRecord::new("x", "a.jpg").with_size(10)]);

        let report = default_matcher().find_missing(&od, &im).unwrap();
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_any_of_several_composite_candidates_matches() {
        let od = onedrive(vec![MediaRecord::new("1", "a.jpg").with_size(10).with_captured_at(at(100))]);
        let im = immich(vec![
            MediaRecord::new("x", "a.jpg").with_size(10).with_captured_at(at(0)),
            MediaRecord::new("y", "a.jpg").with_size(10).with_captured_at(at(101)),
        ]);

        let report = default_matcher().find_missing(&od, &im).unwrap();
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_different_hash_falls_back_to_composite() {
        let od = onedrive(vec![MediaRecord::new("1", "a.jpg").with_size(10).with_content_hash(H1)]);
        let im = immich(vec![MediaRecord::new("x", "a.jpg").with_size(10).with_content_hash(H2)]);

        let report = default_matcher().find_missing(&od, &im).unwrap();
        assert!(report.missing.is_empty());
        assert_eq!(report.matched_with(MatchStrategy::CompositeKey), 1);
        assert_eq!(report.matched_with(MatchStrategy::ContentHash), 0);
    }

    #[test]
    fn test_filename_only_is_opt_in() {
        let od = onedrive(vec![MediaRecord::new("1", "a.jpg").with_size(10)]);
        let im = immich(vec![MediaRecord::new("x", "a.jpg")]);

        let strict = default_matcher().find_missing(&od, &im).unwrap();
        assert_eq!(ids(&strict), vec!["1"]);

        let loose = Matcher::new(MatcherConfig::default().with_filename_only(true))
            .unwrap()
            .find_missing(&od, &im)
            .unwrap();
        assert!(loose.missing.is_empty());
        assert_eq!(loose.matched_with(MatchStrategy::FilenameOnly), 1);
    }

    #[test]
    fn test_swapped_inventories_are_rejected() {
        let od = onedrive(vec![]);
        let im = immich(vec![]);

        let result = default_matcher().find_missing(&im, &od);
        assert!(matches!(result, Err(ReconcileError::OriginMismatch { .. })));
    }

    #[test]
    fn test_config_validation() {
        let empty = MatcherConfig {
            strategies: vec![],
            ..MatcherConfig::default()
        };
        assert!(Matcher::new(empty).is_err());

        let huge = MatcherConfig::default().with_timestamp_tolerance(Duration::from_secs(u64::MAX));
        assert!(Matcher::new(huge).is_err());

        let doubled = MatcherConfig::default()
            .with_filename_only(true)
            .with_filename_only(true);
        assert_eq!(
            Matcher::new(doubled).unwrap().strategies(),
            &[
                MatchStrategy::ContentHash,
                MatchStrategy::CompositeKey,
                MatchStrategy::FilenameOnly
            ]
        );
    }
}
