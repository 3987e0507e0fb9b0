//! # Collector
//!
//! Downloads every missing record into the review directory.
//!
//! Work happens in two passes:
//! 1. Destinations are resolved one record at a time. Existing identical
//!    files are skipped, name clashes get a ` (n)` suffix, and every chosen
//!    path is reserved together with its `.part` staging path, so no record
//!    lands on a path another record writes.
//! 2. Downloads run concurrently, bounded by a semaphore. Each streams into
//!    `<dest>.part`, is checked against the expected size and SHA-1, and is
//!    renamed into place only when both agree. A body that stops delivering
//!    bytes for longer than the idle timeout fails that record.

use bridge_traits::{FileSystemAccess, MediaRecord, OneDriveSource};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ReconcileError, Result};

/// Default number of simultaneous downloads
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// How long a download may go without receiving a byte
pub const DEFAULT_DOWNLOAD_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const PART_SUFFIX: &str = ".part";
const COPY_BUFFER_SIZE: usize = 64 * 1024;
const MAX_NAME_SUFFIX: usize = 10_000;
const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An identical file already sits at `path`
    AlreadyCollected { path: PathBuf },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyCollected { path } => {
                write!(f, "already collected at {}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Download,
    Verification,
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ReconcileError> for FailureReason {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Download { message, .. } => Self::new(FailureKind::Download, message),
            ReconcileError::Verification { message, .. } => {
                Self::new(FailureKind::Verification, format!("verification mismatch: {}", message))
            }
            other => Self::new(FailureKind::Filesystem, other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    Copied { path: PathBuf, bytes: u64 },
    Skipped(SkipReason),
    Failed(FailureReason),
}

/// Outcome for one missing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionResult {
    pub source_id: String,
    pub filename: String,
    pub outcome: CollectionOutcome,
}

impl CollectionResult {
    fn new(record: &MediaRecord, outcome: CollectionOutcome) -> Self {
        Self {
            source_id: record.source_id().to_string(),
            filename: record.filename().to_string(),
            outcome,
        }
    }

    pub fn is_copied(&self) -> bool {
        matches!(self.outcome, CollectionOutcome::Copied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, CollectionOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CollectionOutcome::Failed(_))
    }
}

/// Every outcome of one collection pass, in missing-set order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub results: Vec<CollectionResult>,
}

impl CollectionReport {
    pub fn copied(&self) -> usize {
        self.results.iter().filter(|r| r.is_copied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CollectionResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn bytes_copied(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                CollectionOutcome::Copied { bytes, .. } => bytes,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub target_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub download_idle_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("immich_missing_files"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            download_idle_timeout: DEFAULT_DOWNLOAD_IDLE_TIMEOUT,
        }
    }
}

/// Where a record will land
enum Destination {
    AlreadyCollected(PathBuf),
    Fresh(PathBuf),
}

/// Downloads missing records into the target directory
#[derive(Clone)]
pub struct Collector {
    config: CollectorConfig,
    source: Arc<dyn OneDriveSource>,
    fs: Arc<dyn FileSystemAccess>,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        source: Arc<dyn OneDriveSource>,
        fs: Arc<dyn FileSystemAccess>,
    ) -> Self {
        Self { config, source, fs }
    }

    pub fn target_dir(&self) -> &Path {
        &self.config.target_dir
    }

    /// Collect every record. Per-item problems become `Failed` outcomes;
    /// only an unusable target directory aborts the pass.
    #[instrument(skip_all, fields(target = %self.config.target_dir.display(), count = missing.len()))]
    pub async fn collect(&self, missing: &[MediaRecord]) -> Result<CollectionReport> {
        self.prepare_target_dir().await?;

        let mut slots: Vec<Option<CollectionResult>> = vec![None; missing.len()];
        let mut downloads = Vec::new();
        let mut reserved = HashSet::new();

        for (slot, record) in missing.iter().enumerate() {
            match self.resolve_destination(record, &mut reserved).await {
                Ok(Destination::AlreadyCollected(path)) => {
                    debug!(filename = record.filename(), path = ?path, "Already collected");
                    slots[slot] = Some(CollectionResult::new(
                        record,
                        CollectionOutcome::Skipped(SkipReason::AlreadyCollected { path }),
                    ));
                }
                Ok(Destination::Fresh(path)) => downloads.push((slot, record.clone(), path)),
                Err(e) => {
                    warn!(filename = record.filename(), error = %e, "Could not choose a destination");
                    slots[slot] = Some(CollectionResult::new(
                        record,
                        CollectionOutcome::Failed(FailureReason::from(e)),
                    ));
                }
            }
        }

        info!(
            to_download = downloads.len(),
            already_collected = slots.iter().flatten().filter(|r| r.is_skipped()).count(),
            "Destinations resolved"
        );

        let total = downloads.len();
        let bytes_total: u64 = downloads
            .iter()
            .filter_map(|(_, record, _)| record.size_bytes())
            .sum();
        let concurrency = self.config.max_concurrent_downloads.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(total);

        for (slot, record, dest) in downloads {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ReconcileError::TargetDir(format!("download pool closed: {}", e)))?;
            let collector = self.clone();
            let task_record = record.clone();
            let task_dest = dest.clone();

            let handle = tokio::spawn(async move {
                let outcome = collector.download_one(&task_record, &task_dest).await;
                drop(permit);
                outcome
            });

            handles.push((slot, record, dest, handle));
        }

        let mut finished = 0;
        let mut bytes_done: u64 = 0;
        for (slot, record, dest, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(bytes)) => {
                    bytes_done += bytes;
                    CollectionOutcome::Copied { path: dest, bytes }
                }
                Ok(Err(e)) => {
                    warn!(
                        source_id = record.source_id(),
                        filename = record.filename(),
                        error = %e,
                        "Collection failed"
                    );
                    CollectionOutcome::Failed(FailureReason::from(e))
                }
                Err(e) => {
                    error!(error = %e, filename = record.filename(), "Download task panicked");
                    CollectionOutcome::Failed(FailureReason::new(
                        FailureKind::Download,
                        format!("download task aborted: {}", e),
                    ))
                }
            };
            slots[slot] = Some(CollectionResult::new(&record, outcome));

            finished += 1;
            if finished % PROGRESS_INTERVAL == 0 || finished == total {
                info!(
                    bytes_done,
                    bytes_total,
                    "Downloaded {}/{} files",
                    finished,
                    total
                );
            }
        }

        let report = CollectionReport {
            results: slots.into_iter().flatten().collect(),
        };

        info!(
            copied = report.copied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Collection complete"
        );

        Ok(report)
    }

    async fn prepare_target_dir(&self) -> Result<()> {
        let dir = &self.config.target_dir;
        if self.fs.exists(dir).await? {
            let metadata = self.fs.metadata(dir).await?;
            if !metadata.is_directory {
                return Err(ReconcileError::TargetDir(format!(
                    "{} exists and is not a directory",
                    dir.display()
                )));
            }
            return Ok(());
        }

        self.fs
            .create_dir_all(dir)
            .await
            .map_err(|e| ReconcileError::TargetDir(format!("cannot create {}: {}", dir.display(), e)))?;
        info!(path = ?dir, "Created target directory");
        Ok(())
    }

    /// Pick the first free or identical name, reserving it for this pass.
    ///
    /// `reserved` holds every destination chosen so far plus the staging
    /// path of each fresh one. A candidate is taken when it or its staging
    /// path is already in the set.
    async fn resolve_destination(
        &self,
        record: &MediaRecord,
        reserved: &mut HashSet<PathBuf>,
    ) -> Result<Destination> {
        let name = sanitize_filename(record.filename(), record.source_id());

        for attempt in 0..=MAX_NAME_SUFFIX {
            let candidate = self.config.target_dir.join(numbered_name(&name, attempt));
            let staging = part_path(&candidate);
            if reserved.contains(&candidate) || reserved.contains(&staging) {
                continue;
            }

            if self.fs.exists(&candidate).await? {
                if self.is_same_content(record, &candidate).await? {
                    reserved.insert(candidate.clone());
                    return Ok(Destination::AlreadyCollected(candidate));
                }
                continue;
            }

            reserved.insert(staging);
            reserved.insert(candidate.clone());
            return Ok(Destination::Fresh(candidate));
        }

        Err(ReconcileError::TargetDir(format!(
            "no free name for {} after {} attempts",
            name, MAX_NAME_SUFFIX
        )))
    }

    /// Same size, and same SHA-1 when the record carries one
    async fn is_same_content(&self, record: &MediaRecord, path: &Path) -> Result<bool> {
        let metadata = self.fs.metadata(path).await?;
        if metadata.is_directory {
            return Ok(false);
        }
        if let Some(expected) = record.size_bytes() {
            if metadata.size != expected {
                return Ok(false);
            }
        }

        match record.content_hash() {
            Some(expected) => Ok(self.hash_file(path).await? == expected),
            None => Ok(true),
        }
    }

    async fn hash_file(&self, path: &Path) -> Result<String> {
        let mut reader = self.fs.open_read_stream(path).await?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(bridge_traits::BridgeError::from)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Stream one record to disk and verify it. Returns bytes written.
    #[instrument(skip(self, record), fields(source_id = record.source_id(), filename = record.filename()))]
    async fn download_one(&self, record: &MediaRecord, dest: &Path) -> Result<u64> {
        let download_ref = record.download_ref().ok_or_else(|| ReconcileError::Download {
            source_id: record.source_id().to_string(),
            filename: record.filename().to_string(),
            message: "record has no download reference".to_string(),
        })?;

        let part = part_path(dest);
        let (bytes, digest) = match self.stream_to_part(record, download_ref, &part).await {
            Ok(received) => received,
            Err(e) => {
                self.discard(&part).await;
                return Err(e);
            }
        };

        if let Err(e) = verify(record, bytes, &digest) {
            self.discard(&part).await;
            return Err(e);
        }

        if let Err(e) = self.fs.rename(&part, dest).await {
            self.discard(&part).await;
            return Err(e.into());
        }

        debug!(bytes, path = ?dest, "Collected");
        Ok(bytes)
    }

    async fn stream_to_part(
        &self,
        record: &MediaRecord,
        download_ref: &bridge_traits::DownloadRef,
        part: &Path,
    ) -> Result<(u64, String)> {
        let download_error = |message: String| ReconcileError::Download {
            source_id: record.source_id().to_string(),
            filename: record.filename().to_string(),
            message,
        };

        let idle = self.config.download_idle_timeout;
        let mut reader = timeout(idle, self.source.download(download_ref))
            .await
            .map_err(|_| download_error(format!("no response within {:?}", idle)))?
            .map_err(|e| download_error(e.to_string()))?;
        let mut writer = self.fs.open_write_stream(part).await?;

        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = timeout(idle, reader.read(&mut buf))
                .await
                .map_err(|_| {
                    download_error(format!(
                        "stream stalled for {:?} after {} bytes",
                        idle,
                        total
                    ))
                })?
                .map_err(|e| download_error(format!("stream interrupted after {} bytes: {}", total, e)))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer
                .write_all(&buf[..n])
                .await
                .map_err(bridge_traits::BridgeError::from)?;
            total += n as u64;
        }

        writer
            .shutdown()
            .await
            .map_err(bridge_traits::BridgeError::from)?;

        Ok((total, hex::encode(hasher.finalize())))
    }

    async fn discard(&self, part: &Path) {
        if let Err(e) = self.fs.remove_if_exists(part).await {
            warn!(path = ?part, error = %e, "Failed to remove partial download");
        }
    }
}

fn verify(record: &MediaRecord, bytes: u64, digest: &str) -> Result<()> {
    let mismatch = |message: String| ReconcileError::Verification {
        source_id: record.source_id().to_string(),
        filename: record.filename().to_string(),
        message,
    };

    if let Some(expected) = record.size_bytes() {
        if bytes != expected {
            return Err(mismatch(format!(
                "expected {} bytes, received {}",
                expected, bytes
            )));
        }
    }

    if let Some(expected) = record.content_hash() {
        if digest != expected {
            return Err(mismatch(format!(
                "expected sha1 {}, received {}",
                expected, digest
            )));
        }
    }

    Ok(())
}

/// Reduce a remote filename to a single safe path component
pub fn sanitize_filename(filename: &str, fallback_id: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim().to_string();

    if cleaned.is_empty() {
        sanitize_fallback(fallback_id)
    } else {
        cleaned
    }
}

fn sanitize_fallback(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("onedrive-{}", safe)
}

/// `name.ext` for 0, `name (n).ext` otherwise
pub fn numbered_name(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("IMG_1.jpg", 0), "IMG_1.jpg");
        assert_eq!(numbered_name("IMG_1.jpg", 1), "IMG_1 (1).jpg");
        assert_eq!(numbered_name("archive.tar.gz", 2), "archive.tar (2).gz");
        assert_eq!(numbered_name("README", 3), "README (3)");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("IMG_0001.HEIC", "1"), "IMG_0001.HEIC");
        assert_eq!(sanitize_filename("../../etc/passwd", "1"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b.jpg", "1"), "a_b.jpg");
        assert_eq!(sanitize_filename("..", "ABC!1"), "onedrive-ABC_1");
        assert_eq!(sanitize_filename("   ", "id"), "onedrive-id");
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("out/IMG (1).jpg")),
            PathBuf::from("out/IMG (1).jpg.part")
        );
    }

    #[test]
    fn test_verify() {
        let record = MediaRecord::new("1", "a.jpg")
            .with_size(5)
            .with_content_hash("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");

        assert!(verify(&record, 5, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d").is_ok());
        assert!(matches!(
            verify(&record, 4, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"),
            Err(ReconcileError::Verification { .. })
        ));
        assert!(matches!(
            verify(&record, 5, "0000000000000000000000000000000000000000"),
            Err(ReconcileError::Verification { .. })
        ));
        assert!(verify(&MediaRecord::new("2", "b.jpg"), 42, "ignored").is_ok());
    }

    #[test]
    fn test_failure_reason_from_error() {
        let reason = FailureReason::from(ReconcileError::Verification {
            source_id: "2".to_string(),
            filename: "b.jpg".to_string(),
            message: "expected 200 bytes, received 150".to_string(),
        });
        assert_eq!(reason.kind, FailureKind::Verification);
        assert_eq!(
            reason.to_string(),
            "verification mismatch: expected 200 bytes, received 150"
        );
    }
}
