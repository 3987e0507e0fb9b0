//! Human-readable output on stdout

use chrono::{DateTime, Utc};
use core_reconcile::{
    CollectionOutcome, OneDriveProvenance, ReconcilePlan, RunSummary,
};
use std::io::{self, Write};

/// Plan overview followed by the missing list
pub fn write_plan<W: Write>(out: &mut W, plan: &ReconcilePlan, now: DateTime<Utc>) -> io::Result<()> {
    let source = match plan.provenance {
        OneDriveProvenance::Cache { saved_at } => {
            format!("from cache, {} old", format_age(now - saved_at))
        }
        OneDriveProvenance::Live { cache_saved: true } => "listed live, cache updated".to_string(),
        OneDriveProvenance::Live { cache_saved: false } => {
            "listed live, cache not updated".to_string()
        }
    };

    writeln!(out, "OneDrive camera roll: {} files ({})", plan.onedrive.len(), source)?;
    writeln!(out, "Immich library:       {} assets", plan.immich.len())?;

    let missing = plan.missing();
    if missing.is_empty() {
        writeln!(out, "Every OneDrive file is already in Immich.")?;
        return Ok(());
    }

    writeln!(out, "Missing from Immich:  {}", missing.len())?;
    for record in missing {
        let size = record
            .size_bytes()
            .map(format_bytes)
            .unwrap_or_else(|| "size unknown".to_string());
        match record.captured_at() {
            Some(at) => writeln!(
                out,
                "  {}  {}  {}",
                record.filename(),
                size,
                at.format("%Y-%m-%d %H:%M:%S")
            )?,
            None => writeln!(out, "  {}  {}", record.filename(), size)?,
        }
    }

    Ok(())
}

/// End-of-run totals and the failure list
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Summary")?;
    writeln!(out, "  OneDrive files:   {}", summary.onedrive_total)?;
    writeln!(out, "  Immich assets:    {}", summary.immich_total)?;
    writeln!(
        out,
        "  Matched:          {} by hash, {} by name+size+time, {} by name only",
        summary.matched_by_hash, summary.matched_by_composite, summary.matched_by_filename
    )?;
    writeln!(out, "  Missing:          {}", summary.missing)?;

    if summary.collection.is_none() && summary.missing > 0 {
        writeln!(out, "  Nothing downloaded (dry run)")?;
        return Ok(());
    }

    let bytes = summary
        .collection
        .as_ref()
        .map(|c| c.bytes_copied())
        .unwrap_or(0);
    writeln!(
        out,
        "  Copied:           {} ({})",
        summary.copied(),
        format_bytes(bytes)
    )?;
    writeln!(out, "  Already present:  {}", summary.skipped())?;
    writeln!(out, "  Failed:           {}", summary.failed())?;

    let failures = summary.failures();
    if !failures.is_empty() {
        writeln!(out)?;
        writeln!(out, "Failed files:")?;
        for result in failures {
            if let CollectionOutcome::Failed(reason) = &result.outcome {
                writeln!(out, "  {} ({}): {}", result.filename, result.source_id, reason)?;
            }
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    match minutes {
        0 => "less than a minute".to_string(),
        1..=59 => format!("{} min", minutes),
        60..=2879 => format!("{} h", minutes / 60),
        _ => format!("{} days", minutes / 1440),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{Inventory, InventoryOrigin, MediaRecord};
    use chrono::TimeZone;
    use core_reconcile::{
        CollectionReport, CollectionResult, FailureKind, FailureReason, MatchReport, SkipReason,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn plan(missing: Vec<MediaRecord>, provenance: OneDriveProvenance) -> ReconcilePlan {
        let onedrive = Inventory::new(InventoryOrigin::OneDrive, now(), missing.clone()).unwrap();
        let immich = Inventory::new(InventoryOrigin::Immich, now(), Vec::new()).unwrap();
        ReconcilePlan {
            matches: MatchReport {
                missing,
                matched_by: HashMap::new(),
                onedrive_total: onedrive.len(),
                immich_total: 0,
            },
            onedrive,
            immich,
            provenance,
        }
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_plan_lists_missing_records() {
        let record = MediaRecord::new("od-1", "IMG_0001.jpg")
            .with_size(2048)
            .with_captured_at(Utc.with_ymd_and_hms(2024, 5, 4, 10, 30, 0).unwrap());
        let plan = plan(
            vec![record, MediaRecord::new("od-2", "IMG_0002.jpg")],
            OneDriveProvenance::Cache {
                saved_at: now() - chrono::Duration::hours(3),
            },
        );

        let text = render(|out| write_plan(out, &plan, now()));

        assert!(text.contains("2 files (from cache, 3 h old)"));
        assert!(text.contains("Missing from Immich:  2"));
        assert!(text.contains("IMG_0001.jpg  2.0 KiB  2024-05-04 10:30:00"));
        assert!(text.contains("IMG_0002.jpg  size unknown"));
    }

    #[test]
    fn test_plan_with_nothing_missing() {
        let plan = plan(Vec::new(), OneDriveProvenance::Live { cache_saved: false });
        let text = render(|out| write_plan(out, &plan, now()));

        assert!(text.contains("listed live, cache not updated"));
        assert!(text.contains("already in Immich"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let summary = RunSummary {
            onedrive_total: 3,
            immich_total: 1,
            missing: 3,
            matched_by_hash: 0,
            matched_by_composite: 0,
            matched_by_filename: 0,
            collection: Some(CollectionReport {
                results: vec![
                    CollectionResult {
                        source_id: "od-1".to_string(),
                        filename: "a.jpg".to_string(),
                        outcome: CollectionOutcome::Copied {
                            path: PathBuf::from("out/a.jpg"),
                            bytes: 2048,
                        },
                    },
                    CollectionResult {
                        source_id: "od-2".to_string(),
                        filename: "b.jpg".to_string(),
                        outcome: CollectionOutcome::Skipped(SkipReason::AlreadyCollected {
                            path: PathBuf::from("out/b.jpg"),
                        }),
                    },
                    CollectionResult {
                        source_id: "od-3".to_string(),
                        filename: "c.jpg".to_string(),
                        outcome: CollectionOutcome::Failed(FailureReason {
                            kind: FailureKind::Download,
                            message: "HTTP 503".to_string(),
                        }),
                    },
                ],
            }),
        };

        let text = render(|out| write_summary(out, &summary));

        assert!(text.contains("Copied:           1 (2.0 KiB)"));
        assert!(text.contains("Already present:  1"));
        assert!(text.contains("Failed:           1"));
        assert!(text.contains("c.jpg (od-3): HTTP 503"));
    }

    #[test]
    fn test_dry_run_summary() {
        let summary = RunSummary {
            onedrive_total: 3,
            immich_total: 2,
            missing: 1,
            matched_by_hash: 2,
            matched_by_composite: 0,
            matched_by_filename: 0,
            collection: None,
        };

        let text = render(|out| write_summary(out, &summary));

        assert!(text.contains("2 by hash"));
        assert!(text.contains("Missing:          1"));
        assert!(text.contains("Nothing downloaded"));
        assert!(!text.contains("Copied:"));
    }

    #[test]
    fn test_summary_with_nothing_missing_shows_zero_counts() {
        let plan = plan(Vec::new(), OneDriveProvenance::Live { cache_saved: true });
        let summary = RunSummary::from_plan(&plan);

        let text = render(|out| write_summary(out, &summary));

        assert!(text.contains("Missing:          0"));
        assert!(text.contains("Copied:           0 (0 B)"));
        assert!(text.contains("Already present:  0"));
        assert!(text.contains("Failed:           0"));
        assert!(!text.contains("Nothing downloaded"));
    }
}
