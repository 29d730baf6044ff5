//! Run-wide counters and the final report.

use std::ops::{Add, AddAssign};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Local};
use console::style;
use tracing::info;

use crate::grabber::outcome::{DownloadOutcome, Quality};

/// Aggregate counts for a run. Order independent: runs and pages combine by addition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) total_candidates: usize,
    pub(crate) blocked: usize,
    pub(crate) skipped_existing: usize,
    pub(crate) downloaded: usize,
    pub(crate) failed: usize,
    /// Downloads that came from the rewritten URL. Included in `downloaded`.
    pub(crate) enhanced: usize,
    pub(crate) bytes_downloaded: u64,
}

impl RunSummary {
    /// `total == blocked + skipped + downloaded + failed`.
    pub(crate) fn is_conserved(&self) -> bool {
        self.total_candidates == self.blocked + self.skipped_existing + self.downloaded + self.failed
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(mut self, rhs: RunSummary) -> RunSummary {
        self += rhs;
        self
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: RunSummary) {
        self.total_candidates += rhs.total_candidates;
        self.blocked += rhs.blocked;
        self.skipped_existing += rhs.skipped_existing;
        self.downloaded += rhs.downloaded;
        self.failed += rhs.failed;
        self.enhanced += rhs.enhanced;
        self.bytes_downloaded += rhs.bytes_downloaded;
    }
}

/// Lock-free counters shared by every download worker.
#[derive(Debug, Default)]
pub(crate) struct SummaryCounters {
    total_candidates: AtomicUsize,
    blocked: AtomicUsize,
    skipped_existing: AtomicUsize,
    downloaded: AtomicUsize,
    failed: AtomicUsize,
    enhanced: AtomicUsize,
    bytes_downloaded: AtomicU64,
}

impl SummaryCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Counts one finished candidate. Returns the number of downloads completed so far when
    /// this outcome was a download.
    pub(crate) fn record(&self, outcome: &DownloadOutcome) -> Option<usize> {
        self.total_candidates.fetch_add(1, Ordering::Relaxed);

        match outcome {
            DownloadOutcome::Blocked { .. } => {
                self.blocked.fetch_add(1, Ordering::Relaxed);
                None
            }
            DownloadOutcome::Skipped => {
                self.skipped_existing.fetch_add(1, Ordering::Relaxed);
                None
            }
            DownloadOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                None
            }
            DownloadOutcome::Downloaded { bytes, quality } => {
                if *quality == Quality::Enhanced {
                    self.enhanced.fetch_add(1, Ordering::Relaxed);
                }
                self.bytes_downloaded.fetch_add(*bytes, Ordering::Relaxed);
                Some(self.downloaded.fetch_add(1, Ordering::Relaxed) + 1)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> RunSummary {
        RunSummary {
            total_candidates: self.total_candidates.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            skipped_existing: self.skipped_existing.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            enhanced: self.enhanced.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

/// A finished run, ready to be reported.
#[derive(Debug, Clone)]
pub(crate) struct RunReport {
    pub(crate) summary: RunSummary,
    pub(crate) started_at: DateTime<Local>,
    pub(crate) finished_at: DateTime<Local>,
    pub(crate) interrupted: bool,
}

impl RunReport {
    /// Logs the report and prints it to stdout.
    pub(crate) fn print(&self, download_dir: &Path) {
        let s = &self.summary;
        let elapsed = self.finished_at - self.started_at;
        let location = std::path::absolute(download_dir).unwrap_or_else(|_| download_dir.to_path_buf());

        info!(
            total = s.total_candidates,
            blocked = s.blocked,
            skipped_existing = s.skipped_existing,
            downloaded = s.downloaded,
            enhanced = s.enhanced,
            failed = s.failed,
            bytes = s.bytes_downloaded,
            interrupted = self.interrupted,
            "Run finished in {}s",
            elapsed.num_seconds()
        );

        println!();
        if self.interrupted {
            println!("{}", style("Download interrupted by user").yellow().bold());
        } else {
            println!("{}", style("Download complete!").green().bold());
        }
        println!("  Total candidates:  {}", s.total_candidates);
        println!("  Blocked:           {}", s.blocked);
        println!("  Skipped (exists):  {}", s.skipped_existing);
        println!(
            "  Downloaded:        {} ({} high quality, {})",
            style(s.downloaded).green(),
            s.enhanced,
            human_bytes(s.bytes_downloaded)
        );
        println!("  Failed:            {}", style(s.failed).red());
        println!(
            "  Elapsed:           {}s (started {})",
            elapsed.num_seconds(),
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Saved to:          {}", location.display());
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
