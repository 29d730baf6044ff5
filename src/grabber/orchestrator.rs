//! Run Orchestrator
//!
//! Walks the configured page range, feeds each page's candidates into one download batch
//! and produces the run report. This is the only place page iteration policy lives.

use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::grabber::engine::{DownloadEngine, Interrupt};
use crate::grabber::outcome::DownloadOutcome;
use crate::grabber::retry::RetryPolicy;
use crate::grabber::source::PageSource;
use crate::grabber::summary::RunReport;

/// Failed candidate names included in the closing warning.
const MAX_LISTED_FAILURES: usize = 10;

/// Inclusive page range to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRange {
    pub(crate) start: u32,
    pub(crate) end: u32,
}

/// Drives a [`PageSource`] into a [`DownloadEngine`].
pub(crate) struct Orchestrator<'a> {
    engine: &'a DownloadEngine,
    source: &'a dyn PageSource,
    page_retry: RetryPolicy,
    page_delay: Duration,
    interrupt: Interrupt,
}

impl<'a> Orchestrator<'a> {
    pub(crate) fn new(
        engine: &'a DownloadEngine,
        source: &'a dyn PageSource,
        page_retry: RetryPolicy,
        page_delay: Duration,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            engine,
            source,
            page_retry,
            page_delay,
            interrupt,
        }
    }

    /// Processes every page in `range`. Pages that fail to load or come back empty are logged
    /// and skipped; nothing short of an interrupt ends the run early.
    pub(crate) async fn run(&self, range: PageRange) -> RunReport {
        let started_at = Local::now();
        let mut batch = self.engine.start_batch();
        let mut interrupted = false;
        let mut empty_pages = 0usize;
        let mut failed_pages = 0usize;

        info!("Processing pages {} to {}", range.start, range.end);

        'pages: for page in range.start..=range.end {
            if self.interrupt.is_triggered() {
                interrupted = true;
                break;
            }

            if page > range.start && !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }

            info!("Processing page {}/{}", page, range.end);

            let what = format!("page {}", page);
            let candidates = match self
                .page_retry
                .run(&what, || self.source.candidates(page))
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!("Failed to load page {}: {}. Moving on.", page, e);
                    failed_pages += 1;
                    continue;
                }
            };

            if candidates.is_empty() {
                warn!("No products found on page {}, might be the last page", page);
                empty_pages += 1;
                continue;
            }

            info!("Found {} products on page {}", candidates.len(), page);

            for candidate in candidates {
                if !batch.submit(candidate).await {
                    interrupted = true;
                    break 'pages;
                }
            }
        }

        if interrupted {
            warn!(
                "Stopped submitting after {} candidates, waiting for in-flight downloads",
                batch.submitted()
            );
        }

        let result = batch.finish().await;

        let failed: Vec<&str> = result
            .reports
            .iter()
            .filter(|report| matches!(report.outcome, DownloadOutcome::Failed(_)))
            .map(|report| report.name.as_str())
            .collect();
        if !failed.is_empty() {
            let shown = failed.len().min(MAX_LISTED_FAILURES);
            warn!(
                "{} candidates failed: {}{}",
                failed.len(),
                failed[..shown].join(", "),
                if failed.len() > shown { ", ..." } else { "" }
            );
        }

        info!(
            empty_pages,
            failed_pages,
            "Finished walking pages {} to {}",
            range.start,
            range.end
        );

        RunReport {
            summary: result.summary,
            started_at,
            finished_at: Local::now(),
            interrupted: interrupted || self.interrupt.is_triggered(),
        }
    }
}
