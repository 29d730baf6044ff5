//! Download Engine
//!
//! This module provides the bulk image download engine that:
//! 1. Drops candidates whose names match the keyword blocklist, before any I/O
//! 2. Skips candidates whose target file already exists
//! 3. Bounds in-flight downloads with a semaphore
//! 4. Tries the enhanced URL first and falls back to the original once
//! 5. Streams to a per-attempt `.part` file and renames into place only on success

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::grabber::blocklist::Blocklist;
use crate::grabber::candidate::{Candidate, ResolvedTarget};
use crate::grabber::enhance::UrlEnhancer;
use crate::grabber::fetcher::{FetchError, ImageFetcher};
use crate::grabber::outcome::{DownloadOutcome, FailureCause, ItemReport, Quality};
use crate::grabber::summary::{RunSummary, SummaryCounters};

/// Error types for the download engine
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for download engine setup
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Download engine configuration
#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    pub(crate) download_dir: PathBuf,
    pub(crate) concurrency: usize,
    /// Pause after every this many completed downloads. Zero disables the pause.
    pub(crate) pause_every: usize,
    pub(crate) pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            concurrency: 5,
            pause_every: 0,
            pause: Duration::from_secs(5),
        }
    }
}

/// Cooperative stop flag. Once triggered, no new candidates are accepted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Triggers this flag on the first Ctrl-C.
    pub(crate) fn listen_for_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight downloads...");
                interrupt.trigger();
            }
        });
    }
}

/// Everything a worker needs, shared read-only between workers.
struct EngineContext {
    config: EngineConfig,
    blocklist: Arc<Blocklist>,
    enhancer: Arc<dyn UrlEnhancer>,
    fetcher: Arc<dyn ImageFetcher>,
}

/// Download engine for turning candidates into files
pub(crate) struct DownloadEngine {
    ctx: Arc<EngineContext>,
    semaphore: Arc<Semaphore>,
    interrupt: Interrupt,
}

impl DownloadEngine {
    /// Create a new download engine, creating the download directory if needed.
    pub(crate) fn new(
        config: EngineConfig,
        blocklist: Arc<Blocklist>,
        enhancer: Arc<dyn UrlEnhancer>,
        fetcher: Arc<dyn ImageFetcher>,
        interrupt: Interrupt,
    ) -> DownloadResult<Self> {
        if config.concurrency == 0 {
            return Err(DownloadError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        if !config.download_dir.exists() {
            info!("Creating download folder: {}", config.download_dir.display());
        }
        fs::create_dir_all(&config.download_dir)?;

        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        Ok(Self {
            ctx: Arc::new(EngineContext {
                config,
                blocklist,
                enhancer,
                fetcher,
            }),
            semaphore,
            interrupt,
        })
    }

    /// Opens a batch that candidates can be fed into as they are produced.
    pub(crate) fn start_batch(&self) -> DownloadBatch<'_> {
        DownloadBatch {
            engine: self,
            tasks: JoinSet::new(),
            counters: Arc::new(SummaryCounters::new()),
            reports: Vec::new(),
            submitted: 0,
        }
    }

    /// Downloads every candidate and waits for all of them.
    pub(crate) async fn run<I>(&self, candidates: I) -> BatchResult
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut batch = self.start_batch();
        for candidate in candidates {
            if !batch.submit(candidate).await {
                break;
            }
        }
        batch.finish().await
    }

    /// The full per-candidate pipeline. Never fails; every error becomes an outcome.
    async fn process(ctx: &EngineContext, candidate: &Candidate, index: usize) -> ItemReport {
        let report = |filename: Option<String>, outcome| ItemReport {
            index,
            name: candidate.name.clone(),
            filename,
            outcome,
        };

        if let Some(keyword) = ctx.blocklist.matching_keyword(&candidate.name) {
            return report(
                None,
                DownloadOutcome::Blocked {
                    keyword: keyword.to_string(),
                },
            );
        }

        let target = ResolvedTarget::resolve(
            candidate,
            index,
            &ctx.config.download_dir,
            ctx.enhancer.as_ref(),
        );

        let outcome = match tokio::fs::try_exists(&target.filepath).await {
            Ok(true) => DownloadOutcome::Skipped,
            Ok(false) => Self::download(ctx, &target).await,
            Err(e) => DownloadOutcome::Failed(FailureCause::Io(e.to_string())),
        };

        report(Some(target.filename), outcome)
    }

    /// Fetches the primary URL, then the fallback once if there is one and the failure allows it.
    async fn download(ctx: &EngineContext, target: &ResolvedTarget) -> DownloadOutcome {
        let primary_err = match Self::fetch_into_place(ctx, target, &target.primary_url).await {
            Ok(bytes) => {
                let quality = if target.fallback_url.is_some() {
                    Quality::Enhanced
                } else {
                    Quality::Standard
                };
                return DownloadOutcome::Downloaded { bytes, quality };
            }
            Err(e) => e,
        };

        let Some(fallback) = target.fallback_url.as_deref() else {
            return DownloadOutcome::Failed(primary_err.into());
        };

        if !primary_err.is_retryable() {
            return DownloadOutcome::Failed(primary_err.into());
        }

        debug!(
            "Enhanced URL {} failed ({}), falling back to {}",
            target.primary_url, primary_err, fallback
        );

        match Self::fetch_into_place(ctx, target, fallback).await {
            Ok(bytes) => DownloadOutcome::Downloaded {
                bytes,
                quality: Quality::Standard,
            },
            Err(e) => DownloadOutcome::Failed(e.into()),
        }
    }

    /// One attempt: stream `url` to the partial path and rename it over the final path.
    /// The partial file is removed on any failure, so the final path only ever holds a full body.
    async fn fetch_into_place(
        ctx: &EngineContext,
        target: &ResolvedTarget,
        url: &str,
    ) -> Result<u64, FetchError> {
        let partial = target.partial_path();
        debug!("GET {} -> {}", url, partial.display());

        let result = match ctx.fetcher.fetch_to(url, &partial).await {
            Ok(bytes) => tokio::fs::rename(&partial, &target.filepath)
                .await
                .map(|_| bytes)
                .map_err(FetchError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial file {}: {}", partial.display(), e);
                }
            }
        }

        result
    }
}

/// What a finished batch hands back.
#[derive(Debug, Clone)]
pub(crate) struct BatchResult {
    pub(crate) summary: RunSummary,
    /// One report per submitted candidate, in completion order.
    pub(crate) reports: Vec<ItemReport>,
}

/// An open set of submitted candidates.
///
/// [`submit`](DownloadBatch::submit) waits for a free worker slot, so the producer is throttled to the
/// pace of the downloads rather than queueing the whole listing up front.
pub(crate) struct DownloadBatch<'a> {
    engine: &'a DownloadEngine,
    tasks: JoinSet<ItemReport>,
    counters: Arc<SummaryCounters>,
    reports: Vec<ItemReport>,
    submitted: usize,
}

impl DownloadBatch<'_> {
    /// Hands one candidate to a worker. Returns `false`, without submitting, once interrupted.
    pub(crate) async fn submit(&mut self, candidate: Candidate) -> bool {
        if self.engine.interrupt.is_triggered() {
            return false;
        }

        let permit = match self.engine.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };

        // The wait for a slot may have spanned the interrupt.
        if self.engine.interrupt.is_triggered() {
            return false;
        }

        self.reap_finished();

        self.submitted += 1;
        let index = self.submitted;
        let ctx = self.engine.ctx.clone();
        let counters = self.counters.clone();
        let span = info_span!("candidate", index);

        self.tasks.spawn(
            async move {
                let report = DownloadEngine::process(&ctx, &candidate, index).await;
                let completed = counters.record(&report.outcome);
                log_report(&report);

                if let Some(completed) = completed {
                    let every = ctx.config.pause_every;
                    if every > 0 && completed % every == 0 {
                        info!(
                            "Downloaded {} images, pausing {}s to avoid server blocking...",
                            completed,
                            ctx.config.pause.as_secs_f32()
                        );
                        sleep(ctx.config.pause).await;
                    }
                }

                drop(permit);
                report
            }
            .instrument(span),
        );

        true
    }

    /// Submitted so far.
    pub(crate) fn submitted(&self) -> usize {
        self.submitted
    }

    /// Waits for every in-flight candidate and returns the totals.
    pub(crate) async fn finish(mut self) -> BatchResult {
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined);
        }

        BatchResult {
            summary: self.counters.snapshot(),
            reports: self.reports,
        }
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.collect(joined);
        }
    }

    fn collect(&mut self, joined: Result<ItemReport, tokio::task::JoinError>) {
        match joined {
            Ok(report) => self.reports.push(report),
            Err(e) => {
                // The worker died before recording; count it so the totals still add up.
                error!("Download worker terminated abnormally: {}", e);
                self.counters
                    .record(&DownloadOutcome::Failed(FailureCause::Io(e.to_string())));
            }
        }
    }
}

fn log_report(report: &ItemReport) {
    let filename = report.filename.as_deref().unwrap_or(&report.name);
    match &report.outcome {
        DownloadOutcome::Blocked { keyword } => {
            warn!("Blocked: {} (contains filtered keyword '{}')", report.name, keyword)
        }
        DownloadOutcome::Skipped => info!("Skipping {} (already exists)", filename),
        DownloadOutcome::Downloaded { bytes, quality } => {
            info!("[{}] Downloaded: {} ({} bytes)", quality, filename, bytes)
        }
        DownloadOutcome::Failed(cause) => {
            warn!("Failed to download #{} {}: {}", report.index, report.name, cause)
        }
    }
}
