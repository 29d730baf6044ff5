use std::env::current_dir;
use std::sync::Arc;

use anyhow::{Context, Error};
use console::Term;
use tracing::{info, info_span, trace, Instrument};
use uuid::Uuid;

use crate::grabber::blocklist::Blocklist;
use crate::grabber::engine::{DownloadEngine, EngineConfig, Interrupt};
use crate::grabber::enhance::{compile_policy, RewritePolicy, UrlEnhancer};
use crate::grabber::fetcher::{build_client, HttpFetcher, HttpSettings, BROWSER_USER_AGENT};
use crate::grabber::io::{Settings, SourceSettings};
use crate::grabber::orchestrator::{Orchestrator, PageRange};
use crate::grabber::source::{HtmlPageSource, ManifestPageSource, PageSource};
use crate::grabber::summary::RunReport;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// A program class that wires the resolved settings into a download run.
pub(crate) struct Program {
    settings: Settings,
    interrupt: Interrupt,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new(settings: Settings, interrupt: Interrupt) -> Self {
        Self {
            settings,
            interrupt,
        }
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<RunReport, Error> {
        Term::stdout().set_title(format!("{} - {}", NAME, self.settings.site));
        trace!("Starting {}...", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        let working_dir = current_dir().context("Failed to get working directory")?;
        trace!("Program Working Directory: {}", working_dir.display());

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, site = %self.settings.site);

        async {
            let report = self.download().await?;
            report.print(&self.settings.download_dir);
            Ok::<_, Error>(report)
        }
        .instrument(span)
        .await
    }

    async fn download(&self) -> Result<RunReport, Error> {
        let settings = &self.settings;

        info!(
            "Downloading {} pages {}-{} into {} with {} workers",
            settings.site,
            settings.start_page,
            settings.end_page,
            settings.download_dir.display(),
            settings.concurrency
        );

        let blocklist = match &settings.keywords_file {
            Some(path) => Blocklist::load(path),
            None => {
                info!("Keyword filtering disabled");
                Blocklist::disabled()
            }
        };

        let enhancer = self.enhancer()?;

        let client = build_client(&HttpSettings {
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: settings.request_timeout,
            referer: settings.referer.clone(),
            ..Default::default()
        })?;

        let source: Box<dyn PageSource> = match &settings.source {
            SourceSettings::Manifest(path) => Box::new(
                ManifestPageSource::open(path)
                    .with_context(|| format!("Failed to open manifest {}", path.display()))?,
            ),
            SourceSettings::Html {
                url_template,
                selectors,
            } => Box::new(HtmlPageSource::new(
                client.clone(),
                url_template.clone(),
                selectors.clone(),
            )?),
        };

        let engine = DownloadEngine::new(
            EngineConfig {
                download_dir: settings.download_dir.clone(),
                concurrency: settings.concurrency,
                pause_every: settings.pause_every,
                pause: settings.pause,
            },
            Arc::new(blocklist),
            enhancer,
            Arc::new(HttpFetcher::with_client(client)),
            self.interrupt.clone(),
        )?;

        let orchestrator = Orchestrator::new(
            &engine,
            source.as_ref(),
            settings.page_retry,
            settings.page_delay,
            self.interrupt.clone(),
        );

        Ok(orchestrator
            .run(PageRange {
                start: settings.start_page,
                end: settings.end_page,
            })
            .await)
    }

    /// Custom rules from the config win over the site's built-in rewrite.
    fn enhancer(&self) -> Result<Arc<dyn UrlEnhancer>, Error> {
        let settings = &self.settings;
        let policy = if !settings.enhance {
            info!("Image quality enhancement disabled");
            RewritePolicy::identity()
        } else if !settings.custom_rules.is_empty() {
            info!("Using {} configured rewrite rules", settings.custom_rules.len());
            compile_policy(&settings.custom_rules)?
        } else {
            settings.site.rewrite_policy()
        };

        Ok(Arc::new(policy))
    }
}
