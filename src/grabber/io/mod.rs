//! Configuration loading and resolution.
//!
//! `config.toml` is read into [`AppConfig`], then merged with the command line into the
//! [`Settings`] a run actually uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::grabber::blocklist::DEFAULT_KEYWORDS_FILE;
use crate::grabber::enhance::{compile_policy, RewriteError, RuleConfig};
use crate::grabber::retry::RetryPolicy;
use crate::grabber::site::Site;
use crate::grabber::source::HtmlSelectors;

use self::cli::Args;

pub(crate) mod cli;

/// First page processed when none is given.
const DEFAULT_START_PAGE: u32 = 1;

/// Last page processed when none is given.
const DEFAULT_END_PAGE: u32 = 10;

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid rewrite rule: {0}")]
    Rule(#[from] RewriteError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Paths {
    /// Empty means the site's default folder.
    pub download_directory: String,
    pub keywords_file: String,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Pools {
    /// Zero means the site's default.
    pub max_download_concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Rate {
    pub request_timeout_secs: u64,
    pub page_delay_ms: u64,
    /// Zero means the site's default, which is usually no pause.
    pub pause_every: usize,
    pub pause_ms: u64,
    pub page_retry_attempts: usize,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Filter {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Quality {
    pub enhance: bool,
    /// Replaces the site's built-in rewrite when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub log_level: String,
    pub log_to_file: bool,
    /// "text" or "json"
    pub log_format: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Manifest,
    Html,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Source {
    pub kind: SourceKind,
    pub manifest_path: String,
    pub page_url_template: String,
    pub item_selector: String,
    pub image_selector: String,
    /// Empty means the image's `alt` text.
    pub name_selector: String,
    /// Empty means the site's default, if any.
    pub referer: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub site: Site,
    pub paths: Paths,
    pub pools: Pools,
    pub rate: Rate,
    pub filter: Filter,
    pub quality: Quality,
    pub logging: Logging,
    pub source: Source,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            download_directory: String::new(),
            keywords_file: DEFAULT_KEYWORDS_FILE.to_string(),
            log_directory: "./logs".to_string(),
        }
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            page_delay_ms: 300,
            pause_every: 0,
            pause_ms: 5_000,
            page_retry_attempts: 2,
            retry_backoff_ms: 1_000,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            enhance: true,
            rules: Vec::new(),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: true,
            log_format: "text".to_string(),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Self {
            kind: SourceKind::Manifest,
            manifest_path: "pages.json".to_string(),
            page_url_template: String::new(),
            item_selector: String::new(),
            image_selector: "img".to_string(),
            name_selector: String::new(),
            referer: String::new(),
        }
    }
}

/// Loads `config.toml`.
///
/// A missing file yields the defaults, which are also written out as a starting point.
/// A file that no longer parses is moved aside to `config.toml.backup` and replaced the same way.
pub(crate) fn load_config(config_path: &Path) -> ConfigResult<AppConfig> {
    if !config_path.exists() {
        warn!("Config file not found: {}", config_path.display());
        write_default_config(config_path);
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(config_path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to parse {}: {}", config_path.display(), e);
            info!("Backing up old config and creating new one with default values");

            let backup = config_path.with_extension("toml.backup");
            if let Err(backup_err) = fs::rename(config_path, &backup) {
                warn!("Failed to backup old config: {}", backup_err);
            }

            write_default_config(config_path);
            Ok(AppConfig::default())
        }
    }
}

fn write_default_config(config_path: &Path) {
    let written = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ConfigError::TomlSer(e.to_string()))
        .and_then(|toml_string| Ok(fs::write(config_path, toml_string)?));

    match written {
        Ok(()) => info!("Created {} with default values", config_path.display()),
        Err(e) => warn!("Failed to write default config file: {}", e),
    }
}

/// Where candidates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceSettings {
    Manifest(PathBuf),
    Html {
        url_template: String,
        selectors: HtmlSelectors,
    },
}

/// Everything a run needs, after the command line has been applied over the config file.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) site: Site,
    pub(crate) start_page: u32,
    pub(crate) end_page: u32,
    pub(crate) download_dir: PathBuf,
    /// `None` when filtering is switched off.
    pub(crate) keywords_file: Option<PathBuf>,
    pub(crate) enhance: bool,
    /// Rewrite rules replacing the site's own; empty means use the site's.
    pub(crate) custom_rules: Vec<RuleConfig>,
    pub(crate) concurrency: usize,
    pub(crate) request_timeout: Duration,
    pub(crate) page_delay: Duration,
    pub(crate) pause_every: usize,
    pub(crate) pause: Duration,
    pub(crate) page_retry: RetryPolicy,
    pub(crate) referer: Option<String>,
    pub(crate) source: SourceSettings,
    pub(crate) log_directory: PathBuf,
    pub(crate) logging: Logging,
}

impl Settings {
    /// Applies `args` over `config` and validates the result.
    pub(crate) fn resolve(config: AppConfig, args: &Args) -> ConfigResult<Self> {
        let site = args.site.unwrap_or(config.site);

        let start_page = args.start.unwrap_or(DEFAULT_START_PAGE);
        let end_page = args.end.unwrap_or(DEFAULT_END_PAGE.max(start_page));
        if start_page == 0 {
            return Err(ConfigError::Invalid("pages are numbered from 1".to_string()));
        }
        if start_page > end_page {
            return Err(ConfigError::Invalid(format!(
                "start page {} is after end page {}",
                start_page, end_page
            )));
        }

        let concurrency = match args.threads {
            Some(threads) => threads,
            None if config.pools.max_download_concurrency > 0 => {
                config.pools.max_download_concurrency
            }
            None => site.default_concurrency(),
        };
        if concurrency == 0 {
            return Err(ConfigError::Invalid(
                "download concurrency must be at least 1".to_string(),
            ));
        }

        let download_dir = match &args.output {
            Some(output) => output.clone(),
            None if !config.paths.download_directory.is_empty() => {
                PathBuf::from(&config.paths.download_directory)
            }
            None => PathBuf::from(site.default_output()),
        };

        let keywords_file = (config.filter.enabled && !args.no_filter).then(|| {
            args.keywords
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.paths.keywords_file))
        });

        let (pause_every, pause_ms) = if config.rate.pause_every > 0 {
            (config.rate.pause_every, config.rate.pause_ms)
        } else {
            site.default_pause().unwrap_or((0, config.rate.pause_ms))
        };

        let referer = Some(config.source.referer.clone())
            .filter(|referer| !referer.is_empty())
            .or_else(|| site.default_referer().map(str::to_string));

        let source = Self::resolve_source(&config.source, args)?;
        compile_policy(&config.quality.rules)?;

        Ok(Self {
            site,
            start_page,
            end_page,
            download_dir,
            keywords_file,
            enhance: config.quality.enhance && !args.no_enhance,
            custom_rules: config.quality.rules,
            concurrency,
            request_timeout: Duration::from_secs(config.rate.request_timeout_secs.max(1)),
            page_delay: Duration::from_millis(config.rate.page_delay_ms),
            pause_every,
            pause: Duration::from_millis(pause_ms),
            page_retry: RetryPolicy {
                max_attempts: config.rate.page_retry_attempts,
                base_delay: Duration::from_millis(config.rate.retry_backoff_ms),
                ..Default::default()
            },
            referer,
            source,
            log_directory: PathBuf::from(&config.paths.log_directory),
            logging: config.logging,
        })
    }

    fn resolve_source(source: &Source, args: &Args) -> ConfigResult<SourceSettings> {
        if let Some(manifest) = &args.manifest {
            return Ok(SourceSettings::Manifest(manifest.clone()));
        }

        let kind = if args.url.is_some() {
            SourceKind::Html
        } else {
            source.kind
        };

        match kind {
            SourceKind::Manifest => {
                if source.manifest_path.is_empty() {
                    return Err(ConfigError::Invalid(
                        "source.manifest_path is empty".to_string(),
                    ));
                }
                Ok(SourceSettings::Manifest(PathBuf::from(&source.manifest_path)))
            }
            SourceKind::Html => {
                let url_template = args
                    .url
                    .clone()
                    .unwrap_or_else(|| source.page_url_template.clone());
                if url_template.is_empty() {
                    return Err(ConfigError::Invalid(
                        "HTML source needs a page URL template".to_string(),
                    ));
                }
                if source.item_selector.is_empty() || source.image_selector.is_empty() {
                    return Err(ConfigError::Invalid(
                        "HTML source needs source.item_selector and source.image_selector"
                            .to_string(),
                    ));
                }

                Ok(SourceSettings::Html {
                    url_template,
                    selectors: HtmlSelectors {
                        item: source.item_selector.clone(),
                        image: source.image_selector.clone(),
                        name: Some(source.name_selector.clone()).filter(|name| !name.is_empty()),
                    },
                })
            }
        }
    }
}
