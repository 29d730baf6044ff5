use std::fmt;

use crate::grabber::fetcher::FetchError;

/// Whether the stored image came from the rewritten URL or the original one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quality {
    Standard,
    Enhanced,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Standard => write!(f, "STD"),
            Quality::Enhanced => write!(f, "HQ"),
        }
    }
}

/// Why a candidate could not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureCause {
    /// Timeout, connection reset, DNS failure, malformed URL.
    Network(String),
    /// Non-2xx response.
    Http(u16),
    /// Local disk failure while writing or renaming.
    Io(String),
}

impl From<FetchError> for FailureCause {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Network(message) => FailureCause::Network(message),
            FetchError::Status(code) => FailureCause::Http(code),
            FetchError::Io(e) => FailureCause::Io(e.to_string()),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Network(message) => write!(f, "network error: {}", message),
            FailureCause::Http(code) => write!(f, "HTTP {}", code),
            FailureCause::Io(message) => write!(f, "IO error: {}", message),
        }
    }
}

/// What happened to one candidate. Produced exactly once per candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DownloadOutcome {
    /// A file was already present at the resolved path.
    Skipped,
    /// The name contained a blocked keyword; nothing was fetched.
    Blocked { keyword: String },
    Downloaded { bytes: u64, quality: Quality },
    Failed(FailureCause),
}

/// A finished candidate as reported back from its worker.
#[derive(Debug, Clone)]
pub(crate) struct ItemReport {
    /// 1-based submission index.
    pub(crate) index: usize,
    pub(crate) name: String,
    /// Resolved filename; `None` for blocked candidates, which are never resolved.
    pub(crate) filename: Option<String>,
    pub(crate) outcome: DownloadOutcome,
}
