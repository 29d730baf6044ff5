//! Keyword blocklist for product names.
//!
//! This module provides functionality for:
//! 1. Loading blocked keywords from a newline-delimited text file
//! 2. Degrading to a disabled filter when that file is missing
//! 3. Case-insensitive substring matching against candidate names

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

/// Default name of the keyword file, looked up next to the working directory.
pub(crate) const DEFAULT_KEYWORDS_FILE: &str = "keyTm.txt";

/// An immutable set of lower-cased blocked substrings.
///
/// Built once per run and shared read-only between every download worker.
#[derive(Debug, Clone, Default)]
pub(crate) struct Blocklist {
    keywords: Vec<String>,
    enabled: bool,
}

impl Blocklist {
    /// Builds an enabled blocklist from raw keyword text.
    ///
    /// Blank lines and lines starting with `#` are ignored; everything else is trimmed and lower-cased.
    pub(crate) fn parse(content: &str) -> Self {
        let keywords = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();

        Self {
            keywords,
            enabled: true,
        }
    }

    /// A blocklist that never matches.
    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    /// Loads the keyword file at `path`.
    ///
    /// The file is optional tooling configuration: when it is missing or unreadable the filter is
    /// disabled with a warning and the run continues.
    pub(crate) fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => {
                let blocklist = Self::parse(&content);
                info!("Loaded {} blocked keywords from {}", blocklist.len(), path.display());
                blocklist
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} not found, keyword filtering disabled", path.display());
                Self::disabled()
            }
            Err(e) => {
                warn!("Error loading {}: {}. Keyword filtering disabled", path.display(), e);
                Self::disabled()
            }
        }
    }

    /// Returns the first keyword contained in `text`, ignoring case. `None` means not blocked.
    pub(crate) fn matching_keyword(&self, text: &str) -> Option<&str> {
        if !self.is_active() {
            return None;
        }

        let text = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| text.contains(keyword.as_str()))
            .map(String::as_str)
    }

    /// Whether matching can ever return true.
    pub(crate) fn is_active(&self) -> bool {
        self.enabled && !self.keywords.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.keywords.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let blocklist = Blocklist::parse("# trademarks\n\nDisney\n   \n  Marvel  \n#nike\n");

        assert_eq!(blocklist.len(), 2);
        assert!(blocklist.matching_keyword("disney princess tee").is_some());
        assert!(blocklist.matching_keyword("MARVEL hero").is_some());
        assert!(!blocklist.matching_keyword("nike swoosh").is_some());
    }

    #[test]
    fn test_matching_is_case_insensitive_substring() {
        let blocklist = Blocklist::parse("racist\nlogo");

        assert_eq!(blocklist.matching_keyword("Racist Logo"), Some("racist"));
        assert_eq!(blocklist.matching_keyword("Band LOGOS"), Some("logo"));
        assert_eq!(blocklist.matching_keyword("Vintage Tee"), None);
    }

    #[test]
    fn test_disabled_never_blocks() {
        let blocklist = Blocklist::disabled();
        assert!(!blocklist.is_active());
        assert!(!blocklist.matching_keyword("anything at all").is_some());

        let empty = Blocklist::parse("# only comments\n");
        assert!(!empty.is_active());
        assert!(!empty.matching_keyword("anything").is_some());
    }

    #[test]
    fn test_load_missing_file_disables_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let blocklist = Blocklist::load(&dir.path().join("keyTm.txt"));

        assert!(!blocklist.is_active());
        assert_eq!(blocklist.len(), 0);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyTm.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# blocked words").unwrap();
        writeln!(file, "Harry Potter").unwrap();
        drop(file);

        let blocklist = Blocklist::load(&path);
        assert!(blocklist.is_active());
        assert!(blocklist.matching_keyword("harry potter wand shirt").is_some());
    }
}
