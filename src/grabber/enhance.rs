//! URL quality enhancement.
//!
//! Storefronts serve thumbnails whose URLs embed a size token (`-300x300.`, `s-l500`, `;w:400`).
//! A rewrite policy swaps that token for a larger one. The original URL is always kept as the
//! fallback so a missing high-resolution variant never costs us the image.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for building rewrite rules
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Rule '{0}' has nothing to do")]
    EmptyRule(String),
}

/// Result type for rewrite rule construction
pub type RewriteResult<T> = Result<T, RewriteError>;

/// The pair of URLs a candidate is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EnhancedUrl {
    /// Tried first. Equal to `fallback` when the rewrite did not apply.
    pub(crate) primary: String,
    /// The untouched original URL.
    pub(crate) fallback: String,
}

impl EnhancedUrl {
    pub(crate) fn unchanged(url: &str) -> Self {
        Self {
            primary: url.to_string(),
            fallback: url.to_string(),
        }
    }

    /// True when the primary URL differs from the original, i.e. a fallback attempt is meaningful.
    pub(crate) fn is_enhanced(&self) -> bool {
        self.primary != self.fallback
    }
}

/// A pure, site-specific URL rewrite.
pub(crate) trait UrlEnhancer: Send + Sync {
    fn enhance(&self, url: &str) -> EnhancedUrl;
}

/// One rewrite step.
#[derive(Debug, Clone)]
pub(crate) enum RewriteRule {
    /// Replace every occurrence of a literal substring.
    Literal { from: String, to: String },
    /// Replace every match of a regular expression.
    Pattern { regex: Regex, replacement: String },
    /// Insert `token` before the file extension of the last path segment,
    /// unless the URL already contains `unless_contains`.
    InsertBeforeExtension {
        token: String,
        unless_contains: String,
    },
    /// Apply the first sub-rule that changes the URL.
    FirstOf(Vec<RewriteRule>),
}

impl RewriteRule {
    pub(crate) fn literal(from: &str, to: &str) -> Self {
        Self::Literal {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub(crate) fn pattern(pattern: &str, replacement: &str) -> RewriteResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| RewriteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self::Pattern {
            regex,
            replacement: replacement.to_string(),
        })
    }

    pub(crate) fn apply(&self, url: &str) -> String {
        match self {
            RewriteRule::Literal { from, to } => url.replace(from.as_str(), to),
            RewriteRule::Pattern { regex, replacement } => {
                regex.replace_all(url, replacement.as_str()).into_owned()
            }
            RewriteRule::InsertBeforeExtension {
                token,
                unless_contains,
            } => {
                if !unless_contains.is_empty() && url.contains(unless_contains.as_str()) {
                    return url.to_string();
                }
                insert_before_extension(url, token).unwrap_or_else(|| url.to_string())
            }
            RewriteRule::FirstOf(rules) => rules
                .iter()
                .map(|rule| rule.apply(url))
                .find(|rewritten| rewritten != url)
                .unwrap_or_else(|| url.to_string()),
        }
    }
}

/// Inserts `token` right before the extension of the last path segment.
///
/// Returns `None` when that segment has no extension. The query string and fragment are left alone.
fn insert_before_extension(url: &str, token: &str) -> Option<String> {
    let path_end = url.find(['?', '#']).unwrap_or(url.len());
    let (path, rest) = url.split_at(path_end);
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = path[segment_start..].rfind('.')? + segment_start;

    if dot == segment_start {
        // Dotfile, no stem to extend.
        return None;
    }

    Some(format!("{}{}{}{}", &path[..dot], token, &path[dot..], rest))
}

/// An ordered list of rewrite steps, each applied to the output of the previous one.
///
/// An empty policy is the identity.
#[derive(Debug, Clone, Default)]
pub(crate) struct RewritePolicy {
    rules: Vec<RewriteRule>,
}

impl RewritePolicy {
    pub(crate) fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    pub(crate) fn identity() -> Self {
        Self::default()
    }

    pub(crate) fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }
}

impl UrlEnhancer for RewritePolicy {
    fn enhance(&self, url: &str) -> EnhancedUrl {
        if self.is_identity() {
            return EnhancedUrl::unchanged(url);
        }

        let primary = self
            .rules
            .iter()
            .fold(url.to_string(), |current, rule| rule.apply(&current));

        EnhancedUrl {
            primary,
            fallback: url.to_string(),
        }
    }
}

/// Rewrite rules as written in `config.toml`.
///
/// ```toml
/// [[quality.rules]]
/// kind = "literal"
/// from = "300x300"
/// to = "600x600"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    Literal {
        from: String,
        to: String,
    },
    Pattern {
        pattern: String,
        replacement: String,
    },
    InsertBeforeExtension {
        token: String,
        #[serde(default)]
        unless_contains: String,
    },
    FirstOf {
        rules: Vec<RuleConfig>,
    },
}

impl RuleConfig {
    /// Compiles the configured rule, validating any regular expressions.
    pub(crate) fn compile(&self) -> RewriteResult<RewriteRule> {
        match self {
            RuleConfig::Literal { from, to } => {
                if from.is_empty() {
                    return Err(RewriteError::EmptyRule("literal".to_string()));
                }
                Ok(RewriteRule::literal(from, to))
            }
            RuleConfig::Pattern {
                pattern,
                replacement,
            } => RewriteRule::pattern(pattern, replacement),
            RuleConfig::InsertBeforeExtension {
                token,
                unless_contains,
            } => {
                if token.is_empty() {
                    return Err(RewriteError::EmptyRule("insert_before_extension".to_string()));
                }
                Ok(RewriteRule::InsertBeforeExtension {
                    token: token.clone(),
                    unless_contains: unless_contains.clone(),
                })
            }
            RuleConfig::FirstOf { rules } => {
                if rules.is_empty() {
                    return Err(RewriteError::EmptyRule("first_of".to_string()));
                }
                let compiled = rules
                    .iter()
                    .map(RuleConfig::compile)
                    .collect::<RewriteResult<Vec<_>>>()?;
                Ok(RewriteRule::FirstOf(compiled))
            }
        }
    }
}

/// Compiles a list of configured rules into a policy.
pub(crate) fn compile_policy(rules: &[RuleConfig]) -> RewriteResult<RewritePolicy> {
    let compiled = rules
        .iter()
        .map(RuleConfig::compile)
        .collect::<RewriteResult<Vec<_>>>()?;
    Ok(RewritePolicy::new(compiled))
}
