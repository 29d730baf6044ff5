//! Per-storefront profiles.
//!
//! Each storefront differs only in how its thumbnail URLs can be upgraded, where its images land by
//! default and how hard it can be hit. Everything else goes through the shared engine.

use std::fmt;

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::grabber::enhance::{RewritePolicy, RewriteRule};

static EBAY_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"s-l\d+").unwrap());
static TOSTADORA_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r";w:\d+").unwrap());
static TOSTADORA_MODE: Lazy<Regex> = Lazy::new(|| Regex::new(r";m:\d+").unwrap());

/// Storefronts with a built-in profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    #[default]
    Colamaga,
    Ebay,
    Mazezy,
    Onloan,
    Redbubble,
    Teepublic,
    Teeshirtpalace,
    Teezily,
    Tostadora,
}

impl Site {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Site::Colamaga => "colamaga",
            Site::Ebay => "ebay",
            Site::Mazezy => "mazezy",
            Site::Onloan => "onloan",
            Site::Redbubble => "redbubble",
            Site::Teepublic => "teepublic",
            Site::Teeshirtpalace => "teeshirtpalace",
            Site::Teezily => "teezily",
            Site::Tostadora => "tostadora",
        }
    }

    /// Folder images are saved to when none is configured.
    pub(crate) fn default_output(&self) -> &'static str {
        match self {
            Site::Colamaga => "colamaga_images",
            Site::Onloan => "onloan_images",
            Site::Teeshirtpalace => "teeshirt_images",
            other => other.name(),
        }
    }

    /// Download worker count when none is configured.
    pub(crate) fn default_concurrency(&self) -> usize {
        match self {
            Site::Onloan => 8,
            Site::Teezily => 10,
            _ => 5,
        }
    }

    /// `(every, pause_ms)` courtesy pause between completed downloads, if the site needs one.
    pub(crate) fn default_pause(&self) -> Option<(usize, u64)> {
        match self {
            Site::Teezily => Some((10, 5_000)),
            _ => None,
        }
    }

    /// Referer sent with every request when none is configured. Redbubble's CDN refuses hotlinks.
    pub(crate) fn default_referer(&self) -> Option<&'static str> {
        match self {
            Site::Redbubble => Some("https://www.redbubble.com/"),
            _ => None,
        }
    }

    /// The thumbnail-to-full-size rewrite for this storefront.
    pub(crate) fn rewrite_policy(&self) -> RewritePolicy {
        match self {
            Site::Colamaga | Site::Redbubble | Site::Teepublic => RewritePolicy::identity(),
            Site::Ebay => RewritePolicy::new(vec![Self::pattern(&EBAY_SIZE, "s-l2000")]),
            Site::Mazezy => RewritePolicy::new(vec![RewriteRule::literal("336x336", "3000x3000")]),
            Site::Onloan => RewritePolicy::new(vec![RewriteRule::FirstOf(vec![
                RewriteRule::literal("-300x300.", "-600x600."),
                RewriteRule::InsertBeforeExtension {
                    token: "-600x600".to_string(),
                    unless_contains: "600x600".to_string(),
                },
            ])]),
            Site::Teeshirtpalace => RewritePolicy::new(vec![
                RewriteRule::literal("-front", "-swatch"),
                RewriteRule::literal("width=400", "width=1500"),
                RewriteRule::literal("width=700", "width=1500"),
            ]),
            Site::Teezily => {
                RewritePolicy::new(vec![RewriteRule::literal("/195/195/", "/2000/2000/")])
            }
            Site::Tostadora => RewritePolicy::new(vec![
                Self::pattern(&TOSTADORA_WIDTH, ";w:1000"),
                Self::pattern(&TOSTADORA_MODE, ";m:0"),
            ]),
        }
    }

    fn pattern(regex: &Lazy<Regex>, replacement: &str) -> RewriteRule {
        RewriteRule::Pattern {
            regex: Regex::clone(regex),
            replacement: replacement.to_string(),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
