use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::grabber::enhance::UrlEnhancer;
use crate::grabber::sanitize::stem_or_placeholder;

/// Extension used when the image URL does not carry one.
const DEFAULT_EXTENSION: &str = ".jpg";

/// A product image proposed for download, as scraped from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Candidate {
    /// Product title. Not guaranteed to be unique.
    pub(crate) name: String,
    /// Absolute or scheme-relative image URL.
    pub(crate) url: String,
}

impl Candidate {
    pub(crate) fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Where a candidate will be written and which URLs it will be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedTarget {
    pub(crate) filename: String,
    pub(crate) filepath: PathBuf,
    pub(crate) primary_url: String,
    /// Present only when it differs from `primary_url`.
    pub(crate) fallback_url: Option<String>,
}

impl ResolvedTarget {
    /// Resolves `candidate` against the destination directory and the enhancement policy.
    ///
    /// `index` is the candidate's 1-based position in the run, used to name images whose title
    /// sanitizes to nothing.
    pub(crate) fn resolve(
        candidate: &Candidate,
        index: usize,
        download_dir: &Path,
        enhancer: &dyn UrlEnhancer,
    ) -> Self {
        let url = normalize_url(&candidate.url);
        let filename = format!(
            "{}{}",
            stem_or_placeholder(&candidate.name, index),
            extension_of(&url)
        );
        let enhanced = enhancer.enhance(&url);
        let fallback_url = enhanced.is_enhanced().then(|| enhanced.fallback.clone());

        Self {
            filepath: download_dir.join(&filename),
            filename,
            primary_url: enhanced.primary,
            fallback_url,
        }
    }

    /// A fresh in-progress path for one fetch attempt, renamed into place on success.
    ///
    /// Each call yields a different path, so concurrent attempts at the same filename never share
    /// a partial file.
    pub(crate) fn partial_path(&self) -> PathBuf {
        let partial = format!(".{}.{}.part", self.filename, Uuid::new_v4().simple());
        match self.filepath.parent() {
            Some(parent) => parent.join(partial),
            None => PathBuf::from(partial),
        }
    }
}

/// Makes scheme-relative URLs (`//cdn.example.com/a.jpg`) absolute.
pub(crate) fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

/// The extension of the URL's last path segment including the dot, or `.jpg`.
///
/// Taken from the original URL rather than the enhanced one, so the filename, and with it the
/// skip-if-exists check, does not depend on whether enhancement is switched on.
pub(crate) fn extension_of(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_EXTENSION.to_string();
    };

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    match Path::new(segment).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext)
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::enhance::{RewritePolicy, RewriteRule};

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("http://x/a-300x300.jpg"), ".jpg");
        assert_eq!(extension_of("https://x/img/shirt.PNG?v=2"), ".PNG");
        assert_eq!(extension_of("https://x/img/shirt.webp#frag"), ".webp");
        assert_eq!(extension_of("https://x/img/shirt"), ".jpg");
        assert_eq!(extension_of("https://x/"), ".jpg");
        assert_eq!(extension_of("not a url"), ".jpg");
        assert_eq!(extension_of("https://i/x;w:300;m:1.jpeg"), ".jpeg");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("//cdn.shop.com/a.jpg"), "https://cdn.shop.com/a.jpg");
        assert_eq!(normalize_url(" https://cdn.shop.com/a.jpg "), "https://cdn.shop.com/a.jpg");
    }

    #[test]
    fn test_resolve_with_enhancement() {
        let policy = RewritePolicy::new(vec![RewriteRule::literal("300x300", "600x600")]);
        let candidate = Candidate::new("Vintage Tee", "http://x/a-300x300.jpg");

        let target = ResolvedTarget::resolve(&candidate, 1, Path::new("/tmp/out"), &policy);

        assert_eq!(target.filename, "Vintage-Tee.jpg");
        assert_eq!(target.filepath, Path::new("/tmp/out/Vintage-Tee.jpg"));
        assert_eq!(target.primary_url, "http://x/a-600x600.jpg");
        assert_eq!(target.fallback_url.as_deref(), Some("http://x/a-300x300.jpg"));

        let partial = target.partial_path();
        assert_eq!(partial.parent(), Some(Path::new("/tmp/out")));
        let name = partial.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".Vintage-Tee.jpg."));
        assert!(name.ends_with(".part"));
    }

    #[test]
    fn test_partial_paths_are_unique_per_attempt() {
        let candidate = Candidate::new("Classic Tee", "http://x/a.jpg");
        let target =
            ResolvedTarget::resolve(&candidate, 1, Path::new("out"), &RewritePolicy::identity());

        assert_ne!(target.partial_path(), target.partial_path());
    }

    #[test]
    fn test_resolve_without_enhancement_has_no_fallback() {
        let candidate = Candidate::new("Plain", "//cdn/b.png");
        let target =
            ResolvedTarget::resolve(&candidate, 4, Path::new("out"), &RewritePolicy::identity());

        assert_eq!(target.filename, "Plain.png");
        assert_eq!(target.primary_url, "https://cdn/b.png");
        assert_eq!(target.fallback_url, None);
    }

    #[test]
    fn test_resolve_uses_placeholder_for_punctuation_names() {
        let candidate = Candidate::new("???", "https://cdn/c.gif");
        let target =
            ResolvedTarget::resolve(&candidate, 12, Path::new("out"), &RewritePolicy::identity());

        assert_eq!(target.filename, "image-12.gif");
    }
}
