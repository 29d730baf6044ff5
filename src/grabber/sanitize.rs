//! Filename sanitization for scraped product names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest stem we will produce, in bytes. Leaves room for an extension on every common filesystem.
const MAX_STEM_LEN: usize = 200;

/// Everything that is not an ASCII word character, whitespace, a dot or a hyphen.
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\s.\-]").unwrap());

/// Runs of whitespace and hyphens.
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").unwrap());

/// Turns a product name into a filesystem-safe file stem.
///
/// Drops every character outside `[A-Za-z0-9_ .-]`, collapses whitespace and hyphen runs into a
/// single hyphen and trims hyphens from both ends. The result is a pure function of the input, which
/// the existence check in the download engine relies on across runs.
pub(crate) fn sanitize(name: &str) -> String {
    let stripped = DISALLOWED.replace_all(name, "");
    let collapsed = SEPARATORS.replace_all(&stripped, "-");
    let mut stem = collapsed.trim_matches('-').to_string();

    if stem.len() > MAX_STEM_LEN {
        // Only ASCII survives the first pass, so any byte index is a char boundary.
        stem.truncate(MAX_STEM_LEN);
        stem = stem.trim_end_matches('-').to_string();
    }

    stem
}

/// Whether a sanitized stem is usable as a filename on its own.
///
/// Stems made only of dots and underscores (or nothing at all) would collide or resolve to special
/// directory entries, so callers fall back to a positional name instead.
pub(crate) fn is_usable_stem(stem: &str) -> bool {
    stem.chars().any(|c| c.is_ascii_alphanumeric())
}

/// Returns the sanitized stem for `name`, or `image-<index>` when nothing usable is left.
pub(crate) fn stem_or_placeholder(name: &str, index: usize) -> String {
    let stem = sanitize(name);
    if is_usable_stem(&stem) {
        stem
    } else {
        format!("image-{}", index)
    }
}
