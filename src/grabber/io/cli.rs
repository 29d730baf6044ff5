use std::path::PathBuf;

use clap::Parser;

use crate::grabber::site::Site;

/// Command line options. Anything given here overrides `config.toml`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "storefront_downloader",
    version,
    about = "Download product images from print-on-demand storefront listings"
)]
pub(crate) struct Args {
    /// Storefront profile to use.
    #[arg(long, value_enum)]
    pub(crate) site: Option<Site>,

    /// First listing page to process.
    #[arg(short = 's', long = "start")]
    pub(crate) start: Option<u32>,

    /// Last listing page to process (inclusive).
    #[arg(short = 'e', long = "end")]
    pub(crate) end: Option<u32>,

    /// Directory images are saved to.
    #[arg(short = 'o', long = "output")]
    pub(crate) output: Option<PathBuf>,

    /// Number of concurrent downloads.
    #[arg(short = 't', long = "threads")]
    pub(crate) threads: Option<usize>,

    /// Download everything, ignoring the keyword blocklist.
    #[arg(long)]
    pub(crate) no_filter: bool,

    /// Keep thumbnail URLs as scraped instead of requesting larger variants.
    #[arg(long)]
    pub(crate) no_enhance: bool,

    /// Keyword blocklist file.
    #[arg(long)]
    pub(crate) keywords: Option<PathBuf>,

    /// Read candidates from a JSON page manifest.
    #[arg(long, conflicts_with = "url")]
    pub(crate) manifest: Option<PathBuf>,

    /// Listing URL template for HTML scraping, with `{page}` where the page number goes.
    #[arg(short = 'u', long)]
    pub(crate) url: Option<String>,

    /// Configuration file.
    #[arg(long, default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_flags() {
        let args = Args::try_parse_from([
            "storefront_downloader",
            "--site",
            "teezily",
            "-s",
            "3",
            "-e",
            "7",
            "-o",
            "out",
            "-t",
            "4",
            "--no-filter",
        ])
        .unwrap();

        assert_eq!(args.site, Some(Site::Teezily));
        assert_eq!(args.start, Some(3));
        assert_eq!(args.end, Some(7));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.threads, Some(4));
        assert!(args.no_filter);
        assert!(!args.no_enhance);
        assert_eq!(args.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_manifest_conflicts_with_url() {
        let result = Args::try_parse_from([
            "storefront_downloader",
            "--manifest",
            "pages.json",
            "--url",
            "https://shop.com/?page={page}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_site_is_rejected() {
        assert!(Args::try_parse_from(["storefront_downloader", "--site", "etsy"]).is_err());
    }
}
