//! Page Sources
//!
//! A page source turns one listing page number into the candidates found on it.
//! Two are provided:
//! 1. `ManifestPageSource` reads pages already extracted by an external browser session
//! 2. `HtmlPageSource` fetches server-rendered listing pages and applies CSS selectors

use std::fs;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::grabber::candidate::Candidate;

/// Placeholder substituted with the page number in listing URL templates.
pub(crate) const PAGE_PLACEHOLDER: &str = "{page}";

/// Error types for page loading
#[derive(Error, Debug)]
pub enum PageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Manifest parse error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("URL template must contain {{page}}: {0}")]
    Template(String),
}

/// Result type for page loading
pub type PageResult<T> = Result<T, PageError>;

/// Produces the candidates of one listing page.
///
/// An empty vector is a valid answer (past the last page, or nothing rendered).
/// An error means the page could not be loaded and may be retried.
#[async_trait]
pub(crate) trait PageSource: Send + Sync {
    async fn candidates(&self, page: u32) -> PageResult<Vec<Candidate>>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    pages: Vec<Vec<Candidate>>,
}

/// Candidates handed over as JSON: `{"pages": [[{"name": .., "url": ..}, ..], ..]}`.
/// Page `n` is the `n - 1`th entry.
#[derive(Debug, Clone)]
pub(crate) struct ManifestPageSource {
    pages: Vec<Vec<Candidate>>,
}

impl ManifestPageSource {
    pub(crate) fn open(path: &Path) -> PageResult<Self> {
        let content = fs::read_to_string(path)?;
        let source = Self::from_json(&content)?;
        info!(
            "Loaded manifest {} with {} pages",
            path.display(),
            source.pages.len()
        );
        Ok(source)
    }

    pub(crate) fn from_json(content: &str) -> PageResult<Self> {
        let manifest: Manifest = serde_json::from_str(content)?;
        Ok(Self {
            pages: manifest.pages,
        })
    }
}

#[async_trait]
impl PageSource for ManifestPageSource {
    async fn candidates(&self, page: u32) -> PageResult<Vec<Candidate>> {
        let index = (page as usize).checked_sub(1);
        Ok(index
            .and_then(|i| self.pages.get(i))
            .cloned()
            .unwrap_or_default())
    }
}

/// CSS selectors locating products on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HtmlSelectors {
    /// One match per product.
    pub(crate) item: String,
    /// Image element within a product.
    pub(crate) image: String,
    /// Title element within a product. Falls back to the image's `alt` when unset.
    pub(crate) name: Option<String>,
}

/// Scrapes server-rendered listing pages over plain HTTP.
pub(crate) struct HtmlPageSource {
    client: Client,
    url_template: String,
    selectors: HtmlSelectors,
}

impl HtmlPageSource {
    pub(crate) fn new(
        client: Client,
        url_template: impl Into<String>,
        selectors: HtmlSelectors,
    ) -> PageResult<Self> {
        let url_template = url_template.into();
        if !url_template.contains(PAGE_PLACEHOLDER) {
            return Err(PageError::Template(url_template));
        }
        Url::parse(&url_template.replace(PAGE_PLACEHOLDER, "1"))?;

        for selector in [Some(&selectors.item), Some(&selectors.image), selectors.name.as_ref()]
            .into_iter()
            .flatten()
        {
            parse_selector(selector)?;
        }

        Ok(Self {
            client,
            url_template,
            selectors,
        })
    }

    pub(crate) fn page_url(&self, page: u32) -> PageResult<Url> {
        Ok(Url::parse(
            &self.url_template.replace(PAGE_PLACEHOLDER, &page.to_string()),
        )?)
    }
}

#[async_trait]
impl PageSource for HtmlPageSource {
    async fn candidates(&self, page: u32) -> PageResult<Vec<Candidate>> {
        let url = self.page_url(page)?;
        debug!("Loading listing page {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        extract_candidates(&body, &url, &self.selectors)
    }
}

fn parse_selector(selector: &str) -> PageResult<Selector> {
    Selector::parse(selector).map_err(|e| PageError::Selector(format!("{}: {}", selector, e)))
}

/// Pulls `(name, url)` pairs out of a listing page. Products without a usable image URL or
/// name are left out.
pub(crate) fn extract_candidates(
    body: &str,
    page_url: &Url,
    selectors: &HtmlSelectors,
) -> PageResult<Vec<Candidate>> {
    let item_selector = parse_selector(&selectors.item)?;
    let image_selector = parse_selector(&selectors.image)?;
    let name_selector = selectors.name.as_deref().map(parse_selector).transpose()?;

    let document = Html::parse_document(body);
    let mut candidates = Vec::new();

    for (position, item) in document.select(&item_selector).enumerate() {
        let Some(image) = item.select(&image_selector).next() else {
            debug!("Item {} has no image element", position + 1);
            continue;
        };

        let Some(raw_url) = image_source(image) else {
            debug!("Item {} has no image URL", position + 1);
            continue;
        };

        let url = match page_url.join(raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Item {} has an unusable image URL {}: {}", position + 1, raw_url, e);
                continue;
            }
        };

        let name = match &name_selector {
            Some(selector) => item.select(selector).next().map(element_text),
            None => image.value().attr("alt").map(|alt| alt.trim().to_string()),
        };

        match name {
            Some(name) if !name.is_empty() => {
                candidates.push(Candidate::new(name, url.to_string()));
            }
            _ => debug!("Item {} has no name", position + 1),
        }
    }

    Ok(candidates)
}

/// `src`, unless it is missing or an inline placeholder, in which case the lazy-load `data-src`.
fn image_source<'a>(image: ElementRef<'a>) -> Option<&'a str> {
    let element = image.value();
    let usable = |value: &&str| !value.trim().is_empty() && !value.starts_with("data:");

    element
        .attr("src")
        .filter(usable)
        .or_else(|| element.attr("data-src").filter(usable))
        .map(str::trim)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"
        <html><body>
          <div class="product">
            <img class="thumb" src="/media/a-300x300.jpg" alt="Alt A">
            <h2 class="title"> Vintage <b>Tee</b> </h2>
          </div>
          <div class="product">
            <img class="thumb" src="data:image/gif;base64,R0lGOD" data-src="//cdn.shop.com/b.png" alt="Alt B">
            <h2 class="title">Retro Hoodie</h2>
          </div>
          <div class="product">
            <img class="thumb" alt="No url">
            <h2 class="title">Broken</h2>
          </div>
          <div class="product">
            <img class="thumb" src="https://img.shop.com/c.jpg">
          </div>
        </body></html>
    "#;

    fn selectors(name: Option<&str>) -> HtmlSelectors {
        HtmlSelectors {
            item: "div.product".to_string(),
            image: "img.thumb".to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_extract_with_name_selector() {
        let page = Url::parse("https://shop.com/list?page=1").unwrap();
        let candidates = extract_candidates(LISTING, &page, &selectors(Some("h2.title"))).unwrap();

        assert_eq!(
            candidates,
            vec![
                Candidate::new("Vintage Tee", "https://shop.com/media/a-300x300.jpg"),
                Candidate::new("Retro Hoodie", "https://cdn.shop.com/b.png"),
            ]
        );
    }

    #[test]
    fn test_extract_falls_back_to_alt() {
        let page = Url::parse("https://shop.com/list?page=1").unwrap();
        let candidates = extract_candidates(LISTING, &page, &selectors(None)).unwrap();

        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alt A", "Alt B"]);
    }

    #[test]
    fn test_extract_empty_page() {
        let page = Url::parse("https://shop.com/list?page=99").unwrap();
        let candidates =
            extract_candidates("<html><body><p>No results</p></body></html>", &page, &selectors(None))
                .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        let client = Client::new();

        let missing_placeholder =
            HtmlPageSource::new(client.clone(), "https://shop.com/list", selectors(None));
        assert!(matches!(missing_placeholder, Err(PageError::Template(_))));

        let bad_selector = HtmlPageSource::new(
            client,
            "https://shop.com/list?page={page}",
            HtmlSelectors {
                item: "div[".to_string(),
                image: "img".to_string(),
                name: None,
            },
        );
        assert!(matches!(bad_selector, Err(PageError::Selector(_))));
    }

    #[test]
    fn test_page_url() {
        let source = HtmlPageSource::new(
            Client::new(),
            "https://shop.com/shop/page/{page}/?orderby=date",
            selectors(None),
        )
        .unwrap();

        assert_eq!(
            source.page_url(3).unwrap().as_str(),
            "https://shop.com/shop/page/3/?orderby=date"
        );
    }

    #[tokio::test]
    async fn test_manifest_pages() {
        let source = ManifestPageSource::from_json(
            r#"{"pages": [
                [{"name": "Vintage Tee", "url": "http://x/a-300x300.jpg"}],
                [],
                [{"name": "One", "url": "http://x/1.jpg"}, {"name": "Two", "url": "http://x/2.jpg"}]
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            source.candidates(1).await.unwrap(),
            vec![Candidate::new("Vintage Tee", "http://x/a-300x300.jpg")]
        );
        assert!(source.candidates(2).await.unwrap().is_empty());
        assert_eq!(source.candidates(3).await.unwrap().len(), 2);
        assert!(source.candidates(4).await.unwrap().is_empty());
        assert!(source.candidates(0).await.unwrap().is_empty());
    }

    #[test]
    fn test_manifest_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        fs::write(&path, r#"{"pages": [[{"name": "A", "url": "http://x/a.jpg"}]]}"#).unwrap();

        assert!(ManifestPageSource::open(&path).is_ok());
        assert!(matches!(
            ManifestPageSource::open(&dir.path().join("missing.json")),
            Err(PageError::Io(_))
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ManifestPageSource::open(&path),
            Err(PageError::Manifest(_))
        ));
    }

    async fn listing_server(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", "2"))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    fn html_source(server: &MockServer) -> HtmlPageSource {
        HtmlPageSource::new(
            Client::new(),
            format!("{}/list?page={{page}}", server.uri()),
            selectors(Some("h2.title")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_html_source_scrapes_served_page() {
        let server = listing_server(
            ResponseTemplate::new(200).set_body_raw(LISTING, "text/html; charset=utf-8"),
        )
        .await;

        let candidates = html_source(&server).candidates(2).await.unwrap();

        assert_eq!(
            candidates,
            vec![
                Candidate::new(
                    "Vintage Tee",
                    format!("{}/media/a-300x300.jpg", server.uri())
                ),
                Candidate::new("Retro Hoodie", "https://cdn.shop.com/b.png"),
            ]
        );
    }

    #[tokio::test]
    async fn test_html_source_reports_page_status() {
        let server = listing_server(ResponseTemplate::new(503)).await;

        let result = html_source(&server).candidates(2).await;

        assert!(matches!(result, Err(PageError::Status(503))));
    }

    #[tokio::test]
    async fn test_html_source_missing_page_is_not_found() {
        let server = listing_server(ResponseTemplate::new(200).set_body_string(LISTING)).await;

        let result = html_source(&server).candidates(7).await;

        assert!(matches!(result, Err(PageError::Status(404))));
    }
}
