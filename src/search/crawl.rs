//! Bounded breadth-first crawl of context pages for additional images.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::SearchError;
use crate::config::CrawlLimits;
use crate::models::SearchHit;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Same-host BFS crawler harvesting `<img>` sources.
pub struct DeepCrawler {
    client: Client,
    limits: CrawlLimits,
}

/// Links extracted from one page.
#[derive(Debug, Default, PartialEq)]
struct PageLinks {
    /// Absolute image URLs, `data:` sources excluded.
    images: Vec<String>,
    /// Absolute http(s) anchor targets, fragments stripped.
    pages: Vec<Url>,
}

impl DeepCrawler {
    pub fn new(limits: CrawlLimits) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client, limits })
    }

    /// Walk same-host pages reachable from `seed`, collecting image URLs.
    ///
    /// Fetch failures skip the page. The frontier never revisits a URL and
    /// is bounded by the configured page and depth caps.
    pub async fn harvest(&self, seed: &str) -> Vec<SearchHit> {
        let Ok(seed_url) = Url::parse(seed) else {
            debug!("skipping unparsable context page {}", seed);
            return Vec::new();
        };

        let mut hits = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(Url, u32)> = VecDeque::new();
        visited.insert(seed_url.as_str().to_string());
        frontier.push_back((seed_url.clone(), 0));
        let mut fetched = 0usize;

        while let Some((page, depth)) = frontier.pop_front() {
            if fetched >= self.limits.max_pages {
                break;
            }
            fetched += 1;

            let html = match self.fetch(&page).await {
                Some(html) => html,
                None => continue,
            };
            let links = extract_links(&html, &page);

            for image_url in links.images {
                hits.push(SearchHit {
                    image_url,
                    context_url: page.as_str().to_string(),
                });
            }
            if depth >= self.limits.max_depth {
                continue;
            }
            for link in links.pages {
                if same_host(&link, &seed_url) && visited.insert(link.as_str().to_string()) {
                    frontier.push_back((link, depth + 1));
                }
            }
        }

        debug!(
            "deep crawl of {} visited {} pages, found {} images",
            seed,
            fetched,
            hits.len()
        );
        hits
    }

    async fn fetch(&self, page: &Url) -> Option<String> {
        match self.client.get(page.clone()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!("cannot read {}: {}", page, e);
                    None
                }
            },
            Ok(response) => {
                debug!("context page {} returned {}", page, response.status());
                None
            }
            Err(e) => {
                debug!("fetch failed for {}: {}", page, e);
                None
            }
        }
    }
}

/// Extract image sources and anchor targets from one HTML document.
fn extract_links(html: &str, base: &Url) -> PageLinks {
    let document = Html::parse_document(html);
    let mut links = PageLinks::default();

    let Ok(img_selector) = Selector::parse("img[src]") else {
        return links;
    };
    let Ok(anchor_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&img_selector) {
        if let Some(src) = element.value().attr("src") {
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            if let Ok(resolved) = base.join(src) {
                links.images.push(resolved.into());
            }
        }
    }

    for element in document.select(&anchor_selector) {
        if let Some(href) = element.value().attr("href") {
            if let Ok(mut resolved) = base.join(href) {
                if !matches!(resolved.scheme(), "http" | "https") {
                    continue;
                }
                resolved.set_fragment(None);
                links.pages.push(resolved);
            }
        }
    }

    links
}

fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/gallery/page1.html").unwrap()
    }

    #[test]
    fn test_extract_links_resolves_relative_images() {
        let html = r#"<html><body>
            <img src="/img/cat.jpg">
            <img src="dog.png">
            <img src="data:image/png;base64,AAAA">
            <img src="">
        </body></html>"#;
        let links = extract_links(html, &base());
        assert_eq!(
            links.images,
            vec![
                "https://example.com/img/cat.jpg".to_string(),
                "https://example.com/gallery/dog.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_keeps_http_anchors_without_fragments() {
        let html = r#"<html><body>
            <a href="/about#team">about</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="https://other.org/page">offsite</a>
        </body></html>"#;
        let links = extract_links(html, &base());
        let targets: Vec<&str> = links.pages.iter().map(Url::as_str).collect();
        assert_eq!(
            targets,
            vec!["https://example.com/about", "https://other.org/page"]
        );
    }

    #[test]
    fn test_same_host_ignores_paths_but_not_hosts() {
        let seed = Url::parse("https://example.com/a").unwrap();
        assert!(same_host(
            &Url::parse("https://example.com/b/c").unwrap(),
            &seed
        ));
        assert!(!same_host(
            &Url::parse("https://sub.example.com/b").unwrap(),
            &seed
        ));
        assert!(!same_host(&Url::parse("https://other.org/").unwrap(), &seed));
    }
}
