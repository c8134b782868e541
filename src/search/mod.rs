//! Image discovery: search API queries and optional deep crawling.

mod api;
mod crawl;

pub use api::SearchItem;
pub use crawl::DeepCrawler;

use thiserror::Error;
use tracing::debug;

use crate::config::CrawlLimits;
use crate::models::SearchHit;

use api::SearchApiClient;

/// Errors from the search stage.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search API returned {0}")]
    Api(reqwest::StatusCode),

    #[error("invalid search configuration: {0}")]
    Config(String),
}

/// Discovers candidate image URLs page by page.
pub struct SearchClient {
    api: SearchApiClient,
    deep_search: bool,
    crawler: DeepCrawler,
}

impl SearchClient {
    pub fn new(
        api_key: &str,
        engine_id: &str,
        search_term: &str,
        commercial_only: bool,
        deep_search: bool,
        limits: CrawlLimits,
    ) -> Result<Self, SearchError> {
        if api_key.is_empty() {
            return Err(SearchError::Config("API key is empty".to_string()));
        }
        if engine_id.is_empty() {
            return Err(SearchError::Config("engine id is empty".to_string()));
        }
        if search_term.is_empty() {
            return Err(SearchError::Config("search term is empty".to_string()));
        }
        Ok(Self {
            api: SearchApiClient::new(api_key, engine_id, search_term, commercial_only)?,
            deep_search,
            crawler: DeepCrawler::new(limits)?,
        })
    }

    /// Fetch one result page and expand it into candidate hits.
    ///
    /// `start` is the 1-based result offset of the page. With deep search
    /// enabled, every hit's context page seeds a bounded same-host crawl
    /// for additional images.
    pub async fn crawl(&self, start: u32) -> Result<Vec<SearchHit>, SearchError> {
        let items = self.api.fetch_page(start).await?;
        let mut hits = Vec::new();
        for item in items {
            hits.push(SearchHit {
                image_url: item.link.clone(),
                context_url: item.context_url.clone(),
            });
            if self.deep_search && !item.context_url.is_empty() {
                hits.extend(self.crawler.harvest(&item.context_url).await);
            }
        }
        debug!("page at offset {} expanded to {} hits", start, hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rejects_empty_credentials() {
        let limits = CrawlLimits::default();
        assert!(SearchClient::new("", "engine", "cats", false, false, limits).is_err());
        assert!(SearchClient::new("key", "", "cats", false, false, limits).is_err());
        assert!(SearchClient::new("key", "engine", "", false, false, limits).is_err());
        assert!(SearchClient::new("key", "engine", "cats", false, false, limits).is_ok());
    }
}
