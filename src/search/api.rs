//! Search API client (custom search JSON API, image mode).

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::SearchError;

const API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Rights accepted in commercial-only mode.
const COMMERCIAL_RIGHTS: &str = "(cc_publicdomain|cc_attribute|cc_sharealike|cc_nonderived)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One item of a result page.
#[derive(Debug, Clone)]
pub struct SearchItem {
    /// Direct link to the image.
    pub link: String,
    /// Page the image appears on; may be empty.
    pub context_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    image: Option<RawItemImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItemImage {
    #[serde(default)]
    context_link: String,
}

pub(super) struct SearchApiClient {
    client: Client,
    api_key: String,
    engine_id: String,
    query: String,
    rights: String,
}

impl SearchApiClient {
    pub fn new(
        api_key: &str,
        engine_id: &str,
        query: &str,
        commercial_only: bool,
    ) -> Result<Self, SearchError> {
        let rights = if commercial_only {
            COMMERCIAL_RIGHTS.to_string()
        } else {
            format!("{COMMERCIAL_RIGHTS}.-(cc_noncommercial)")
        };
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            query: query.to_string(),
            rights,
        })
    }

    /// Fetch one page of results; `start` is the 1-based result offset.
    pub async fn fetch_page(&self, start: u32) -> Result<Vec<SearchItem>, SearchError> {
        let start_param = start.to_string();
        let params = [
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", self.query.as_str()),
            ("searchType", "image"),
            ("rights", self.rights.as_str()),
            ("start", start_param.as_str()),
        ];
        let response = self.client.get(API_URL).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Api(response.status()));
        }
        let body: SearchResponse = response.json().await?;
        debug!(
            "search page at offset {} returned {} items",
            start,
            body.items.len()
        );
        Ok(body
            .items
            .into_iter()
            .map(|item| SearchItem {
                link: item.link,
                context_url: item.image.map(|i| i.context_link).unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_parses_context_links() {
        let raw = r#"{
            "items": [
                {"link": "https://cdn.example.com/a.jpg",
                 "image": {"contextLink": "https://example.com/gallery"}},
                {"link": "https://cdn.example.com/b.png"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(
            parsed.items[0].image.as_ref().unwrap().context_link,
            "https://example.com/gallery"
        );
        assert!(parsed.items[1].image.is_none());
    }

    #[test]
    fn test_missing_items_yields_empty_page() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.items.is_empty());
    }
}
