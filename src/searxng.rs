use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result, Service};
use crate::pipeline::services::{SearchHit, WebSearch};
use crate::settings::SearchSettings;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        SearchHit {
            title: result.title,
            link: result.url,
            snippet: result.content,
        }
    }
}

/// Web search through a SearXNG instance's JSON API.
pub struct SearxngSearch {
    client: Client,
    endpoint: Url,
    max_results: usize,
}

impl SearxngSearch {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.searxng_url)
            .and_then(|base| base.join("search"))
            .map_err(|e| {
                Error::Config(format!("invalid SearXNG URL '{}': {e}", settings.searxng_url))
            })?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            max_results: settings.max_results,
        })
    }
}

#[async_trait]
impl WebSearch for SearxngSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::call(Service::WebSearch, e))?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::malformed(Service::WebSearch, e))?;
        debug!(results = body.results.len(), "SearXNG answered");

        Ok(body
            .results
            .into_iter()
            .take(self.max_results)
            .map(SearchHit::from)
            .collect())
    }
}
