//! Serper (Google Search API) implementation of [`ResearchTool`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use officefinder_shared::{OfficeFinderError, Result, SerperConfig};

use crate::{ResearchTool, SearchHit};

/// Default timeout for search requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("OfficeFinder/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    gl: &'a str,
    num: u32,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Web search through the Serper API.
pub struct SerperClient {
    client: Client,
    endpoint: String,
    api_key: String,
    country_code: String,
    num_results: u32,
}

impl SerperClient {
    pub fn new(config: &SerperConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| OfficeFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            country_code: config.country_code.clone(),
            num_results: config.num_results,
        })
    }
}

#[async_trait]
impl ResearchTool for SerperClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let request = SerperRequest {
            q: query,
            gl: &self.country_code,
            num: self.num_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OfficeFinderError::Network(format!("serper: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OfficeFinderError::RateLimited(format!(
                "serper: HTTP {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(OfficeFinderError::Network(format!(
                "serper: HTTP {status}: {excerpt}"
            )));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| OfficeFinderError::parse(format!("serper response: {e}")))?;

        let hits: Vec<SearchHit> = parsed
            .organic
            .into_iter()
            .map(|o| SearchHit {
                title: o.title,
                snippet: o.snippet,
                url: o.link,
            })
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &wiremock::MockServer) -> SerperClient {
        let config = SerperConfig {
            endpoint: format!("{}/search", server.uri()),
            ..SerperConfig::default()
        };
        SerperClient::new(&config, "test-key").unwrap()
    }

    #[tokio::test]
    async fn parses_organic_results_in_rank_order() {
        let server = wiremock::MockServer::start().await;
        let body = serde_json::json!({
            "searchParameters": { "q": "Acme BV office address" },
            "organic": [
                { "title": "Acme BV - Contact", "link": "https://acme.example/contact", "snippet": "Keizersgracht 1, Amsterdam", "position": 1 },
                { "title": "Acme on KvK", "link": "https://kvk.example/acme", "snippet": "Registered office", "position": 2 }
            ]
        });

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/search"))
            .and(wiremock::matchers::header("X-API-KEY", "test-key"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({ "gl": "nl" })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let hits = client_for(&server)
            .search("Acme BV office address")
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://acme.example/contact");
        assert_eq!(hits[0].snippet, "Keizersgracht 1, Amsterdam");
        assert_eq!(hits[1].title, "Acme on KvK");
    }

    #[tokio::test]
    async fn missing_organic_is_empty() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let hits = client_for(&server).search("nothing").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn http_429_is_rate_limited() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server).search("anything").await.unwrap_err();
        assert!(matches!(err, OfficeFinderError::RateLimited(_)));
    }

    #[tokio::test]
    async fn other_failures_carry_body_text() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(400).set_body_string("Not enough credits"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).search("anything").await.unwrap_err();
        assert!(matches!(err, OfficeFinderError::Network(_)));
        assert!(err.to_string().contains("Not enough credits"));
    }
}
