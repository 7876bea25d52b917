//! LLM-backed address normalization through the OpenRouter chat API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use officefinder_shared::{CompanyRecord, OfficeFinderError, OpenRouterConfig, Result};

use crate::AddressFormatter;

/// Default timeout for completion requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Raw text sent to the model is capped at this many characters.
const MAX_RAW_CHARS: usize = 4_000;

const SYSTEM_PROMPT: &str = "You validate and format company office addresses. \
Answer with exactly one line in Dutch postal format: `Street Number, Postcode City` \
(for example `Keizersgracht 1, 1015 AB Amsterdam`). If the input already has that \
format, return it unchanged. If the input contains no street address for the company, \
answer exactly `Address Not Found`. Never add commentary.";

/// `true` when formatter or scanner output means "no address", in either phrasing.
pub fn is_not_found_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("address not found") || lower.contains("no address found")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// [`AddressFormatter`] that asks an OpenRouter-hosted model to normalize addresses.
pub struct OpenRouterFormatter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenRouterFormatter {
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| OfficeFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            model: config.default_model.clone(),
        })
    }
}

fn user_prompt(raw: &str, company: &CompanyRecord) -> String {
    let raw: String = raw.chars().take(MAX_RAW_CHARS).collect();
    format!(
        "Company: {}\nWebsite: {}\n\nCandidate address text:\n{raw}",
        company.name, company.website
    )
}

#[async_trait]
impl AddressFormatter for OpenRouterFormatter {
    #[instrument(skip_all, fields(company = %company.name, model = %self.model))]
    async fn format(&self, raw: &str, company: &CompanyRecord) -> Result<Option<String>> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user_prompt(raw, company),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OfficeFinderError::Network(format!("openrouter: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OfficeFinderError::RateLimited(format!(
                "openrouter: HTTP {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(OfficeFinderError::Formatter(format!(
                "openrouter: HTTP {status}: {excerpt}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OfficeFinderError::parse(format!("openrouter response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().trim_matches('`').trim().to_string())
            .ok_or_else(|| OfficeFinderError::Formatter("openrouter returned no choices".into()))?;

        debug!(%text, "formatter answered");

        if text.is_empty() || is_not_found_marker(&text) {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter_for(server: &wiremock::MockServer) -> OpenRouterFormatter {
        let config = OpenRouterConfig {
            endpoint: format!("{}/chat/completions", server.uri()),
            ..OpenRouterConfig::default()
        };
        OpenRouterFormatter::new(&config, "or-key").unwrap()
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "gen-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
        })
    }

    #[test]
    fn not_found_marker_matches_both_phrasings() {
        assert!(is_not_found_marker("Address Not Found"));
        assert!(is_not_found_marker("No address found in search results."));
        assert!(is_not_found_marker("no address found on website"));
        assert!(!is_not_found_marker("Keizersgracht 1, 1015 AB Amsterdam"));
    }

    #[test]
    fn user_prompt_includes_company_context() {
        let company = CompanyRecord::new("Acme BV", "https://acme.example");
        let prompt = user_prompt("Keizersgracht 1", &company);
        assert!(prompt.contains("Acme BV"));
        assert!(prompt.contains("https://acme.example"));
        assert!(prompt.ends_with("Keizersgracht 1"));
    }

    #[tokio::test]
    async fn returns_normalized_address() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer or-key"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(completion("Keizersgracht 1, 1015 AB Amsterdam\n")),
            )
            .mount(&server)
            .await;

        let company = CompanyRecord::new("Acme BV", "https://acme.example");
        let formatted = formatter_for(&server)
            .format("Acme office at Keizersgracht 1, Amsterdam", &company)
            .await
            .unwrap();
        assert_eq!(formatted.as_deref(), Some("Keizersgracht 1, 1015 AB Amsterdam"));
    }

    #[tokio::test]
    async fn marker_answer_is_none() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(completion("Address Not Found")),
            )
            .mount(&server)
            .await;

        let company = CompanyRecord::new("Acme BV", "https://acme.example");
        let formatted = formatter_for(&server)
            .format("We are a remote-first team", &company)
            .await
            .unwrap();
        assert!(formatted.is_none());
    }

    #[tokio::test]
    async fn http_429_is_rate_limited() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let company = CompanyRecord::new("Acme BV", "https://acme.example");
        let err = formatter_for(&server)
            .format("Keizersgracht 1", &company)
            .await
            .unwrap_err();
        assert!(matches!(err, OfficeFinderError::RateLimited(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let company = CompanyRecord::new("Acme BV", "https://acme.example");
        let err = formatter_for(&server)
            .format("Keizersgracht 1", &company)
            .await
            .unwrap_err();
        assert!(matches!(err, OfficeFinderError::Formatter(_)));
    }
}
