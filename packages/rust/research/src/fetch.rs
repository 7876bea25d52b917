//! HTTP page fetcher used by the website fallback stages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use officefinder_shared::{OfficeFinderError, Result};

use crate::probe::browser_headers;
use crate::{BROWSER_USER_AGENT, FetchedPage, PageFetcher};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Bodies are read up to this many bytes; the rest is never downloaded (2 MB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// reqwest-backed [`PageFetcher`].
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| OfficeFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        debug!(%url, "fetching page");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OfficeFinderError::Network(format!("{url}: {e}")))?;

        // Site throttling (429) is a page status, never a quota error.
        let status = response.status();
        let final_url = response.url().to_string();

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| OfficeFinderError::Network(format!("{url}: body read failed: {e}")))?
        {
            let room = MAX_BODY_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                debug!(%url, limit = MAX_BODY_BYTES, "body truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}
