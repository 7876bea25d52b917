//! Lightweight website accessibility probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use officefinder_shared::{OfficeFinderError, Result};

use crate::{BROWSER_USER_AGENT, ReachabilityProbe};

/// Default probe timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Single-attempt GET with a browser request signature.
///
/// Any response other than 403 counts as reachable, including 404 and 5xx.
/// DNS failures, refused connections, timeouts and 403 all count as unreachable.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers())
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| OfficeFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Probe with the default 5 second timeout.
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    #[instrument(skip(self))]
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(%status, "probe answered");
                status != reqwest::StatusCode::FORBIDDEN
            }
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        }
    }
}

/// Headers a desktop Chrome sends on a top-level navigation.
pub(crate) fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers
}
