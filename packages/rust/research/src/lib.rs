//! External research collaborators for address resolution.
//!
//! This crate provides:
//! - [`ResearchTool`]: ranked web search ([`SerperClient`])
//! - [`AddressFormatter`]: normalization into Dutch postal format ([`OpenRouterFormatter`])
//! - [`PageFetcher`]: plain HTTP page fetches ([`HttpFetcher`])
//! - [`ReachabilityProbe`]: the website accessibility check ([`HttpProbe`])
//! - [`scan`]: keyword-guided address extraction from search hits and HTML pages
//!
//! Every collaborator is a trait so the pipeline can be driven by stubs in tests.

mod fetch;
mod formatter;
mod probe;
pub mod scan;
mod search;

use async_trait::async_trait;
use officefinder_shared::{CompanyRecord, Result};

pub use fetch::HttpFetcher;
pub use formatter::{OpenRouterFormatter, is_not_found_marker};
pub use probe::HttpProbe;
pub use search::SerperClient;

/// Browser-like User-Agent used for probes and page fetches.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchHit {
    /// Title and snippet joined, for text matching.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.snippet)
    }
}

/// Web search collaborator.
#[async_trait]
pub trait ResearchTool: Send + Sync {
    /// Run a query and return hits in rank order.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Address formatting
// ---------------------------------------------------------------------------

/// Normalizes raw candidate text into `Street Number, Postcode City`.
///
/// Implementations must be idempotent on already-normalized input.
#[async_trait]
pub trait AddressFormatter: Send + Sync {
    /// Returns `None` when the raw text holds no usable address.
    async fn format(&self, raw: &str, company: &CompanyRecord) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// Page fetching / reachability
// ---------------------------------------------------------------------------

/// A fetched page body with its HTTP status.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET collaborator for homepage and contact page scans.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`. Every HTTP status, 429 included, is returned in the page;
    /// only transport failures are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Gate for the website fallback branch.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` when the site answered with anything but HTTP 403.
    async fn is_reachable(&self, url: &str) -> bool;
}
