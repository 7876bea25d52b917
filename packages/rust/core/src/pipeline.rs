//! The address-resolution state machine for one company.
//!
//! ```text
//! SEARCHING -> VALIDATING -> REVERSE_VALIDATING -> DONE
//!                                  |
//!                                  +-> (not found, site reachable)
//!                                      WEBSITE_SEARCHING -> CONTACT_PAGE_SEARCHING -> DONE
//! ```
//!
//! Every stage yields a [`StageOutcome`]. A rate limit from the search or
//! formatting APIs at any stage aborts the record with
//! [`Resolution::RateLimited`]; any other error aborts it with
//! [`Resolution::Failed`]. Neither is ever reported as "not found". The
//! company's own site is never a quota: a throttled page is just a page
//! without an address.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use officefinder_research::scan::{self, CompanyIdentity};
use officefinder_research::{
    AddressFormatter, FetchedPage, PageFetcher, ReachabilityProbe, ResearchTool,
    is_not_found_marker,
};
use officefinder_shared::{
    AddressResult, CompanyRecord, OfficeFinderError, Resolution, ResolverConfig, SourceStage,
};

use crate::classify::{Failure, classify};

/// Explicit pipeline states for one record in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Searching,
    Validating,
    ReverseValidating,
    WebsiteSearching,
    ContactPageSearching,
    Done,
}

/// Result of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Found(String),
    NotFound,
    RateLimited,
    Error(String),
}

/// Settings the pipeline needs from the resolver configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Country the primary search is scoped to.
    pub country: String,
    /// Lowercased substrings that mark an error as a rate limit.
    pub rate_limit_indicators: Vec<String>,
}

impl From<&ResolverConfig> for PipelineConfig {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            country: config.country.clone(),
            rate_limit_indicators: config.rate_limit_indicators.clone(),
        }
    }
}

/// Resolves one [`CompanyRecord`] into exactly one [`AddressResult`].
pub struct AddressPipeline {
    config: PipelineConfig,
    research: Arc<dyn ResearchTool>,
    formatter: Arc<dyn AddressFormatter>,
    fetcher: Arc<dyn PageFetcher>,
    probe: Arc<dyn ReachabilityProbe>,
}

impl AddressPipeline {
    pub fn new(
        config: PipelineConfig,
        research: Arc<dyn ResearchTool>,
        formatter: Arc<dyn AddressFormatter>,
        fetcher: Arc<dyn PageFetcher>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        Self {
            config,
            research,
            formatter,
            fetcher,
            probe,
        }
    }

    /// Run every applicable stage for `company`.
    #[instrument(skip_all, fields(company = %company.name))]
    pub async fn resolve(&self, company: &CompanyRecord) -> AddressResult {
        let mut state = PipelineState::Searching;
        let mut raw: Option<String> = None;
        let mut candidate: Option<String> = None;
        let mut primary = StageOutcome::NotFound;
        let mut site: Option<Url> = None;
        let mut homepage: Option<FetchedPage> = None;
        let mut website_address: Option<String> = None;
        let mut contact_address: Option<String> = None;

        loop {
            debug!(?state, "entering stage");
            state = match state {
                PipelineState::Searching => match self.search(company).await {
                    StageOutcome::Found(text) => {
                        raw = Some(text);
                        PipelineState::Validating
                    }
                    StageOutcome::NotFound => PipelineState::Validating,
                    other => return abort(other, SourceStage::Search),
                },

                PipelineState::Validating => {
                    let outcome = match raw.as_deref() {
                        Some(text) => self.validate(text, company).await,
                        None => StageOutcome::NotFound,
                    };
                    match outcome {
                        StageOutcome::Found(address) => {
                            candidate = Some(address);
                            PipelineState::ReverseValidating
                        }
                        StageOutcome::NotFound => {
                            site = self.fallback_site(company).await;
                            next_after_primary(&site)
                        }
                        other => return abort(other, SourceStage::Search),
                    }
                }

                PipelineState::ReverseValidating => {
                    let Some(address) = candidate.as_deref() else {
                        return abort(
                            StageOutcome::Error("reverse validation without a candidate".into()),
                            SourceStage::Search,
                        );
                    };
                    match self.reverse_validate(address, company).await {
                        StageOutcome::Found(address) => {
                            primary = StageOutcome::Found(address);
                            PipelineState::Done
                        }
                        StageOutcome::NotFound => {
                            info!(candidate = %address, "candidate not corroborated, discarded");
                            site = self.fallback_site(company).await;
                            next_after_primary(&site)
                        }
                        other => return abort(other, SourceStage::Search),
                    }
                }

                PipelineState::WebsiteSearching => {
                    let Some(url) = site.as_ref() else {
                        return abort(
                            StageOutcome::Error("website fallback without a site".into()),
                            SourceStage::Website,
                        );
                    };
                    let (outcome, page) = self.scan_homepage(url, company).await;
                    homepage = page;
                    match outcome {
                        StageOutcome::Found(address) => website_address = Some(address),
                        StageOutcome::NotFound => {}
                        other => return abort(other, SourceStage::Website),
                    }
                    PipelineState::ContactPageSearching
                }

                PipelineState::ContactPageSearching => {
                    let Some(url) = site.as_ref() else {
                        return abort(
                            StageOutcome::Error("contact fallback without a site".into()),
                            SourceStage::ContactPage,
                        );
                    };
                    match self.scan_contact_pages(url, homepage.as_ref(), company).await {
                        StageOutcome::Found(address) => contact_address = Some(address),
                        StageOutcome::NotFound => {}
                        other => return abort(other, SourceStage::ContactPage),
                    }
                    PipelineState::Done
                }

                PipelineState::Done => break,
            };
        }

        let result = merge(primary, website_address, contact_address);
        info!(
            status = result.resolution.status(),
            stage = %result.source_stage,
            "record resolved"
        );
        result
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn search(&self, company: &CompanyRecord) -> StageOutcome {
        let query = format!(
            "\"{}\" office address {}",
            company.name, self.config.country
        );
        match self.research.search(&query).await {
            Ok(hits) => match scan::candidate_text_from_hits(&hits) {
                Some(text) => {
                    debug!(hits = hits.len(), "address-shaped search results found");
                    StageOutcome::Found(text)
                }
                None => {
                    debug!(hits = hits.len(), "no address-shaped search results");
                    StageOutcome::NotFound
                }
            },
            Err(e) => self.failed(e),
        }
    }

    async fn validate(&self, raw: &str, company: &CompanyRecord) -> StageOutcome {
        match self.formatter.format(raw, company).await {
            Ok(Some(address)) if !is_not_found_marker(&address) => StageOutcome::Found(address),
            Ok(_) => StageOutcome::NotFound,
            Err(e) => self.failed(e),
        }
    }

    async fn reverse_validate(&self, candidate: &str, company: &CompanyRecord) -> StageOutcome {
        let query = format!("\"{}\" \"{candidate}\"", company.name);
        match self.research.search(&query).await {
            Ok(hits) => {
                let identity = CompanyIdentity::of(company);
                if scan::corroborates(&hits, &identity, candidate) {
                    StageOutcome::Found(candidate.to_string())
                } else {
                    StageOutcome::NotFound
                }
            }
            Err(e) => self.failed(e),
        }
    }

    /// Fetch the homepage and scan it. The page is returned for link discovery.
    async fn scan_homepage(
        &self,
        site: &Url,
        company: &CompanyRecord,
    ) -> (StageOutcome, Option<FetchedPage>) {
        let page = match self.fetcher.fetch(site.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %site, error = %e, "homepage fetch failed");
                return (StageOutcome::Error(e.to_string()), None);
            }
        };
        if !page.is_success() {
            debug!(status = page.status, "homepage returned non-success status");
            return (StageOutcome::NotFound, Some(page));
        }
        let outcome = self.scan_page(&page, company).await;
        (outcome, Some(page))
    }

    async fn scan_contact_pages(
        &self,
        site: &Url,
        homepage: Option<&FetchedPage>,
        company: &CompanyRecord,
    ) -> StageOutcome {
        let mut targets = homepage
            .filter(|page| page.is_success())
            .map(|page| {
                let base = Url::parse(&page.url).unwrap_or_else(|_| site.clone());
                scan::contact_links(&page.body, &base)
            })
            .unwrap_or_default();
        if targets.is_empty() {
            match site.join("/contact") {
                Ok(url) => targets.push(url),
                Err(e) => return StageOutcome::Error(format!("invalid contact URL: {e}")),
            }
        }

        for target in targets {
            let page = match self.fetcher.fetch(target.as_str()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %target, error = %e, "contact page fetch failed");
                    continue;
                }
            };
            if !page.is_success() {
                debug!(url = %target, status = page.status, "contact page unavailable");
                continue;
            }
            match self.scan_page(&page, company).await {
                StageOutcome::NotFound => continue,
                other => return other,
            }
        }
        StageOutcome::NotFound
    }

    async fn scan_page(&self, page: &FetchedPage, company: &CompanyRecord) -> StageOutcome {
        match scan::address_from_html(&page.body) {
            Some(text) => {
                debug!(url = %page.url, %text, "address-shaped text on page");
                self.validate(&text, company).await
            }
            None => StageOutcome::NotFound,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The site to scan when the primary path found nothing, if it is reachable.
    async fn fallback_site(&self, company: &CompanyRecord) -> Option<Url> {
        let Some(url) = site_url(&company.website) else {
            info!(website = %company.website, "no usable website, skipping website fallback");
            return None;
        };
        if self.probe.is_reachable(url.as_str()).await {
            Some(url)
        } else {
            info!(website = %url, "website unreachable, skipping website fallback");
            None
        }
    }

    fn failed(&self, err: OfficeFinderError) -> StageOutcome {
        match classify(&err, &self.config.rate_limit_indicators) {
            Failure::RateLimited => {
                warn!(error = %err, "rate limit reached");
                StageOutcome::RateLimited
            }
            Failure::Transient(reason) => {
                warn!(%reason, "stage failed");
                StageOutcome::Error(reason)
            }
        }
    }
}

fn next_after_primary(site: &Option<Url>) -> PipelineState {
    if site.is_some() {
        PipelineState::WebsiteSearching
    } else {
        PipelineState::Done
    }
}

/// Terminal result for a stage that aborted the record.
fn abort(outcome: StageOutcome, stage: SourceStage) -> AddressResult {
    let resolution = match outcome {
        StageOutcome::RateLimited => Resolution::RateLimited,
        StageOutcome::Error(reason) => Resolution::Failed { reason },
        StageOutcome::Found(address) => Resolution::Found { address },
        StageOutcome::NotFound => Resolution::NotFound,
    };
    AddressResult::new(resolution, stage)
}

/// Fallback results supersede the primary outcome, website first.
fn merge(
    primary: StageOutcome,
    website: Option<String>,
    contact: Option<String>,
) -> AddressResult {
    if let Some(address) = website {
        return AddressResult::found(address, SourceStage::Website);
    }
    if let Some(address) = contact {
        return AddressResult::found(address, SourceStage::ContactPage);
    }
    match primary {
        StageOutcome::Found(address) => AddressResult::found(address, SourceStage::Search),
        _ => AddressResult::not_found(SourceStage::Search),
    }
}

/// Parse a website cell into a URL, assuming `https` when no scheme is given.
fn site_url(website: &str) -> Option<Url> {
    let website = website.trim();
    if website.is_empty() {
        return None;
    }
    Url::parse(website)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .or_else(|| Url::parse(&format!("https://{website}")).ok())
        .filter(|u| u.host_str().is_some())
}
