//! In-memory collaborators for pipeline and batch tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use officefinder_research::{
    AddressFormatter, FetchedPage, PageFetcher, ReachabilityProbe, ResearchTool, SearchHit,
};
use officefinder_shared::{CompanyRecord, OfficeFinderError, Result};

use crate::pipeline::{AddressPipeline, PipelineConfig};

pub(crate) fn hit(title: &str, snippet: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.into(),
        snippet: snippet.into(),
        url: url.into(),
    }
}

/// Scripted answer for one search query.
pub(crate) enum Reply {
    Hits(Vec<SearchHit>),
    RateLimited,
    Fail(&'static str),
}

type Script = Box<dyn Fn(&str) -> Reply + Send + Sync>;

pub(crate) struct StubResearch {
    script: Script,
    pub queries: Mutex<Vec<String>>,
}

impl StubResearch {
    pub fn new(script: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResearchTool for StubResearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        match (self.script)(query) {
            Reply::Hits(hits) => Ok(hits),
            Reply::RateLimited => Err(OfficeFinderError::RateLimited("stub: HTTP 429".into())),
            Reply::Fail(msg) => Err(OfficeFinderError::Network(msg.into())),
        }
    }
}

/// Answers with the first rule whose needle occurs in the raw text.
pub(crate) struct StubFormatter {
    rules: Vec<(&'static str, &'static str)>,
    rate_limited: bool,
    pub inputs: Mutex<Vec<String>>,
}

impl StubFormatter {
    pub fn new(rules: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            rules: rules.to_vec(),
            rate_limited: false,
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn rate_limited() -> Arc<Self> {
        Arc::new(Self {
            rules: Vec::new(),
            rate_limited: true,
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl AddressFormatter for StubFormatter {
    async fn format(&self, raw: &str, _company: &CompanyRecord) -> Result<Option<String>> {
        self.inputs.lock().unwrap().push(raw.to_string());
        if self.rate_limited {
            return Err(OfficeFinderError::Formatter(
                "openrouter: rate limit exceeded".into(),
            ));
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| raw.contains(needle))
            .map(|(_, answer)| answer.to_string()))
    }
}

pub(crate) enum Page {
    Ok(&'static str),
    Status(u16),
    /// Transport failure, no response at all.
    Fail(&'static str),
}

/// Serves pages by exact URL. Unknown URLs are 404.
pub(crate) struct StubFetcher {
    pages: HashMap<String, Page>,
    pub urls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new(pages: Vec<(&str, Page)>) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.into_iter().map(|(u, p)| (u.to_string(), p)).collect(),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn fetched(&self, url: &str) -> bool {
        self.urls.lock().unwrap().iter().any(|u| u == url)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.urls.lock().unwrap().push(url.to_string());
        let (status, body) = match self.pages.get(url) {
            Some(Page::Ok(body)) => (200, body.to_string()),
            Some(Page::Status(status)) => (*status, String::new()),
            Some(Page::Fail(msg)) => {
                return Err(OfficeFinderError::Network(format!("{url}: {msg}")));
            }
            None => (404, String::new()),
        };
        Ok(FetchedPage {
            url: url.to_string(),
            status,
            body,
        })
    }
}

pub(crate) struct StubProbe {
    reachable: bool,
    calls: AtomicUsize,
}

impl StubProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for StubProbe {
    async fn is_reachable(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }
}

pub(crate) fn pipeline_with(
    research: &Arc<StubResearch>,
    formatter: &Arc<StubFormatter>,
    fetcher: &Arc<StubFetcher>,
    probe: &Arc<StubProbe>,
) -> AddressPipeline {
    AddressPipeline::new(
        PipelineConfig {
            country: "Netherlands".into(),
            rate_limit_indicators: vec!["rate limit".into(), "quota exceeded".into()],
        },
        research.clone(),
        formatter.clone(),
        fetcher.clone(),
        probe.clone(),
    )
}
