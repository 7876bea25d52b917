//! Keyword-guided address extraction from search hits and HTML pages,
//! plus the company-identity check used for reverse validation.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use officefinder_shared::CompanyRecord;

use crate::SearchHit;

/// Words that mark text as being about a physical location.
const ADDRESS_KEYWORDS: &[&str] = &[
    "office",
    "location",
    "address",
    "contact",
    "headquarters",
    "adres",
    "bezoekadres",
    "kantoor",
    "vestiging",
];

/// Legal-form suffixes dropped from company names before matching.
const LEGAL_SUFFIXES: &[&str] = &[
    "b.v.", "bv", "n.v.", "nv", "v.o.f.", "vof", "holding", "inc", "inc.", "ltd", "ltd.",
    "llc", "gmbh",
];

/// Blocks longer than this are page chrome, not an address card.
const MAX_BLOCK_CHARS: usize = 300;

/// How many blocks after a keyword block may still hold its address.
const KEYWORD_REACH: usize = 3;

/// Contact pages followed per site.
const MAX_CONTACT_LINKS: usize = 2;

static POSTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[1-9][0-9]{3}\s?[A-Z]{2}\b").expect("valid regex"));

static POSTCODE_CITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[1-9][0-9]{3}\s?[A-Z]{2}\s+\p{Lu}[\p{L}'-]+(?:\s\p{Lu}[\p{L}'-]+)?")
        .expect("valid regex")
});

// Up to two capitalised prefix words ("Prins Hendrikkade"), then the house number.
static STREET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\p{Lu}[\p{L}'.-]*\s){0,2}\p{Lu}[\p{L}'.-]+\s\d{1,4}[a-zA-Z]?\b")
        .expect("valid regex")
});

static BLOCK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("address, footer, p, li, td, span, div").expect("valid selector")
});

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

// ---------------------------------------------------------------------------
// Text predicates
// ---------------------------------------------------------------------------

/// Contains a Dutch postcode or a street name followed by a house number.
pub fn is_address_shaped(text: &str) -> bool {
    POSTCODE_RE.is_match(text) || street_match(text).is_some()
}

/// First street-and-number match in `text`.
///
/// Without a postcode nearby, "Since 2015" or "Copyright 2024" is a year,
/// not a house number, and is skipped.
fn street_match(text: &str) -> Option<regex::Match<'_>> {
    let has_postcode = POSTCODE_RE.is_match(text);
    STREET_RE
        .find_iter(text)
        .find(|m| has_postcode || !ends_with_year(m.as_str()))
}

fn ends_with_year(street: &str) -> bool {
    street
        .rsplit(' ')
        .next()
        .filter(|n| n.len() == 4)
        .and_then(|n| n.parse::<u16>().ok())
        .is_some_and(|n| (1900..=2099).contains(&n))
}

/// Contains one of the location keywords (case-insensitive).
pub fn mentions_address_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    ADDRESS_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Pull the address portion out of a longer text block.
///
/// Returns the street line through postcode and city when both appear close
/// together, the street line alone otherwise, or the whole block when only a
/// postcode is present.
pub fn address_span(text: &str) -> Option<String> {
    let text = collapse_whitespace(text);
    let street = street_match(&text);
    let postcode = POSTCODE_CITY_RE
        .find(&text)
        .or_else(|| POSTCODE_RE.find(&text));

    let span = match (street, postcode) {
        (Some(s), Some(p)) if p.start() >= s.end() && p.start() - s.end() <= 40 => {
            text[s.start()..p.end()].to_string()
        }
        (Some(s), _) => s.as_str().to_string(),
        (None, Some(_)) => text.clone(),
        (None, None) => return None,
    };

    Some(
        span.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .to_string(),
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word, case-insensitive containment.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();

    haystack.match_indices(&needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

// ---------------------------------------------------------------------------
// Search hits
// ---------------------------------------------------------------------------

/// Reduce search hits to the raw candidate text handed to the formatter.
///
/// Only address-shaped hits survive; those that also mention a location
/// keyword come first. `None` when nothing address-like was found.
pub fn candidate_text_from_hits(hits: &[SearchHit]) -> Option<String> {
    let mut shaped: Vec<(bool, String)> = hits
        .iter()
        .map(|h| collapse_whitespace(&h.text()))
        .filter(|text| is_address_shaped(text))
        .map(|text| (mentions_address_keyword(&text), text))
        .collect();

    if shaped.is_empty() {
        return None;
    }

    // Stable sort keeps rank order inside each group.
    shaped.sort_by_key(|(keyword, _)| !keyword);
    Some(
        shaped
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

// ---------------------------------------------------------------------------
// Company identity / corroboration
// ---------------------------------------------------------------------------

/// What a search result must mention to be "about" a company.
#[derive(Debug, Clone)]
pub struct CompanyIdentity {
    /// Lowercased name with legal suffixes removed.
    core_name: String,
    /// Website host without `www.`.
    host: Option<String>,
}

impl CompanyIdentity {
    pub fn of(company: &CompanyRecord) -> Self {
        Self {
            core_name: core_name(&company.name),
            host: Url::parse(&company.website)
                .ok()
                .and_then(|u| u.host_str().map(strip_www)),
        }
    }

    /// Whether the hit names the company or links to its site.
    pub fn is_named_in(&self, hit: &SearchHit) -> bool {
        if contains_phrase(&hit.text(), &self.core_name) {
            return true;
        }
        match (&self.host, Url::parse(&hit.url).ok()) {
            (Some(host), Some(url)) => url
                .host_str()
                .map(strip_www)
                .is_some_and(|h| h == *host || h.ends_with(&format!(".{host}"))),
            _ => false,
        }
    }
}

fn core_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let mut tokens: Vec<&str> = lower.split_whitespace().collect();
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| LEGAL_SUFFIXES.contains(&t.trim_end_matches(',')))
    {
        tokens.pop();
    }
    tokens.join(" ").trim_end_matches(',').to_string()
}

fn strip_www(host: &str) -> String {
    host.trim_start_matches("www.").to_lowercase()
}

/// A single hit must name the company and carry the candidate's street line
/// or postcode.
pub fn corroborates(hits: &[SearchHit], identity: &CompanyIdentity, candidate: &str) -> bool {
    let street = candidate.split(',').next().unwrap_or_default().trim();
    let postcode = POSTCODE_RE
        .find(candidate)
        .map(|m| m.as_str().replace(' ', ""));

    hits.iter().any(|hit| {
        if !identity.is_named_in(hit) {
            return false;
        }
        let text = collapse_whitespace(&hit.text());
        let street_seen = STREET_RE.is_match(street) && contains_phrase(&text, street);
        let postcode_seen = postcode
            .as_deref()
            .is_some_and(|pc| text.replace(' ', "").contains(pc));
        street_seen || postcode_seen
    })
}

// ---------------------------------------------------------------------------
// HTML pages
// ---------------------------------------------------------------------------

/// Find the best address-shaped block on a page that sits in or just after
/// a block mentioning a location keyword. `<address>` elements always qualify.
///
/// A block carrying a postcode or an `<address>` tag wins over an earlier
/// bare street match.
pub fn address_from_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let mut last_keyword_block: Option<usize> = None;
    let mut weak: Option<String> = None;

    for (i, el) in doc.select(&BLOCK_SEL).enumerate() {
        let text = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() || text.chars().count() > MAX_BLOCK_CHARS {
            continue;
        }

        let is_address_tag = el.value().name() == "address";
        if mentions_address_keyword(&text) {
            last_keyword_block = Some(i);
        }

        let near_keyword = last_keyword_block.is_some_and(|k| i - k <= KEYWORD_REACH);
        if !(is_address_tag || near_keyword) || !is_address_shaped(&text) {
            continue;
        }

        if is_address_tag || POSTCODE_RE.is_match(&text) {
            return address_span(&text);
        }
        if weak.is_none() {
            weak = address_span(&text);
        }
    }

    weak
}

/// Same-host links whose href or label mentions a contact page.
pub fn contact_links(html: &str, base_url: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut links: Vec<Url> = Vec::new();

    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
            continue;
        }

        let label = el.text().collect::<String>().to_lowercase();
        let href_lower = href.to_lowercase();
        let is_contact = ["contact", "kontakt"]
            .iter()
            .any(|k| href_lower.contains(k) || label.contains(k));
        if !is_contact {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            if resolved.host_str() == base_url.host_str() && !links.contains(&resolved) {
                links.push(resolved);
            }
        }
    }

    links.truncate(MAX_CONTACT_LINKS);
    links
}
