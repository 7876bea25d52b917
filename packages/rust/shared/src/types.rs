//! Core domain types: input companies and their resolved addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel written for records whose address could not be found.
pub const ADDRESS_NOT_FOUND: &str = "ADDRESS_NOT_FOUND";

/// Sentinel for records aborted because an external quota was exhausted.
pub const RATE_LIMITED: &str = "RATE_LIMITED";

// ---------------------------------------------------------------------------
// CompanyRecord
// ---------------------------------------------------------------------------

/// One row of the master input.
///
/// `name` is the identity key used to correlate every stage of the pipeline
/// and is never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Company name, non-empty.
    pub name: String,
    /// Company homepage URL. May be unreachable or empty.
    pub website: String,
    /// Remaining input columns, in their original order, carried into the ledger.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl CompanyRecord {
    /// Build a record with no extra columns.
    pub fn new(name: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: website.into(),
            extra: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceStage
// ---------------------------------------------------------------------------

/// The pipeline stage whose outcome became the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStage {
    /// Web search, validation and reverse validation.
    Search,
    /// Homepage scan.
    Website,
    /// Contact page scan.
    ContactPage,
}

impl SourceStage {
    /// Column value used in the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Website => "website",
            Self::ContactPage => "contact_page",
        }
    }

    /// Parse a ledger column value.
    pub fn from_column(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Some(Self::Search),
            "website" => Some(Self::Website),
            "contact_page" => Some(Self::ContactPage),
            _ => None,
        }
    }
}

impl fmt::Display for SourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution / AddressResult
// ---------------------------------------------------------------------------

/// Tagged outcome of resolving one company's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// A corroborated, normalized postal address.
    Found { address: String },
    /// Every applicable stage ran and none produced an address.
    NotFound,
    /// An external quota was exhausted; the batch should stop.
    RateLimited,
    /// A non-rate-limit error aborted this record.
    Failed { reason: String },
}

impl Resolution {
    /// Ledger `status` column value.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether this outcome should halt the outer batch loop.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// The resolved address, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Found { address } => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { address } => f.write_str(address),
            Self::NotFound => f.write_str(ADDRESS_NOT_FOUND),
            Self::RateLimited => f.write_str(RATE_LIMITED),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// The pipeline's single output for one [`CompanyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResult {
    pub resolution: Resolution,
    /// Stage that produced `resolution`. Diagnostic only.
    pub source_stage: SourceStage,
}

impl AddressResult {
    pub fn new(resolution: Resolution, source_stage: SourceStage) -> Self {
        Self {
            resolution,
            source_stage,
        }
    }

    pub fn found(address: impl Into<String>, source_stage: SourceStage) -> Self {
        Self::new(
            Resolution::Found {
                address: address.into(),
            },
            source_stage,
        )
    }

    pub fn not_found(source_stage: SourceStage) -> Self {
        Self::new(Resolution::NotFound, source_stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_display_uses_sentinels() {
        assert_eq!(Resolution::NotFound.to_string(), ADDRESS_NOT_FOUND);
        assert_eq!(Resolution::RateLimited.to_string(), RATE_LIMITED);
        let found = Resolution::Found {
            address: "Keizersgracht 1, 1015 AB Amsterdam".into(),
        };
        assert_eq!(found.to_string(), "Keizersgracht 1, 1015 AB Amsterdam");
    }

    #[test]
    fn resolution_serializes_tagged() {
        let failed = Resolution::Failed {
            reason: "connection reset".into(),
        };
        let json = serde_json::to_string(&failed).expect("serialize");
        assert_eq!(json, r#"{"status":"failed","reason":"connection reset"}"#);
    }

    #[test]
    fn source_stage_column_roundtrip() {
        for stage in [SourceStage::Search, SourceStage::Website, SourceStage::ContactPage] {
            assert_eq!(SourceStage::from_column(stage.as_str()), Some(stage));
        }
        assert_eq!(SourceStage::from_column(""), None);
    }

    #[test]
    fn only_rate_limited_halts() {
        assert!(Resolution::RateLimited.is_rate_limited());
        assert!(!Resolution::NotFound.is_rate_limited());
        assert!(!Resolution::Failed { reason: "x".into() }.is_rate_limited());
    }
}
