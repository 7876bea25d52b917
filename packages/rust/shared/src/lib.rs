//! Shared types, error model, and configuration for OfficeFinder.
//!
//! This crate is the foundation depended on by all other OfficeFinder crates.
//! It provides:
//! - [`OfficeFinderError`]: the unified error type
//! - Domain types ([`CompanyRecord`], [`AddressResult`], [`Resolution`], [`SourceStage`])
//! - Configuration ([`AppConfig`], [`ResolverConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiCredentials, AppConfig, DefaultsConfig, OpenRouterConfig, ProbeConfig, RateLimitConfig,
    ResolverConfig, SerperConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_keys,
};
pub use error::{OfficeFinderError, Result};
pub use types::{
    ADDRESS_NOT_FOUND, AddressResult, CompanyRecord, RATE_LIMITED, Resolution, SourceStage,
};
