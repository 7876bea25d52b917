//! Application configuration for OfficeFinder.
//!
//! User config lives at `~/.officefinder/officefinder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OfficeFinderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "officefinder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".officefinder";

// ---------------------------------------------------------------------------
// Config structs (matching officefinder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Serper web search settings.
    #[serde(default)]
    pub serper: SerperConfig,

    /// OpenRouter settings for the address formatter.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Accessibility probe and page fetch timeouts.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Rate-limit classification.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Master input CSV.
    #[serde(default = "default_input_path")]
    pub input_path: String,

    /// Ledger CSV (resumption checkpoint and output).
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,

    /// Records skipped when no ledger exists yet.
    #[serde(default = "default_skip")]
    pub default_skip: usize,

    /// Country the searches are scoped to.
    #[serde(default = "default_country")]
    pub country: String,

    /// Pause between records, in ms.
    #[serde(default = "default_record_delay")]
    pub record_delay_ms: u64,

    /// Maximum number of records processed per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<usize>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            ledger_path: default_ledger_path(),
            default_skip: default_skip(),
            country: default_country(),
            record_delay_ms: default_record_delay(),
            max_records: None,
        }
    }
}

fn default_input_path() -> String {
    "ai_companies.csv".into()
}
fn default_ledger_path() -> String {
    "ai_companies2.csv".into()
}
fn default_skip() -> usize {
    21
}
fn default_country() -> String {
    "Netherlands".into()
}
fn default_record_delay() -> u64 {
    2_000
}

/// `[serper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerperConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_serper_key_env")]
    pub api_key_env: String,

    /// Search endpoint.
    #[serde(default = "default_serper_endpoint")]
    pub endpoint: String,

    /// Two-letter country code passed as `gl`.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Results requested per query.
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

impl Default for SerperConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_serper_key_env(),
            endpoint: default_serper_endpoint(),
            country_code: default_country_code(),
            num_results: default_num_results(),
        }
    }
}

fn default_serper_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_serper_endpoint() -> String {
    "https://google.serper.dev/search".into()
}
fn default_country_code() -> String {
    "nl".into()
}
fn default_num_results() -> u32 {
    10
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,

    /// Chat completions endpoint.
    #[serde(default = "default_openrouter_endpoint")]
    pub endpoint: String,

    /// Model used to normalize addresses.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            endpoint: default_openrouter_endpoint(),
            default_model: default_model(),
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}

/// `[probe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Accessibility probe timeout.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Timeout for homepage / contact page fetches.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            page_timeout_secs: default_page_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}
fn default_page_timeout() -> u64 {
    20
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Case-insensitive substrings that mark an error message as a rate limit.
    #[serde(default = "default_indicators")]
    pub indicators: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            indicators: default_indicators(),
        }
    }
}

fn default_indicators() -> Vec<String> {
    vec![
        "rate limit".into(),
        "too many requests".into(),
        "quota exceeded".into(),
        "http 429".into(),
    ]
}

// ---------------------------------------------------------------------------
// Resolver config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for the resolution pipeline and batch driver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Master input CSV.
    pub input_path: PathBuf,
    /// Ledger CSV.
    pub ledger_path: PathBuf,
    /// Resume offset used when no ledger exists.
    pub default_skip: usize,
    /// Country context for searches.
    pub country: String,
    /// Fixed pause between records.
    pub record_delay: Duration,
    /// Optional per-run cap.
    pub max_records: Option<usize>,
    /// Rate-limit indicators (lowercased).
    pub rate_limit_indicators: Vec<String>,
}

impl From<&AppConfig> for ResolverConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            input_path: PathBuf::from(&config.defaults.input_path),
            ledger_path: PathBuf::from(&config.defaults.ledger_path),
            default_skip: config.defaults.default_skip,
            country: config.defaults.country.clone(),
            record_delay: Duration::from_millis(config.defaults.record_delay_ms),
            max_records: config.defaults.max_records,
            rate_limit_indicators: config
                .rate_limit
                .indicators
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }
}

/// API keys resolved once at startup and handed to client constructors.
#[derive(Clone)]
pub struct ApiCredentials {
    pub serper_api_key: String,
    pub openrouter_api_key: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("serper_api_key", &"<redacted>")
            .field("openrouter_api_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.officefinder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OfficeFinderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.officefinder/officefinder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OfficeFinderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        OfficeFinderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OfficeFinderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OfficeFinderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OfficeFinderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve both API keys from the env vars named in the config.
pub fn validate_api_keys(config: &AppConfig) -> Result<ApiCredentials> {
    Ok(ApiCredentials {
        serper_api_key: read_key(&config.serper.api_key_env, "Serper", "https://serper.dev")?,
        openrouter_api_key: read_key(
            &config.openrouter.api_key_env,
            "OpenRouter",
            "https://openrouter.ai/keys",
        )?,
    })
}

fn read_key(var_name: &str, service: &str, signup: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(OfficeFinderError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable.\n\
             Get a key at {signup}"
        ))),
    }
}
