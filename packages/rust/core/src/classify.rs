//! Failure classification: rate limits versus everything else.

use officefinder_shared::OfficeFinderError;

/// How the pipeline treats an error raised by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// An external quota is exhausted. Stops the record and the batch.
    RateLimited,
    /// Any other error. Stops the record only.
    Transient(String),
}

/// Classify `err` using the lowercased rate-limit `indicators`.
///
/// The `RateLimited` variant always counts as a rate limit. Any other error
/// counts when its message contains one of the indicators.
pub fn classify(err: &OfficeFinderError, indicators: &[String]) -> Failure {
    if matches!(err, OfficeFinderError::RateLimited(_)) {
        return Failure::RateLimited;
    }

    let message = err.to_string();
    let lower = message.to_lowercase();
    if indicators
        .iter()
        .any(|needle| !needle.is_empty() && lower.contains(needle.as_str()))
    {
        Failure::RateLimited
    } else {
        Failure::Transient(message)
    }
}
