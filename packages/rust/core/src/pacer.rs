//! Fixed delay between records.

use std::time::Duration;

use tracing::debug;

/// Waits a fixed interval between one record and the next.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleep for the configured delay.
    pub async fn pace(&self) {
        if self.delay.is_zero() {
            return;
        }
        debug!(delay_ms = self.delay.as_millis() as u64, "pacing");
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_the_full_delay() {
        let pacer = Pacer::new(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_returns_immediately() {
        let pacer = Pacer::new(Duration::ZERO);
        let start = tokio::time::Instant::now();
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
