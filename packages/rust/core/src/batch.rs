//! Batch driver: resume from the ledger, resolve records in order, persist once.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use officefinder_ledger::{Ledger, LedgerEntry, load_master};
use officefinder_shared::{AddressResult, CompanyRecord, Resolution, ResolverConfig, Result};

use crate::pacer::Pacer;
use crate::pipeline::AddressPipeline;

/// Outcome counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Master position the run started at.
    pub offset: usize,
    /// Records attempted this run (capped by `max_records`).
    pub pending: usize,
    /// Records written to the ledger.
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    /// The run stopped early because an external quota was exhausted.
    pub halted_on_rate_limit: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting batch status.
pub trait BatchProgress: Send + Sync {
    /// Called once the pending slice is known.
    fn started(&self, offset: usize, pending: usize);
    /// Called before a record enters the pipeline.
    fn record_started(&self, position: usize, company: &CompanyRecord);
    /// Called with each record's result, including a rate-limited one.
    fn record_finished(&self, position: usize, company: &CompanyRecord, result: &AddressResult);
    /// Called when the ledger has been written.
    fn finished(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _offset: usize, _pending: usize) {}
    fn record_started(&self, _position: usize, _company: &CompanyRecord) {}
    fn record_finished(&self, _position: usize, _company: &CompanyRecord, _result: &AddressResult) {
    }
    fn finished(&self, _summary: &BatchSummary) {}
}

/// Run one batch.
///
/// 1. Load the master input and the ledger; compute the resume offset
/// 2. Resolve each pending record in order, pacing between records
/// 3. Stop at the first rate-limited record without recording it
/// 4. Append every completed record to the ledger in one write
#[instrument(skip_all, fields(run_id = %Uuid::now_v7()))]
pub async fn run_batch(
    config: &ResolverConfig,
    pipeline: &AddressPipeline,
    progress: &dyn BatchProgress,
) -> Result<BatchSummary> {
    let start = Instant::now();

    let master = load_master(&config.input_path)?;
    let mut ledger = Ledger::open(&config.ledger_path)?;
    let offset = ledger.resume_offset(config.default_skip);

    let remaining = master.get(offset..).unwrap_or_default();
    let pending = match config.max_records {
        Some(cap) => &remaining[..remaining.len().min(cap)],
        None => remaining,
    };

    info!(
        master = master.len(),
        ledger = ledger.len(),
        offset,
        pending = pending.len(),
        "starting batch"
    );
    progress.started(offset, pending.len());

    let pacer = Pacer::new(config.record_delay);
    let mut summary = BatchSummary {
        offset,
        pending: pending.len(),
        ..BatchSummary::default()
    };
    let mut entries = Vec::with_capacity(pending.len());

    for (i, company) in pending.iter().enumerate() {
        if i > 0 {
            pacer.pace().await;
        }

        let position = offset + i;
        progress.record_started(position, company);
        let result = pipeline.resolve(company).await;
        progress.record_finished(position, company, &result);

        match &result.resolution {
            Resolution::RateLimited => {
                warn!(
                    position,
                    company = %company.name,
                    "rate limit reached, stopping batch; this record will be retried next run"
                );
                summary.halted_on_rate_limit = true;
                break;
            }
            Resolution::Found { .. } => summary.found += 1,
            Resolution::NotFound => summary.not_found += 1,
            Resolution::Failed { reason } => {
                warn!(position, company = %company.name, %reason, "record failed");
                summary.failed += 1;
            }
        }

        entries.push(LedgerEntry::new(company.clone(), result));
    }

    ledger.append(&entries)?;
    summary.processed = entries.len();
    summary.elapsed = start.elapsed();

    progress.finished(&summary);

    info!(
        processed = summary.processed,
        found = summary.found,
        not_found = summary.not_found,
        failed = summary.failed,
        halted_on_rate_limit = summary.halted_on_rate_limit,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "batch complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::*;
    use crate::testing::{
        Page, Reply, StubFetcher, StubFormatter, StubProbe, StubResearch, hit, pipeline_with,
    };

    fn tmp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("of-batch-test-{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_master(dir: &Path, count: usize) -> PathBuf {
        let path = dir.join("companies.csv");
        let mut csv = String::from("Name,Website,Sector\n");
        for i in 0..count {
            csv.push_str(&format!("Company{i},https://company{i}.example,AI\n"));
        }
        fs::write(&path, csv).unwrap();
        path
    }

    fn config(dir: &Path, master_len: usize) -> ResolverConfig {
        ResolverConfig {
            input_path: write_master(dir, master_len),
            ledger_path: dir.join("ledger.csv"),
            default_skip: 21,
            country: "Netherlands".into(),
            record_delay: Duration::from_secs(2),
            max_records: None,
            rate_limit_indicators: vec!["rate limit".into()],
        }
    }

    /// Company3 is rate limited, everyone else gets nothing from search.
    fn research() -> std::sync::Arc<StubResearch> {
        StubResearch::new(|query| {
            if query.contains("Company3") {
                Reply::RateLimited
            } else {
                Reply::Hits(vec![])
            }
        })
    }

    fn pipeline() -> AddressPipeline {
        pipeline_with(
            &research(),
            &StubFormatter::new(&[]),
            &StubFetcher::new(vec![]),
            &StubProbe::new(false),
        )
    }

    #[derive(Default)]
    struct RecordingProgress {
        positions: Mutex<Vec<usize>>,
    }

    impl BatchProgress for RecordingProgress {
        fn started(&self, _offset: usize, _pending: usize) {}
        fn record_started(&self, position: usize, _company: &CompanyRecord) {
            self.positions.lock().unwrap().push(position);
        }
        fn record_finished(&self, _: usize, _: &CompanyRecord, _: &AddressResult) {}
        fn finished(&self, _summary: &BatchSummary) {}
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_run_starts_at_default_skip() {
        let dir = tmp_dir();
        let config = config(&dir, 24);
        let progress = RecordingProgress::default();

        let summary = run_batch(&config, &pipeline(), &progress).await.unwrap();

        assert_eq!(summary.offset, 21);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.not_found, 3);
        assert!(!summary.halted_on_rate_limit);
        assert_eq!(*progress.positions.lock().unwrap(), vec![21, 22, 23]);

        let entries = Ledger::open(&config.ledger_path).unwrap().entries().unwrap();
        assert_eq!(entries[0].company.name, "Company21");
        assert_eq!(
            entries[0].company.extra,
            vec![("Sector".to_string(), "AI".to_string())]
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn halts_on_rate_limit_without_recording_it() {
        let dir = tmp_dir();
        let config = config(&dir, 10);
        fs::write(
            &config.ledger_path,
            "Name,Website,address\nCompany0,https://company0.example,Address Not Found\n",
        )
        .unwrap();

        let summary = run_batch(&config, &pipeline(), &SilentProgress).await.unwrap();

        // Resumes at ledger length 1; Company3 halts the run.
        assert_eq!(summary.offset, 1);
        assert_eq!(summary.processed, 2);
        assert!(summary.halted_on_rate_limit);

        let ledger = Ledger::open(&config.ledger_path).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(load_resume_offset_for(&config), 3);

        let names: Vec<_> = ledger
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.company.name)
            .collect();
        assert_eq!(names, vec!["Company0", "Company1", "Company2"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn paces_between_records() {
        let dir = tmp_dir();
        let config = config(&dir, 24);
        let before = tokio::time::Instant::now();

        run_batch(&config, &pipeline(), &SilentProgress).await.unwrap();

        // Three records, two pauses.
        assert!(before.elapsed() >= Duration::from_secs(4));
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn max_records_caps_the_run() {
        let dir = tmp_dir();
        let mut config = config(&dir, 30);
        config.max_records = Some(2);

        let summary = run_batch(&config, &pipeline(), &SilentProgress).await.unwrap();

        assert_eq!(summary.pending, 2);
        assert_eq!(summary.processed, 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_master_writes_nothing() {
        let dir = tmp_dir();
        let config = config(&dir, 5);

        let summary = run_batch(&config, &pipeline(), &SilentProgress).await.unwrap();

        assert_eq!(summary.pending, 0);
        assert!(!config.ledger_path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn found_and_failed_are_counted() {
        let dir = tmp_dir();
        let mut config = config(&dir, 3);
        config.default_skip = 0;

        let research = StubResearch::new(|query| {
            if query.contains("Company0") && query.contains("Keizersgracht 1, 1015 AB Amsterdam") {
                Reply::Hits(vec![hit(
                    "Company0",
                    "Company0, Keizersgracht 1, 1015 AB Amsterdam",
                    "https://company0.example",
                )])
            } else if query.contains("Company0") {
                Reply::Hits(vec![hit("Company0", "Office Keizersgracht 1", "https://x.example")])
            } else if query.contains("Company1") {
                Reply::Fail("connection reset")
            } else {
                Reply::Hits(vec![])
            }
        });
        let pipeline = pipeline_with(
            &research,
            &StubFormatter::new(&[("Keizersgracht", "Keizersgracht 1, 1015 AB Amsterdam")]),
            &StubFetcher::new(vec![]),
            &StubProbe::new(false),
        );

        let summary = run_batch(&config, &pipeline, &SilentProgress).await.unwrap();

        assert_eq!((summary.found, summary.failed, summary.not_found), (1, 1, 1));
        let entries = Ledger::open(&config.ledger_path).unwrap().entries().unwrap();
        assert!(matches!(entries[1].result.resolution, Resolution::Failed { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_company_site_does_not_halt_the_batch() {
        let dir = tmp_dir();
        let mut config = config(&dir, 3);
        config.default_skip = 0;

        let research = StubResearch::new(|_| Reply::Hits(vec![]));
        let fetcher = StubFetcher::new(vec![("https://company0.example/", Page::Status(429))]);
        let pipeline = pipeline_with(
            &research,
            &StubFormatter::new(&[]),
            &fetcher,
            &StubProbe::new(true),
        );

        let first = run_batch(&config, &pipeline, &SilentProgress).await.unwrap();
        assert!(!first.halted_on_rate_limit);
        assert_eq!(first.processed, 3);
        assert_eq!(first.not_found, 3);
        assert!(fetcher.fetched("https://company2.example/"));

        let second = run_batch(&config, &pipeline, &SilentProgress).await.unwrap();
        assert_eq!(second.offset, 3);
        assert_eq!(second.processed, 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_master_is_an_error() {
        let dir = tmp_dir();
        let mut config = config(&dir, 1);
        config.input_path = dir.join("absent.csv");

        assert!(run_batch(&config, &pipeline(), &SilentProgress).await.is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    fn load_resume_offset_for(config: &ResolverConfig) -> usize {
        officefinder_ledger::load_resume_offset(&config.ledger_path, config.default_skip).unwrap()
    }
}
