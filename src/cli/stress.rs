//! `prompt-cache stress` handler.
//!
//! Drives one cache manager from several OS threads with a random mix of
//! lookups, stores and stats reads, checking the capacity bound after every
//! store.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use prompt_cache::{CacheManager, CacheStats, Config, LookupOutcome};

use super::StressArgs;

/// Per-run totals collected across workers.
#[derive(Debug, Default, Serialize)]
pub(crate) struct StressReport {
    pub lookups: u64,
    pub stores: u64,
    pub stats_reads: u64,
    pub capacity_errors: u64,
    /// Stores after which the cache held more than `max_entries`.
    pub bound_violations: u64,
    /// Workers that panicked; their operation counts are lost.
    pub panicked_workers: u64,
}

impl StressReport {
    fn merge(&mut self, other: StressReport) {
        self.lookups += other.lookups;
        self.stores += other.stores;
        self.stats_reads += other.stats_reads;
        self.capacity_errors += other.capacity_errors;
        self.bound_violations += other.bound_violations;
        self.panicked_workers += other.panicked_workers;
    }
}

#[derive(Serialize)]
struct StressOutput {
    report: StressReport,
    stats: CacheStats,
}

pub(crate) async fn cmd_stress(args: StressArgs) -> Result<()> {
    let mut config = Config::load().context("Failed to load cache config")?.cache;
    config.enabled = true;
    if let Some(max) = args.max_entries {
        config.max_entries = max;
    }
    if let Some(ttl) = args.ttl_secs {
        config.ttl_secs = ttl;
    }
    let max_entries = config.max_entries;
    let cache = CacheManager::new(config).context("Failed to start cache")?;

    info!(
        threads = args.threads,
        duration_ms = args.duration_ms,
        keys = args.keys,
        "Starting cache stress run"
    );

    let worker_cache = cache.clone();
    let report = tokio::task::spawn_blocking(move || run_workers(&worker_cache, &args, max_entries))
        .await
        .context("Stress workers panicked")?;

    let stats = cache.stats();
    cache.close();

    let violations = report.bound_violations;
    let panicked = report.panicked_workers;
    println!(
        "{}",
        serde_json::to_string_pretty(&StressOutput { report, stats })?
    );
    if panicked > 0 {
        bail!("{panicked} stress worker(s) panicked");
    }
    if violations > 0 {
        bail!("cache exceeded max_entries after {violations} store(s)");
    }
    Ok(())
}

fn run_workers(cache: &CacheManager, args: &StressArgs, max_entries: usize) -> StressReport {
    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    let keys = args.keys.max(1);

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..args.threads.max(1))
            .map(|_| scope.spawn(move || worker(cache, keys, max_entries, deadline)))
            .collect();
        collect_reports(workers.into_iter().map(|handle| handle.join()))
    })
}

/// Merge worker results, counting workers that panicked.
fn collect_reports<I>(results: I) -> StressReport
where
    I: IntoIterator<Item = std::thread::Result<StressReport>>,
{
    let mut total = StressReport::default();
    for result in results {
        match result {
            Ok(report) => total.merge(report),
            Err(_) => {
                warn!("Stress worker panicked");
                total.panicked_workers += 1;
            }
        }
    }
    total
}

fn worker(
    cache: &CacheManager,
    keys: usize,
    max_entries: usize,
    deadline: Instant,
) -> StressReport {
    let mut rng = rand::thread_rng();
    let mut report = StressReport::default();

    while Instant::now() < deadline {
        let prompt = format!("prompt-{}", rng.gen_range(0..keys));
        let payload: Option<Vec<u8>> = rng
            .gen_bool(0.25)
            .then(|| vec![rng.gen_range(0..4u8); 16]);
        let roll: f64 = rng.gen();

        if roll < 0.45 {
            report.lookups += 1;
            if let LookupOutcome::Disabled = cache.lookup(&prompt, payload.as_deref()) {
                break;
            }
        } else if roll < 0.9 {
            report.stores += 1;
            if cache
                .store(&prompt, payload.as_deref(), format!("response for {prompt}"))
                .is_err()
            {
                report.capacity_errors += 1;
            }
            if cache.len() > max_entries {
                report.bound_violations += 1;
            }
        } else {
            report.stats_reads += 1;
            let _ = cache.stats();
        }
    }

    report
}
