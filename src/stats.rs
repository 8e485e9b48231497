//! Per-pass bookkeeping: how often each pass ran, succeeded, failed, and
//! how long it spent doing so.

use std::collections::HashMap;
use std::time;

/// The counters for one pass identity.
#[derive(Clone, Debug, Default)]
pub struct SinglePassStatistic {
    /// Accumulated wall-clock seconds spent inside this pass.
    pub total_seconds: f64,
    /// Transformations that passed the interestingness test.
    pub worked: usize,
    /// Transformations that failed, or didn't interest the test.
    pub failed: usize,
    /// Candidate jobs submitted on this pass's behalf.
    pub totally_executed: usize,
}

/// The statistics accumulator. Lives in the engine and is only ever touched
/// from the engine thread; workers report back to the engine, which updates
/// the counters.
#[derive(Debug, Default)]
pub struct PassStatistic {
    stats: HashMap<String, SinglePassStatistic>,
    running: HashMap<String, time::Instant>,
}

impl PassStatistic {
    /// Construct an empty accumulator.
    pub fn new() -> PassStatistic {
        Default::default()
    }

    /// Note that the named pass just started running on a test case.
    pub fn start(&mut self, pass: &str) {
        self.stats.entry(pass.to_string()).or_insert_with(
            Default::default,
        );
        self.running.insert(pass.to_string(), time::Instant::now());
    }

    /// Note that the named pass finished; fold the elapsed time in.
    pub fn stop(&mut self, pass: &str) {
        if let Some(started) = self.running.remove(pass) {
            let elapsed = started.elapsed();
            let seconds =
                elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) / 1_000_000_000.0;
            self.entry(pass).total_seconds += seconds;
        }
    }

    /// Count one candidate job submitted for the named pass.
    pub fn add_executed(&mut self, pass: &str) {
        self.entry(pass).totally_executed += 1;
    }

    /// Count one accepted transformation for the named pass.
    pub fn add_success(&mut self, pass: &str) {
        self.entry(pass).worked += 1;
    }

    /// Count one rejected or failed transformation for the named pass.
    pub fn add_failure(&mut self, pass: &str) {
        self.entry(pass).failed += 1;
    }

    fn entry(&mut self, pass: &str) -> &mut SinglePassStatistic {
        self.stats.entry(pass.to_string()).or_insert_with(
            Default::default,
        )
    }

    /// All per-pass counters, most time-consuming pass first.
    pub fn sorted_results(&self) -> Vec<(&str, &SinglePassStatistic)> {
        let mut results: Vec<_> = self.stats.iter().map(|(k, v)| (k.as_str(), v)).collect();
        results.sort_by(|a, b| {
            b.1
                .total_seconds
                .partial_cmp(&a.1.total_seconds)
                .unwrap_or(::std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });
        results
    }

    /// Log every pass's counters at debug level.
    pub fn log_summary(&self) {
        debug!("pass statistics:");
        for (name, stat) in self.sorted_results() {
            debug!(
                "  {}: {:.1}s, {} executed, {} worked, {} failed",
                name,
                stat.total_seconds,
                stat.totally_executed,
                stat.worked,
                stat.failed
            );
        }
    }
}
