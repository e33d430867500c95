//! Report aggregation: buckets samples into report intervals

use duct_core::{Averages, Report, Result, Sample};
use duct_logs::UsageLog;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Accumulator for the currently open report interval
#[derive(Debug, Default)]
pub struct ReportAccumulator {
    merged: Option<Sample>,
    averages: Averages,
}

impl ReportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: &Sample) {
        match &mut self.merged {
            Some(merged) => merged.merge(sample),
            None => self.merged = Some(sample.clone()),
        }
        self.averages.update(&sample.totals);
    }

    pub fn num_samples(&self) -> u64 {
        self.averages.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_none()
    }

    /// Close the interval and start a fresh one. Empty intervals yield nothing.
    pub fn seal(&mut self) -> Option<Report> {
        let merged = self.merged.take()?;
        let averages = std::mem::take(&mut self.averages);
        Some(Report {
            timestamp: merged.timestamp,
            num_samples: averages.num_samples,
            processes: merged.stats,
            totals: merged.totals,
            averages,
        })
    }
}

/// Decides when intervals close, based on time elapsed since run start
#[derive(Debug)]
pub struct Aggregator {
    accumulator: ReportAccumulator,
    report_interval: Duration,
    next_boundary: Duration,
}

impl Aggregator {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            accumulator: ReportAccumulator::new(),
            report_interval,
            next_boundary: report_interval,
        }
    }

    /// Add a sample taken `elapsed` after run start; returns the sealed report
    /// when this sample reaches the interval boundary.
    pub fn push(&mut self, elapsed: Duration, sample: &Sample) -> Option<Report> {
        self.accumulator.add(sample);
        if elapsed < self.next_boundary {
            return None;
        }
        // skip over intervals in which nothing was sampled
        let passed = (elapsed.as_secs_f64() / self.report_interval.as_secs_f64()).floor() as u32;
        self.next_boundary = self.report_interval * (passed + 1);
        self.accumulator.seal()
    }

    /// Seal the final, possibly partial, interval
    pub fn finish(&mut self) -> Option<Report> {
        self.accumulator.seal()
    }
}

/// Consume samples until the sender side closes, appending reports to the
/// usage log as intervals close. Resolves to the number of reports written.
pub fn spawn_aggregator(
    mut rx: mpsc::Receiver<(Duration, Sample)>,
    report_interval: Duration,
    mut log: Option<UsageLog>,
) -> JoinHandle<Result<u64>> {
    tokio::spawn(async move {
        let mut aggregator = Aggregator::new(report_interval);
        let mut reports = 0u64;

        while let Some((elapsed, sample)) = rx.recv().await {
            if let Some(report) = aggregator.push(elapsed, &sample) {
                debug!(num_samples = report.num_samples, "report interval closed");
                if let Some(log) = log.as_mut() {
                    log.append(&report)?;
                    reports += 1;
                }
            }
        }

        if let Some(report) = aggregator.finish() {
            if let Some(log) = log.as_mut() {
                log.append(&report)?;
                reports += 1;
            }
        }

        if let Some(log) = &log {
            info!("Wrote {} usage reports to {}", reports, log.path().display());
        }
        Ok(reports)
    })
}
