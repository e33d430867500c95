//! Whole-run peak and average statistics

use duct_core::{Averages, ExecutionSummary, Sample, Totals};

/// Running extrema over every sample of a run.
///
/// Owned by the sampling task; nothing else mutates it while the run is live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    peaks: Option<Totals>,
    averages: Averages,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sample: &Sample) {
        self.peaks = Some(match &self.peaks {
            Some(peaks) => peaks.max(&sample.totals),
            None => sample.totals,
        });
        self.averages.update(&sample.totals);
    }

    pub fn num_samples(&self) -> u64 {
        self.averages.num_samples
    }

    pub fn peaks(&self) -> Option<&Totals> {
        self.peaks.as_ref()
    }

    /// Copy peaks, averages and the sample count into a summary
    pub fn apply_to(&self, summary: &mut ExecutionSummary) {
        summary.num_samples = self.num_samples();
        if let Some(peaks) = &self.peaks {
            summary.peak_rss = Some(peaks.rss);
            summary.peak_vsz = Some(peaks.vsz);
            summary.peak_pmem = Some(peaks.pmem);
            summary.peak_pcpu = Some(peaks.pcpu);
        }
        summary.average_rss = self.averages.rss;
        summary.average_vsz = self.averages.vsz;
        summary.average_pmem = self.averages.pmem;
        summary.average_pcpu = self.averages.pcpu;
    }
}
