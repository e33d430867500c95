//! Core types for duct

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Kernel threads and processes whose argv is unavailable show up as `[name]`
static KERNEL_ABBREVIATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[.+\]").expect("Invalid kernel abbreviation regex"));

/// Which of the child's standard streams a setting applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outputs {
    #[default]
    All,
    None,
    Stdout,
    Stderr,
}

impl Outputs {
    pub const CHOICES: &'static str = "all, none, stdout, stderr";

    pub fn has_stdout(&self) -> bool {
        matches!(self, Outputs::All | Outputs::Stdout)
    }

    pub fn has_stderr(&self) -> bool {
        matches!(self, Outputs::All | Outputs::Stderr)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outputs::All => "all",
            Outputs::None => "none",
            Outputs::Stdout => "stdout",
            Outputs::Stderr => "stderr",
        }
    }
}

impl FromStr for Outputs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Outputs::All),
            "none" => Ok(Outputs::None),
            "stdout" => Ok(Outputs::Stdout),
            "stderr" => Ok(Outputs::Stderr),
            _ => Err(Error::InvalidChoice {
                option: "outputs",
                value: s.to_string(),
                expected: Self::CHOICES,
            }),
        }
    }
}

impl std::fmt::Display for Outputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which records a run produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecordTypes {
    #[default]
    All,
    SystemSummary,
    ProcessesSamples,
}

impl RecordTypes {
    pub const CHOICES: &'static str = "all, system-summary, processes-samples";

    pub fn has_system_summary(&self) -> bool {
        matches!(self, RecordTypes::All | RecordTypes::SystemSummary)
    }

    pub fn has_processes_samples(&self) -> bool {
        matches!(self, RecordTypes::All | RecordTypes::ProcessesSamples)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTypes::All => "all",
            RecordTypes::SystemSummary => "system-summary",
            RecordTypes::ProcessesSamples => "processes-samples",
        }
    }
}

impl FromStr for RecordTypes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(RecordTypes::All),
            "system-summary" => Ok(RecordTypes::SystemSummary),
            "processes-samples" => Ok(RecordTypes::ProcessesSamples),
            _ => Err(Error::InvalidChoice {
                option: "record-types",
                value: s.to_string(),
                expected: Self::CHOICES,
            }),
        }
    }
}

impl std::fmt::Display for RecordTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the command gets its own session or shares the wrapper's
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    #[default]
    NewSession,
    CurrentSession,
}

impl SessionMode {
    pub const CHOICES: &'static str = "new-session, current-session";

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::NewSession => "new-session",
            SessionMode::CurrentSession => "current-session",
        }
    }
}

impl FromStr for SessionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "new-session" => Ok(SessionMode::NewSession),
            "current-session" => Ok(SessionMode::CurrentSession),
            _ => Err(Error::InvalidChoice {
                option: "mode",
                value: s.to_string(),
                expected: Self::CHOICES,
            }),
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resource usage of one process, either from a single poll or the maxima
/// over several polls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessStats {
    /// %CPU
    pub pcpu: f64,
    /// %MEM
    pub pmem: f64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Virtual memory size in bytes
    pub vsz: u64,
    pub timestamp: String,
    /// Elapsed time since process start, `[[dd-]hh:]mm:ss`
    pub etime: String,
    /// Count of state letters observed
    pub stat: BTreeMap<String, u32>,
    pub cmd: String,
}

impl ProcessStats {
    /// Combine with a later observation of the same process.
    ///
    /// Numeric fields keep their maxima; etime always takes the latest value.
    pub fn aggregate(&self, other: &ProcessStats) -> ProcessStats {
        let cmd = if self.cmd != other.cmd && KERNEL_ABBREVIATION.is_match(&self.cmd) {
            other.cmd.clone()
        } else {
            self.cmd.clone()
        };

        let mut stat = self.stat.clone();
        for (state, count) in &other.stat {
            *stat.entry(state.clone()).or_insert(0) += count;
        }

        ProcessStats {
            pcpu: self.pcpu.max(other.pcpu),
            pmem: self.pmem.max(other.pmem),
            rss: self.rss.max(other.rss),
            vsz: self.vsz.max(other.vsz),
            timestamp: std::cmp::max(&self.timestamp, &other.timestamp).clone(),
            etime: other.etime.clone(),
            stat,
            cmd,
        }
    }
}

/// Sum of usage across processes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub pmem: f64,
    pub pcpu: f64,
    pub rss: u64,
    pub vsz: u64,
}

impl Totals {
    fn add(&mut self, stats: &ProcessStats) {
        self.pmem += stats.pmem;
        self.pcpu += stats.pcpu;
        self.rss += stats.rss;
        self.vsz += stats.vsz;
    }

    /// Field-wise maximum
    pub fn max(&self, other: &Totals) -> Totals {
        Totals {
            pmem: self.pmem.max(other.pmem),
            pcpu: self.pcpu.max(other.pcpu),
            rss: self.rss.max(other.rss),
            vsz: self.vsz.max(other.vsz),
        }
    }
}

/// Running means of per-sample totals
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Averages {
    pub rss: Option<f64>,
    pub vsz: Option<f64>,
    pub pmem: Option<f64>,
    pub pcpu: Option<f64>,
    pub num_samples: u64,
}

impl Averages {
    pub fn update(&mut self, totals: &Totals) {
        self.num_samples += 1;
        let n = self.num_samples as f64;
        let step = |avg: Option<f64>, value: f64| match avg {
            Some(avg) => Some(avg + (value - avg) / n),
            None => Some(value),
        };
        self.rss = step(self.rss, totals.rss as f64);
        self.vsz = step(self.vsz, totals.vsz as f64);
        self.pmem = step(self.pmem, totals.pmem);
        self.pcpu = step(self.pcpu, totals.pcpu);
    }
}

/// One poll of the session's processes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub stats: BTreeMap<u32, ProcessStats>,
    pub totals: Totals,
    /// Timestamp of the latest process record
    pub timestamp: String,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a process seen in this poll
    pub fn add_pid(&mut self, pid: u32, stats: ProcessStats) {
        self.totals.add(&stats);
        if stats.timestamp > self.timestamp {
            self.timestamp = stats.timestamp.clone();
        }
        self.stats.insert(pid, stats);
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Fold a later sample into this one: per-process maxima, maxima of
    /// totals, latest timestamp.
    pub fn merge(&mut self, other: &Sample) {
        for (pid, theirs) in &other.stats {
            let merged = match self.stats.get(pid) {
                Some(mine) => mine.aggregate(theirs),
                None => theirs.clone(),
            };
            self.stats.insert(*pid, merged);
        }
        self.totals = self.totals.max(&other.totals);
        if other.timestamp > self.timestamp {
            self.timestamp = other.timestamp.clone();
        }
    }
}

/// One line of usage.jsonl
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub timestamp: String,
    pub num_samples: u64,
    pub processes: BTreeMap<u32, ProcessStats>,
    pub totals: Totals,
    pub averages: Averages,
}

/// One GPU as reported by nvidia-smi
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuInfo {
    pub index: String,
    pub name: String,
    pub bus_id: String,
    pub driver_version: String,
    #[serde(rename = "memory.total")]
    pub memory_total: String,
    pub compute_mode: String,
}

/// Static facts about the host, resolved once per run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    pub cpu_total: usize,
    pub memory_total: u64,
    pub hostname: Option<String>,
    pub uid: u32,
    pub user: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<Vec<GpuInfo>>,
}

/// Whole-run resource summary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub exit_code: Option<i32>,
    pub command: String,
    pub logs_prefix: String,
    pub wall_clock_time: Option<f64>,
    pub peak_rss: Option<u64>,
    pub average_rss: Option<f64>,
    pub peak_vsz: Option<u64>,
    pub average_vsz: Option<f64>,
    pub peak_pmem: Option<f64>,
    pub average_pmem: Option<f64>,
    pub peak_pcpu: Option<f64>,
    pub average_pcpu: Option<f64>,
    pub num_samples: u64,
    pub num_reports: u64,
    /// Seconds since the Unix epoch
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub working_directory: String,
}

/// Current local time in ISO 8601 with microseconds and UTC offset
pub fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
}

/// Format elapsed seconds the way `ps -o etime` does: `[[dd-]hh:]mm:ss`
pub fn format_etime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
