//! Usage log writer (JSON Lines, one report per line)

use duct_core::{Report, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only writer for `<prefix>usage.jsonl`
pub struct UsageLog {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

impl UsageLog {
    /// Create (or truncate) the usage log
    pub fn create(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Append one sealed report and flush it to disk
    pub fn append(&mut self, report: &Report) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records += 1;
        debug!(
            records = self.records,
            num_samples = report.num_samples,
            "appended usage report"
        );
        Ok(())
    }

    /// Get the log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of reports written so far
    pub fn records(&self) -> u64 {
        self.records
    }
}
