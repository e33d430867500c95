//! Output prefix resolution and the set of files one run produces

use chrono::{DateTime, Local};
use duct_core::constants::*;
use duct_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid placeholder regex"));

/// Expand `{datetime}`, `{datetime_filesafe}` and `{pid}` in a prefix template
pub fn resolve_prefix(template: &str, pid: u32, now: DateTime<Local>) -> Result<String> {
    let datetime = now.format(DATETIME_FILESAFE_FORMAT).to_string();
    let mut unknown = None;

    let resolved = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures| match &caps[1] {
        // datetime_filesafe is a deprecated alias kept for old templates
        "datetime" | "datetime_filesafe" => datetime.clone(),
        "pid" => pid.to_string(),
        other => {
            unknown.get_or_insert_with(|| other.to_string());
            caps[0].to_string()
        }
    });

    if let Some(name) = unknown {
        return Err(Error::InvalidPrefix(format!(
            "unknown placeholder {{{}}} in '{}'; supported: {{datetime}}, {{pid}}",
            name, template
        )));
    }
    Ok(resolved.into_owned())
}

/// Paths of every file a run may produce
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub usage: PathBuf,
    pub info: PathBuf,
    pub prefix: String,
}

impl LogPaths {
    /// Resolve the template now, for the given wrapper pid
    pub fn create(template: &str, pid: u32) -> Result<Self> {
        let prefix = resolve_prefix(template, pid, Local::now())?;
        Ok(Self::from_prefix(prefix))
    }

    pub fn from_prefix(prefix: String) -> Self {
        Self {
            stdout: PathBuf::from(format!("{}{}", prefix, STDOUT_SUFFIX)),
            stderr: PathBuf::from(format!("{}{}", prefix, STDERR_SUFFIX)),
            usage: PathBuf::from(format!("{}{}", prefix, USAGE_SUFFIX)),
            info: PathBuf::from(format!("{}{}", prefix, INFO_SUFFIX)),
            prefix,
        }
    }

    /// All file paths, prefix excluded
    pub fn files(&self) -> [(&'static str, &Path); 4] {
        [
            ("stdout", self.stdout.as_path()),
            ("stderr", self.stderr.as_path()),
            ("usage", self.usage.as_path()),
            ("info", self.info.as_path()),
        ]
    }

    /// Refuse to overwrite existing logs unless clobbering, then create the
    /// directories the prefix needs.
    ///
    /// A prefix ending in a path separator names a directory; otherwise its
    /// last component is a file name stem.
    pub fn prepare(&self, clobber: bool) -> Result<()> {
        let conflicts: Vec<PathBuf> = self
            .files()
            .iter()
            .filter(|(_, path)| path.exists())
            .map(|(_, path)| path.to_path_buf())
            .collect();
        if !conflicts.is_empty() && !clobber {
            return Err(Error::ConflictingFiles(conflicts));
        }

        if self.prefix.ends_with(std::path::MAIN_SEPARATOR) || self.prefix.ends_with('/') {
            fs::create_dir_all(&self.prefix)?;
        } else if let Some(parent) = Path::new(&self.prefix).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Delete whichever of the run's files exist, returning what was removed
    pub fn remove_all(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for (name, path) in self.files() {
            if path.exists() {
                debug!("Removing {} log {}", name, path.display());
                fs::remove_file(path)?;
                removed.push(path.to_path_buf());
            }
        }
        Ok(removed)
    }
}
