//! Constants and default values for duct

use std::path::PathBuf;

/// Version of the info.json / usage.jsonl layout
pub const SCHEMA_VERSION: &str = "0.2.2";

/// Version recorded as `duct_version`
pub const DUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default output prefix template
pub const DEFAULT_OUTPUT_PREFIX: &str = ".duct/logs/{datetime}-{pid}_";

/// strftime format used for the `{datetime}` placeholder
pub const DATETIME_FILESAFE_FORMAT: &str = "%Y.%m.%dT%H.%M.%S";

/// Default seconds between process table polls
pub const DEFAULT_SAMPLE_INTERVAL: f64 = 1.0;

/// Default seconds per usage report
pub const DEFAULT_REPORT_INTERVAL: f64 = 60.0;

/// Default fail-time threshold in seconds
pub const DEFAULT_FAIL_TIME: f64 = 3.0;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Log file suffixes appended to the resolved prefix
pub const STDOUT_SUFFIX: &str = "stdout";
pub const STDERR_SUFFIX: &str = "stderr";
pub const USAGE_SUFFIX: &str = "usage.jsonl";
pub const INFO_SUFFIX: &str = "info.json";

/// Environment variables with these prefixes are recorded in info.json
pub const ENV_PREFIXES: &[&str] = &["PBS_", "SLURM_", "OSG"];

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "DUCT_CONFIG";

/// Environment variable listing dotenv files (colon separated)
pub const CONFIG_PATHS_ENV: &str = "DUCT_CONFIG_PATHS";

/// Config directory name under the user's config dir
pub const CONFIG_DIR: &str = "duct";

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &["duct.toml", "duct.yaml", "duct.yml", "duct.json"];

/// Shell convention for "command not found"
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Shell convention for "found but not executable"
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Offset added to a signal number when the child was killed by it
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Default summary printed after the run
pub const EXECUTION_SUMMARY_FORMAT: &str = "Summary:\n\
Exit Code: {exit_code!E}\n\
Command: {command}\n\
Log files location: {logs_prefix}\n\
Wall Clock Time: {wall_clock_time:.3f} sec\n\
Memory Peak Usage (RSS): {peak_rss!S}\n\
Memory Average Usage (RSS): {average_rss!S}\n\
Virtual Memory Peak Usage (VSZ): {peak_vsz!S}\n\
Virtual Memory Average Usage (VSZ): {average_vsz!S}\n\
Memory Peak Percentage: {peak_pmem:.2f!N}%\n\
Memory Average Percentage: {average_pmem:.2f!N}%\n\
CPU Peak Usage: {peak_pcpu:.2f!N}%\n\
Average CPU Usage: {average_pcpu:.2f!N}%\n";

/// Get the directory searched for config files
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR))
}
