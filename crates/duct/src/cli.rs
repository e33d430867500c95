//! CLI argument definitions

use clap::Parser;
use duct_core::{ConfigLayer, Outputs, RecordTypes, SessionMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "duct")]
#[command(version, about = "Run a command in its own session and record its resource usage")]
pub struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// File path prefix for logs; supports {datetime} and {pid}
    #[arg(short = 'p', long)]
    pub output_prefix: Option<String>,

    /// Template for the execution summary printed at the end
    #[arg(long)]
    pub summary_format: Option<String>,

    /// Colorize the execution summary
    #[arg(long)]
    pub colors: bool,

    /// Overwrite log files left by a previous run
    #[arg(long)]
    pub clobber: bool,

    /// Seconds between process samples
    #[arg(long, visible_alias = "s-i")]
    pub sample_interval: Option<f64>,

    /// Seconds between usage reports; must not be shorter than the sample interval
    #[arg(long, visible_alias = "r-i")]
    pub report_interval: Option<f64>,

    /// Seconds under which a failed run's logs are deleted (0 never, negative always)
    #[arg(long, visible_alias = "f-t", allow_negative_numbers = true)]
    pub fail_time: Option<f64>,

    /// Streams to capture into files [all, none, stdout, stderr]
    #[arg(short = 'c', long)]
    pub capture_outputs: Option<Outputs>,

    /// Streams to show on the terminal [all, none, stdout, stderr]
    #[arg(short = 'o', long)]
    pub outputs: Option<Outputs>,

    /// Records to write [all, system-summary, processes-samples]
    #[arg(short = 't', long)]
    pub record_types: Option<RecordTypes>,

    /// Free-text note stored in info.json
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    /// Run in a new session or the current one [new-session, current-session]
    #[arg(long)]
    pub mode: Option<SessionMode>,

    /// NONE, CRITICAL, ERROR, WARNING, INFO or DEBUG
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Deprecated, same as --log-level NONE
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Settings given explicitly on the command line
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            output_prefix: self.output_prefix.clone(),
            sample_interval: self.sample_interval,
            report_interval: self.report_interval,
            fail_time: self.fail_time,
            capture_outputs: self.capture_outputs,
            outputs: self.outputs,
            record_types: self.record_types,
            mode: self.mode,
            message: self.message.clone(),
            clobber: self.clobber.then_some(true),
            colors: self.colors.then_some(true),
            summary_format: self.summary_format.clone(),
            log_level: if self.quiet {
                Some("NONE".to_string())
            } else {
                self.log_level.clone()
            },
        }
    }

    /// Program and its arguments
    pub fn split_command(&self) -> (&str, &[String]) {
        match self.command.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => ("", &[]),
        }
    }
}
