//! Run orchestration
//!
//! One run launches the command, then drives these tasks until it exits:
//! - stream relays for teed stdout/stderr
//! - a signal forwarder
//! - the sampler, which owns the whole-run statistics
//! - the aggregator, which owns the open report interval and the usage log
//! - the system facts providers
//!
//! After the child exits the sampler is cancelled and every task is joined
//! before the summary and info record are written.

use chrono::{DateTime, Local};
use duct_core::constants::{DUCT_VERSION, SCHEMA_VERSION};
use duct_core::{Error, ExecutionSummary, Result, RunConfig, SystemInfo};
use duct_logs::{spawn_relay, LogPaths, RetentionPolicy, StreamPlan, UsageLog};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::spawn_aggregator;
use crate::facts::{default_providers, gather_facts, SystemFacts, SystemFactsProvider};
use crate::launcher::{exit_code_from_status, Launcher};
use crate::sampler::{spawn_sampler, SysinfoSource};
use crate::signals::spawn_signal_forwarder;
use crate::stats::RunStats;

/// Samples in flight between the sampler and the aggregator
const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code the wrapper should report
    pub exit_code: i32,
    pub summary: ExecutionSummary,
    pub paths: LogPaths,
    /// Whether the retention policy deleted the run's logs
    pub logs_removed: bool,
}

/// Contents of `<prefix>info.json`
#[derive(Debug, Serialize)]
pub struct InfoRecord {
    pub command: String,
    pub system: SystemInfo,
    pub env: BTreeMap<String, String>,
    pub duct_version: String,
    pub schema_version: String,
    pub execution_summary: ExecutionSummary,
    pub output_paths: LogPaths,
    pub working_directory: String,
    pub message: String,
}

impl InfoRecord {
    pub fn new(facts: SystemFacts, summary: &ExecutionSummary, paths: &LogPaths, message: &str) -> Self {
        Self {
            command: summary.command.clone(),
            system: facts.system,
            env: facts.env,
            duct_version: DUCT_VERSION.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            execution_summary: summary.clone(),
            output_paths: paths.clone(),
            working_directory: summary.working_directory.clone(),
            message: message.to_string(),
        }
    }

    /// Written once, at the end of the run
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Background tasks of one run
struct RunTasks {
    cancel: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
    sampler: JoinHandle<RunStats>,
    aggregator: JoinHandle<Result<u64>>,
    relays: Vec<JoinHandle<Result<u64>>>,
}

impl RunTasks {
    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    /// Join every task once the command has exited: the sampler first, so the
    /// aggregator sees its last sample, then the relays draining the pipes.
    async fn join(mut self) -> Result<(RunStats, u64)> {
        self.stop();
        let stats = self.sampler.await.map_err(task_failed)?;
        let num_reports = self.aggregator.await.map_err(task_failed)??;
        for relay in self.relays {
            relay.await.map_err(task_failed)??;
        }
        Ok((stats, num_reports))
    }

    /// Tear everything down when the command's fate is unknown
    async fn shutdown(mut self) {
        self.stop();
        for relay in &self.relays {
            relay.abort();
        }
        if let Err(e) = self.sampler.await {
            debug!("Sampler ended abnormally: {}", e);
        }
        match self.aggregator.await {
            Ok(Err(e)) => warn!("Failed to flush usage log: {}", e),
            Err(e) => debug!("Aggregator ended abnormally: {}", e),
            Ok(Ok(_)) => {}
        }
    }
}

fn task_failed(e: JoinError) -> Error {
    Error::TaskFailed(e.to_string())
}

fn epoch_seconds(time: &DateTime<Local>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Run `command` under monitoring with the default system facts providers
pub async fn execute(config: &RunConfig, command: &str, args: &[String]) -> Result<RunOutcome> {
    execute_with(config, command, args, default_providers()).await
}

pub async fn execute_with(
    config: &RunConfig,
    command: &str,
    args: &[String],
    providers: Vec<Box<dyn SystemFactsProvider>>,
) -> Result<RunOutcome> {
    config.validate()?;
    let launcher = Launcher::new(command, args.to_vec(), config.mode);
    launcher.prepare()?;

    let paths = LogPaths::create(&config.output_prefix, std::process::id())?;
    paths.prepare(config.clobber)?;
    info!("duct {} is executing '{}'", DUCT_VERSION, launcher.command_string());
    info!("Log files will be written to {}", paths.prefix);

    let facts_task = config
        .record_types
        .has_system_summary()
        .then(|| tokio::spawn(gather_facts(providers)));

    let plan = StreamPlan::open(config.capture_outputs, config.outputs, &paths)?;
    let usage_log = if config.record_types.has_processes_samples() {
        Some(UsageLog::create(paths.usage.clone())?)
    } else {
        None
    };
    let working_directory = std::env::current_dir()?.display().to_string();

    let (stdout, stdout_capture) = plan.stdout.into_stdio();
    let (stderr, stderr_capture) = plan.stderr.into_stdio();

    let start_time = Local::now();
    let started = Instant::now();
    let mut running = match launcher.start(stdout, stderr) {
        Ok(running) => running,
        Err(e) => {
            if let Err(cleanup) = paths.remove_all() {
                warn!("Failed to remove logs of unstarted command: {}", cleanup);
            }
            return Err(e);
        }
    };

    let mut relays = Vec::new();
    if let (Some(file), Some(pipe)) = (stdout_capture, running.child.stdout.take()) {
        relays.push(spawn_relay("stdout", pipe, file, tokio::io::stdout()));
    }
    if let (Some(file), Some(pipe)) = (stderr_capture, running.child.stderr.take()) {
        relays.push(spawn_relay("stderr", pipe, file, tokio::io::stderr()));
    }

    let forwarder = match spawn_signal_forwarder(running.pid) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Signals will not be forwarded to the command: {}", e);
            None
        }
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
    let aggregator = spawn_aggregator(rx, Duration::from_secs_f64(config.report_interval), usage_log);
    let sampler = spawn_sampler(
        SysinfoSource::new(running.session_id),
        Duration::from_secs_f64(config.sample_interval),
        started,
        Some(tx),
        cancel.clone(),
    );
    let tasks = RunTasks {
        cancel,
        forwarder,
        sampler,
        aggregator,
        relays,
    };

    let status = match running.child.wait().await {
        Ok(status) => status,
        Err(e) => {
            tasks.shutdown().await;
            return Err(e.into());
        }
    };
    let wall_clock_time = started.elapsed().as_secs_f64();
    let end_time = Local::now();
    let exit_code = exit_code_from_status(status);
    debug!("Command exited with {} after {:.3}s", status, wall_clock_time);

    let (stats, num_reports) = tasks.join().await?;

    let mut summary = ExecutionSummary {
        exit_code: Some(exit_code),
        command: launcher.command_string(),
        logs_prefix: paths.prefix.clone(),
        wall_clock_time: Some(wall_clock_time),
        num_reports,
        start_time: Some(epoch_seconds(&start_time)),
        end_time: Some(epoch_seconds(&end_time)),
        working_directory,
        ..Default::default()
    };
    stats.apply_to(&mut summary);

    if let Some(task) = facts_task {
        let facts = task.await.map_err(task_failed)?;
        InfoRecord::new(facts, &summary, &paths, &config.message).write(&paths.info)?;
    }

    let policy = RetentionPolicy::new(config.fail_time);
    let logs_removed = policy.should_remove(exit_code, wall_clock_time);
    if logs_removed {
        let removed = paths.remove_all()?;
        info!(
            "Removed {} log files: command failed in {:.2}s, under fail-time {}s",
            removed.len(),
            wall_clock_time,
            config.fail_time
        );
    }

    Ok(RunOutcome {
        exit_code,
        summary,
        paths,
        logs_removed,
    })
}
