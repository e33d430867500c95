//! Periodic sampling of the processes in the monitored session

use duct_core::{format_etime, now_iso, ProcessStats, Result, Sample};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use sysinfo::{ProcessStatus, System};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stats::RunStats;

/// Something that can list the processes of the monitored session
pub trait ProcessSource: Send {
    /// One poll. Processes that vanish mid-poll are simply absent.
    fn poll(&mut self) -> Result<Vec<(u32, ProcessStats)>>;
}

/// Process table reader backed by sysinfo, filtered by session id
pub struct SysinfoSource {
    system: System,
    session_id: u32,
    exclude_pid: u32,
    total_memory: u64,
}

impl SysinfoSource {
    pub fn new(session_id: u32) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        // baseline so that CPU usage on the first tick has something to compare with
        system.refresh_processes();
        let total_memory = system.total_memory();
        Self {
            system,
            session_id,
            exclude_pid: std::process::id(),
            total_memory,
        }
    }
}

impl ProcessSource for SysinfoSource {
    fn poll(&mut self) -> Result<Vec<(u32, ProcessStats)>> {
        self.system.refresh_processes();
        let timestamp = now_iso();

        // threads show up as their own entries on some platforms
        let mut threads = HashSet::new();
        for (pid, process) in self.system.processes() {
            if let Some(tasks) = process.tasks() {
                threads.extend(tasks.iter().filter(|tid| *tid != pid).map(|tid| tid.as_u32()));
            }
        }

        let mut found = Vec::new();
        for (pid, process) in self.system.processes() {
            let pid = pid.as_u32();
            if pid == self.exclude_pid || threads.contains(&pid) {
                continue;
            }
            match process.session_id() {
                Some(sid) if sid.as_u32() == self.session_id => {}
                _ => continue,
            }

            let cmd = if process.cmd().is_empty() {
                format!("[{}]", process.name())
            } else {
                process.cmd().join(" ")
            };
            let pmem = if self.total_memory > 0 {
                process.memory() as f64 / self.total_memory as f64 * 100.0
            } else {
                0.0
            };

            found.push((
                pid,
                ProcessStats {
                    pcpu: process.cpu_usage() as f64,
                    pmem,
                    rss: process.memory(),
                    vsz: process.virtual_memory(),
                    timestamp: timestamp.clone(),
                    etime: format_etime(process.run_time()),
                    stat: BTreeMap::from([(status_letter(process.status()).to_string(), 1)]),
                    cmd,
                },
            ));
        }
        Ok(found)
    }
}

/// Map a process status to the letter `ps` prints for it
pub fn status_letter(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "R",
        ProcessStatus::Sleep => "S",
        ProcessStatus::Idle => "I",
        ProcessStatus::Zombie => "Z",
        ProcessStatus::Stop => "T",
        ProcessStatus::Tracing => "t",
        ProcessStatus::Dead => "X",
        ProcessStatus::UninterruptibleDiskSleep => "D",
        ProcessStatus::Wakekill => "K",
        ProcessStatus::Waking => "W",
        ProcessStatus::Parked => "P",
        ProcessStatus::LockBlocked => "L",
        _ => "?",
    }
}

/// Poll `source` right away, then every `period`, until cancelled or the
/// session is empty.
///
/// Each sample goes to `tx` (when present) stamped with the time elapsed
/// since `started`. Resolves to the whole-run statistics.
pub fn spawn_sampler<S>(
    mut source: S,
    period: Duration,
    started: Instant,
    tx: Option<mpsc::Sender<(Duration, Sample)>>,
    cancel: CancellationToken,
) -> JoinHandle<RunStats>
where
    S: ProcessSource + 'static,
{
    tokio::spawn(async move {
        let mut stats = RunStats::new();
        let mut ticker = tokio::time::interval_at(started, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let processes = match source.poll() {
                Ok(processes) => processes,
                Err(e) => {
                    warn!("Failed to sample processes, retrying next tick: {}", e);
                    continue;
                }
            };
            if processes.is_empty() {
                debug!("No processes left in the session, sampling stops");
                break;
            }

            let mut sample = Sample::new();
            for (pid, stats) in processes {
                sample.add_pid(pid, stats);
            }

            stats.update(&sample);
            if let Some(tx) = &tx {
                if tx.send((started.elapsed(), sample)).await.is_err() {
                    warn!("Report aggregator stopped, sampling stops");
                    break;
                }
            }
        }

        debug!(num_samples = stats.num_samples(), "sampler finished");
        stats
    })
}
