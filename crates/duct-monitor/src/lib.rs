//! duct monitor - runs a command in its own session and records its
//! resource usage

pub mod aggregator;
pub mod facts;
pub mod launcher;
pub mod run;
pub mod sampler;
pub mod signals;
pub mod stats;

pub use aggregator::{spawn_aggregator, Aggregator, ReportAccumulator};
pub use facts::{default_providers, gather_facts, GpuInventory, HostFacts, SchedulerEnv, SystemFacts, SystemFactsProvider};
pub use launcher::{exit_code_from_status, Launcher, RunningCommand};
pub use run::{execute, InfoRecord, RunOutcome};
pub use sampler::{spawn_sampler, ProcessSource, SysinfoSource};
pub use signals::{spawn_signal_forwarder, InterruptAction};
pub use stats::RunStats;
