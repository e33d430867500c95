//! System facts recorded once per run
//!
//! Each provider fills in part of a [`SystemFacts`] snapshot. Providers run
//! once, concurrently with the launch of the command, and a failing provider
//! only leaves its part of the snapshot empty.

use async_trait::async_trait;
use duct_core::constants::ENV_PREFIXES;
use duct_core::{Error, GpuInfo, Result, SystemInfo};
use std::collections::{BTreeMap, HashMap};
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, warn};

const GPU_QUERY: &str = "index,name,pci.bus_id,driver_version,memory.total,compute_mode";

/// Immutable snapshot of host and scheduler facts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemFacts {
    pub system: SystemInfo,
    /// Scheduler environment variables
    pub env: BTreeMap<String, String>,
}

/// Source of one group of system facts
#[async_trait]
pub trait SystemFactsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn collect(&self, facts: &mut SystemFacts) -> Result<()>;
}

/// CPU, memory, host name, OS and user
pub struct HostFacts;

#[async_trait]
impl SystemFactsProvider for HostFacts {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn collect(&self, facts: &mut SystemFacts) -> Result<()> {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let cpu_total = match sys.cpus().len() {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        };

        let uid = nix::unistd::getuid();
        let user = std::env::var("USER").ok().or_else(|| {
            nix::unistd::User::from_uid(uid)
                .ok()
                .flatten()
                .map(|u| u.name)
        });

        let system = &mut facts.system;
        system.cpu_total = cpu_total;
        system.memory_total = sys.total_memory();
        system.hostname = System::host_name();
        system.uid = uid.as_raw();
        system.user = user;
        system.os_name = System::name();
        system.os_version = System::os_version();
        system.kernel_version = System::kernel_version();
        Ok(())
    }
}

/// Batch scheduler environment variables (`PBS_*`, `SLURM_*`, `OSG*`)
pub struct SchedulerEnv {
    vars: HashMap<String, String>,
}

impl SchedulerEnv {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn from_process_env() -> Self {
        Self::new(std::env::vars().collect())
    }
}

#[async_trait]
impl SystemFactsProvider for SchedulerEnv {
    fn name(&self) -> &'static str {
        "scheduler-env"
    }

    async fn collect(&self, facts: &mut SystemFacts) -> Result<()> {
        facts.env.extend(
            self.vars
                .iter()
                .filter(|(key, _)| ENV_PREFIXES.iter().any(|p| key.starts_with(p)))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(())
    }
}

/// NVIDIA GPUs as listed by nvidia-smi
pub struct GpuInventory;

#[async_trait]
impl SystemFactsProvider for GpuInventory {
    fn name(&self) -> &'static str {
        "gpu"
    }

    async fn collect(&self, facts: &mut SystemFacts) -> Result<()> {
        let nvidia_smi = match which::which("nvidia-smi") {
            Ok(path) => path,
            Err(_) => {
                debug!("nvidia-smi not found, skipping GPU inventory");
                return Ok(());
            }
        };

        let output = Command::new(nvidia_smi)
            .arg(format!("--query-gpu={}", GPU_QUERY))
            .arg("--format=csv")
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::process_start(format!(
                "nvidia-smi exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        facts.system.gpus = Some(parse_gpu_csv(&String::from_utf8_lossy(&output.stdout))?);
        Ok(())
    }
}

/// Parse `nvidia-smi --format=csv` output, header line included
pub fn parse_gpu_csv(text: &str) -> Result<Vec<GpuInfo>> {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                [index, name, bus_id, driver_version, memory_total, compute_mode] => Ok(GpuInfo {
                    index: index.to_string(),
                    name: name.to_string(),
                    bus_id: bus_id.to_string(),
                    driver_version: driver_version.to_string(),
                    memory_total: memory_total.to_string(),
                    compute_mode: compute_mode.to_string(),
                }),
                _ => Err(Error::process_start(format!(
                    "unexpected nvidia-smi line: '{}'",
                    line
                ))),
            }
        })
        .collect()
}

/// Providers used for a normal run
pub fn default_providers() -> Vec<Box<dyn SystemFactsProvider>> {
    vec![
        Box::new(HostFacts),
        Box::new(SchedulerEnv::from_process_env()),
        Box::new(GpuInventory),
    ]
}

/// Run every provider in order and return the combined snapshot
pub async fn gather_facts(providers: Vec<Box<dyn SystemFactsProvider>>) -> SystemFacts {
    let mut facts = SystemFacts::default();
    for provider in providers {
        if let Err(e) = provider.collect(&mut facts).await {
            warn!("Failed to collect {} facts: {}", provider.name(), e);
        }
    }
    facts
}
