//! duct CLI - run a command and record its resource usage

use anyhow::Result;
use clap::Parser;
use duct_core::constants::{config_dir, CONFIG_ENV};
use duct_core::{find_config_file, load_env, ConfigLayer, RunConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod output;

use cli::Cli;
use output::SummaryFormatter;

/// tracing filter directive for a duct log level, `None` for NONE
fn tracing_level(level: &str) -> Option<&'static str> {
    match level {
        "NONE" => None,
        "CRITICAL" | "ERROR" => Some("error"),
        "WARNING" => Some("warn"),
        "DEBUG" => Some("debug"),
        _ => Some("info"),
    }
}

fn init_logging(level: &str) {
    let Some(level) = tracing_level(level) else {
        return;
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "duct={0},duct_core={0},duct_logs={0},duct_monitor={0}",
                    level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Defaults, config file, environment and flags, in increasing precedence
fn resolve_config(cli: &Cli) -> duct_core::Result<RunConfig> {
    let env = load_env(std::env::vars().collect::<HashMap<_, _>>())?;

    let explicit = cli
        .config
        .clone()
        .or_else(|| env.get(CONFIG_ENV).filter(|p| !p.is_empty()).map(PathBuf::from));
    let file = find_config_file(explicit.as_deref(), config_dir().as_deref())?
        .map(|path| ConfigLayer::load(&path))
        .transpose()?;

    let config = RunConfig::resolve(file, ConfigLayer::from_env(&env)?, cli.layer())?;
    SummaryFormatter::check(&config.summary_format)?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = resolve_config(&cli)?;
    init_logging(&config.log_level);
    colored::control::set_override(config.colors);

    let (command, args) = cli.split_command();
    let outcome = duct_monitor::execute(&config, command, args).await?;

    if matches!(config.log_level.as_str(), "INFO" | "DEBUG") {
        let formatter = SummaryFormatter::new(config.colors);
        let summary = formatter.format(&config.summary_format, &outcome.summary);
        eprintln!("{}", summary.trim_end_matches('\n'));
    }
    Ok(outcome.exit_code)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.downcast_ref::<duct_core::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}
