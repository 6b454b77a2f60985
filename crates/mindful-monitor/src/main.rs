//! mindful-monitor - runs once per OS trigger
//!
//! systemd starts this process when a grant's monitoring interval ends. It
//! shares nothing with the main process except the data directory, so every
//! piece of state is read back from the store before acting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mindful_api::LifecycleCallback;
use mindful_config::load_or_default;
use mindful_core::{Components, MonitorOutcome, ProcessRole};
use mindful_host_api::DenyAllApprovals;
use mindful_host_linux::LinuxHost;
use mindful_store::DualStore;
use mindful_util::{CorrelationName, SystemClock, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// mindful-monitor - Lifecycle callbacks for mindful grants
#[derive(Parser, Debug)]
#[command(name = "mindful-monitor")]
#[command(about = "Lifecycle callbacks for mindful grants", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/mindful/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set MINDFUL_DATA_DIR env var)
    #[arg(short, long, env = "MINDFUL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    callback: Callback,
}

#[derive(Subcommand, Debug)]
enum Callback {
    /// The grant's interval has ended: reblock
    IntervalEnded { correlation: String },
    /// The grant's interval ends soon: warn
    IntervalWillEnd { correlation: String },
}

impl Callback {
    fn into_lifecycle(self) -> Result<LifecycleCallback> {
        Ok(match self {
            Callback::IntervalEnded { correlation } => LifecycleCallback::IntervalEnded {
                correlation: CorrelationName::parse(&correlation)?,
            },
            Callback::IntervalWillEnd { correlation } => LifecycleCallback::IntervalWillEndSoon {
                correlation: CorrelationName::parse(&correlation)?,
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let callback = args.callback.into_lifecycle()?;

    let mut config = load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }

    let data_dir = &config.store.data_dir;
    let store = DualStore::open(data_dir, config.store.write_timeout, config.store.log_limit)
        .with_context(|| format!("Failed to open store in {:?}", data_dir))?;
    let host = LinuxHost::new(
        &config.host.policy_file,
        &config.host.monitor_program,
        data_dir,
        config.host.notifications,
    );

    let components = Components::new(
        ProcessRole::Monitor,
        Arc::new(store),
        host.effects(),
        Arc::new(DenyAllApprovals),
        Arc::new(SystemClock),
        &config,
    );

    let correlation = callback.correlation().clone();
    let outcome = components
        .monitor
        .handle(callback)
        .await
        .with_context(|| format!("Callback for {} failed", correlation))?;

    match &outcome {
        MonitorOutcome::Reconciled(result) => {
            info!(correlation = %correlation, outcome = ?result, "Interval ended")
        }
        MonitorOutcome::SafetyNet => {
            info!(correlation = %correlation, "Interval ended for a reconciled grant")
        }
        MonitorOutcome::Warned { remaining_minutes } => {
            info!(correlation = %correlation, remaining_minutes, "Warned")
        }
        MonitorOutcome::NoWarning => info!(correlation = %correlation, "Nothing to warn about"),
    }
    Ok(())
}
