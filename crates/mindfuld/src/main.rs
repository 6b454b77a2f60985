//! mindfuld - the mindful main process
//!
//! Runs the in-process reblock timers, the resume reconciler and pending
//! request processing, and offers one-shot maintenance commands against the
//! same data directory:
//! - Configuration loading
//! - Store initialization
//! - Core components
//! - Linux host effects

mod commands;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mindful_config::{Config, load_or_default};
use mindful_core::{Components, ProcessRole};
use mindful_host_api::{ApprovalService, DenyAllApprovals};
use mindful_host_linux::{HttpApprovalService, LinuxHost};
use mindful_store::DualStore;
use mindful_util::{SystemClock, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// mindfuld - Time-boxed unblocking of managed apps
#[derive(Parser, Debug)]
#[command(name = "mindfuld")]
#[command(about = "Time-boxed unblocking of managed apps", long_about = None)]
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

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the main process (the default)
    Run,
    /// Unblock an item now
    Grant {
        /// Encoded item token
        token: String,
        #[arg(short, long, default_value_t = 15)]
        minutes: u32,
        /// Display name (defaults to the cached name)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, default_value = "")]
        reason: String,
    },
    /// Say why you need the item from the pending request
    Justify {
        #[arg(short, long)]
        reason: String,
    },
    /// Reconcile every grant once
    Reconcile,
    /// Show active grants, the pending request and the blocked set
    Status,
    /// Show what each storage channel holds and the recent log
    Diagnostics {
        /// Number of log entries to show
        #[arg(long, default_value_t = 20)]
        log: usize,
    },
    /// Put an item under management
    Manage {
        token: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Stop managing an item
    Unmanage { token: String },
    /// Never block an item
    Exempt { token: String },
    /// Remove a permanent exemption
    Unexempt { token: String },
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(args: &Args) -> Result<Config> {
    let config = load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    Ok(match &args.data_dir {
        Some(dir) => config.with_data_dir(dir.clone()),
        None => config,
    })
}

/// Build the component graph for this process against the real host
fn build(config: &Config, role: ProcessRole) -> Result<Components> {
    let data_dir = &config.store.data_dir;
    let store = DualStore::open(data_dir, config.store.write_timeout, config.store.log_limit)
        .with_context(|| format!("Failed to open store in {:?}", data_dir))?;

    let host = LinuxHost::new(
        &config.host.policy_file,
        &config.host.monitor_program,
        data_dir,
        config.host.notifications,
    );

    let approval: Arc<dyn ApprovalService> = match &config.approval.endpoint {
        Some(endpoint) => Arc::new(
            HttpApprovalService::new(endpoint.clone(), config.approval.timeout)
                .context("Failed to create approval client")?,
        ),
        None => Arc::new(DenyAllApprovals),
    };

    info!(data_dir = %data_dir.display(), role = role.as_str(), "Store initialized");

    Ok(Components::new(
        role,
        Arc::new(store),
        host.effects(),
        approval,
        Arc::new(SystemClock),
        config,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = load(&args)?;
    let components = build(&config, ProcessRole::Main)?;

    match args.command.unwrap_or(Cmd::Run) {
        Cmd::Run => {
            info!(version = env!("CARGO_PKG_VERSION"), "mindfuld starting");
            service::Service::new(components, &config).run().await
        }
        Cmd::Grant {
            token,
            minutes,
            name,
            reason,
        } => commands::grant(&components, &token, minutes, name, &reason).await,
        Cmd::Justify { reason } => commands::justify(&components, &reason),
        Cmd::Reconcile => commands::reconcile(&components).await,
        Cmd::Status => commands::status(&components),
        Cmd::Diagnostics { log } => commands::diagnostics(&components, log),
        Cmd::Manage { token, name } => commands::manage(&components, &token, name).await,
        Cmd::Unmanage { token } => commands::unmanage(&components, &token).await,
        Cmd::Exempt { token } => commands::exempt(&components, &token, true).await,
        Cmd::Unexempt { token } => commands::exempt(&components, &token, false).await,
    }
}
