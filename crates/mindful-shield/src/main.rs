//! mindful-shield - answers the block screen
//!
//! The host runs this once per button press (or to fetch the screen's
//! content) and reads a single JSON value from stdout. A press always gets
//! an answer: if the store cannot be opened or the work runs past the
//! deadline, the default response for that button is printed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mindful_api::{ShieldAction, ShieldResponse};
use mindful_config::{Config, load_or_default};
use mindful_core::{Components, ProcessRole, complete_within};
use mindful_host_api::DenyAllApprovals;
use mindful_host_linux::LinuxHost;
use mindful_store::DualStore;
use mindful_util::{ItemToken, SystemClock, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// mindful-shield - Block screen callbacks for mindful
#[derive(Parser, Debug)]
#[command(name = "mindful-shield")]
#[command(about = "Block screen callbacks for mindful", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/mindful/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set MINDFUL_DATA_DIR env var)
    #[arg(short, long, env = "MINDFUL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    request: Request,
}

#[derive(Subcommand, Debug)]
enum Request {
    /// "Request Access" was pressed
    Primary { token: String },
    /// The secondary button was pressed
    Secondary { token: String },
    /// Print what the block screen shows
    Configuration { token: String },
}

fn load(args: &Args) -> Result<Config> {
    let mut config = load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    Ok(config)
}

fn build(config: &Config) -> Result<Components> {
    let data_dir = &config.store.data_dir;
    let store = DualStore::open(data_dir, config.store.write_timeout, config.store.log_limit)
        .with_context(|| format!("Failed to open store in {:?}", data_dir))?;
    let host = LinuxHost::new(
        &config.host.policy_file,
        &config.host.monitor_program,
        data_dir,
        config.host.notifications,
    );

    Ok(Components::new(
        ProcessRole::Shield,
        Arc::new(store),
        host.effects(),
        Arc::new(DenyAllApprovals),
        Arc::new(SystemClock),
        config,
    ))
}

async fn press(args: &Args, action: ShieldAction, token: &str) -> ShieldResponse {
    let fallback = match action {
        ShieldAction::Primary => ShieldResponse::Defer,
        ShieldAction::Secondary => ShieldResponse::Close,
    };

    let token = match ItemToken::decode(token) {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Undecodable token");
            return fallback;
        }
    };
    let config = match load(args) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Shield unavailable");
            return fallback;
        }
    };

    // Opening the store can stall too, so it counts against the deadline
    let deadline = config.shield.response_deadline;
    let work = async move {
        match tokio::task::spawn_blocking(move || build(&config)).await {
            Ok(Ok(components)) => components.shield.handle_action(action, &token).await,
            Ok(Err(e)) => {
                warn!(error = %e, "Shield unavailable");
                fallback
            }
            Err(e) => {
                warn!(error = %e, "Shield setup failed");
                fallback
            }
        }
    };
    complete_within(deadline, work, fallback).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = match &args.request {
        Request::Primary { token } => {
            serde_json::to_string(&press(&args, ShieldAction::Primary, token).await)?
        }
        Request::Secondary { token } => {
            serde_json::to_string(&press(&args, ShieldAction::Secondary, token).await)?
        }
        Request::Configuration { token } => {
            let token = ItemToken::decode(token)?;
            let components = build(&load(&args)?)?;
            serde_json::to_string_pretty(&components.shield.configuration(&token))?
        }
    };
    println!("{}", output);
    Ok(())
}
