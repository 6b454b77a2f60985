//! Config validation CLI tool
//!
//! Validates a mindful configuration file and reports any errors.

use mindful_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a mindful configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match mindful_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", mindful_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", config.store.data_dir.display());
            println!("  Policy file: {}", config.host.policy_file.display());
            println!(
                "  Expiry warning: {} before expiry",
                format_duration(config.grants.warning_lead)
            );
            println!(
                "  Longest grant: {} minutes",
                config.grants.max_duration_minutes
            );
            println!(
                "  Approval service: {}",
                config.approval.endpoint.as_deref().unwrap_or("(none, requests are denied)")
            );
            println!(
                "  Quick-exempt denylist: {} names",
                config.shield.quick_exempt_denylist.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                mindful_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                mindful_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                mindful_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                mindful_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        mindful_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
