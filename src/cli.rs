//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing, merges it with the
//! configuration file and runs a single rotation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{self, Config};
use crate::exchange::{AwsCliExchange, AwsSdkExchange, Exchange, ExchangeKind, MfaCode};
use crate::progress::Progress;
use crate::rotation::{RotationRequest, Rotator};

#[derive(Debug, Parser)]
#[command(name = "mfa-rotate")]
#[command(about = "Rotate MFA session credentials while keeping the permanent AWS access key", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Six-digit code currently shown by the MFA device
    #[arg(value_name = "CODE")]
    pub code: MfaCode,

    /// Session duration in seconds, from 900 (15 minutes) to 129600 (36 hours) [default: 43200]
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<u32>,

    /// Profile to rotate [default: default]
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "Increase log verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    /// Path to the AWS shared credentials file
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, env = "MFA_ROTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Token exchange to use (cli or sdk)
    #[arg(long, env = "MFA_ROTATE_EXCHANGE")]
    pub exchange: Option<ExchangeKind>,
}

fn parse_duration(value: &str) -> Result<u32, String> {
    let seconds = value
        .parse::<u32>()
        .map_err(|_| format!("'{}' is not a whole number of seconds", value))?;
    config::check_duration(seconds)
}

/// Render a session expiration the way it is shown to the user
pub fn format_expiration(expiration: &DateTime<Utc>) -> String {
    expiration.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Execute a rotation
pub async fn execute(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref config_path) => Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?,
        None => Config::default(),
    };

    // Command line and environment override the config file
    let profile = cli
        .profile
        .unwrap_or_else(|| config.rotation.profile.clone());
    let duration_seconds = cli.duration.unwrap_or(config.rotation.duration_seconds);
    let exchange_kind = match cli.exchange {
        Some(kind) => kind,
        None => config
            .exchange
            .backend
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid exchange backend in config")?,
    };
    let credentials_file = cli
        .credentials_file
        .or_else(config::default_credentials_path);

    let exchange = create_exchange(exchange_kind, &config, credentials_file.clone());
    debug!("Using {} token exchange", exchange.exchange_type());

    let rotator = Rotator::new(exchange.as_ref(), Progress::new(cli.quiet)).with_suffixes(
        &config.profile.permanent_suffix,
        &config.profile.backup_suffix,
    );

    let request = RotationRequest {
        profile,
        code: cli.code,
        duration_seconds,
        credentials_file,
    };

    let session = rotator
        .rotate(&request)
        .await
        .with_context(|| format!("Failed to rotate session for profile '{}'", request.profile))?;

    println!(
        "Success. Your session expires at {} (UTC)",
        format_expiration(&session.expiration)
    );

    Ok(())
}

/// Create an exchange instance based on configuration
fn create_exchange(
    kind: ExchangeKind,
    config: &Config,
    credentials_file: Option<PathBuf>,
) -> Exchange {
    match kind {
        ExchangeKind::Cli => Box::new(AwsCliExchange::new(
            &config.exchange.aws_cli,
            credentials_file,
        )),
        ExchangeKind::Sdk => Box::new(AwsSdkExchange::new(
            config.exchange.region.clone(),
            credentials_file,
        )),
    }
}
