//! rolesweep: stage runner for the unused IAM role lifecycle
//!
//! The workflow driver invokes this binary once per lifecycle edge. The
//! stage input is a JSON document on stdin (or `--input`), and the stage
//! result is printed to stdout as JSON. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rolesweep_common::defaults::{
    DEFAULT_CREDENTIAL_DURATION_SECS, DEFAULT_GRACE_PERIOD_DAYS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_UNUSED_DAYS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_RETRY_MIN_DELAY_MS,
};
use rolesweep_common::{AccountId, ConfigError, ScopeMode};
use rolesweep_lifecycle::config::LifecycleConfig;
use rolesweep_lifecycle::stages::machine::{LifecycleRunner, Stage, encode};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rolesweep")]
#[command(about = "Lifecycle stages for unused IAM roles")]
#[command(version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ROLESWEEP_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// Configuration flags; ignored when `--config` is given.
///
/// Every flag is global so it may follow the subcommand. Flags without a
/// default are checked when the configuration is assembled.
#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(long = "config", global = true, env = "ROLESWEEP_CONFIG")]
    config_file: Option<PathBuf>,

    /// Role assumed in every target account
    #[arg(long, global = true, env = "ROLESWEEP_CROSS_ACCOUNT_ROLE")]
    cross_account_role: Option<String>,

    /// Account holding the findings store and the workflow
    #[arg(long, global = true, env = "ROLESWEEP_SECURITY_ACCOUNT_ID")]
    security_account_id: Option<String>,

    /// Target account in single-account deployments
    #[arg(long, global = true, env = "ROLESWEEP_ACCOUNT_ID")]
    account_id: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Roles unused for longer than this many days are flagged
    #[arg(long, global = true, env = "ROLESWEEP_MAX_UNUSED_DAYS", default_value_t = DEFAULT_MAX_UNUSED_DAYS)]
    max_unused_days: u32,

    /// Pipe-delimited path+name globs exempt from evaluation
    #[arg(long, global = true, env = "ROLESWEEP_ALLOWLIST", default_value = "")]
    allowlist: String,

    /// Account scope (single-account, organization, organizational-unit)
    #[arg(long, global = true, env = "ROLESWEEP_SCOPE", default_value = "single-account")]
    scope: ScopeMode,

    /// Organizational unit id for organizational-unit scope
    #[arg(long, global = true, env = "ROLESWEEP_ORGANIZATIONAL_UNIT_ID")]
    organizational_unit_id: Option<String>,

    /// Owner address for roles without an owner tag
    #[arg(long, global = true, env = "ROLESWEEP_DEFAULT_OWNER_EMAIL")]
    default_owner_email: Option<String>,

    /// Days between deactivation and deletion
    #[arg(long, global = true, env = "ROLESWEEP_GRACE_PERIOD_DAYS", default_value_t = DEFAULT_GRACE_PERIOD_DAYS)]
    grace_period_days: u32,

    /// State machine started for every new finding
    #[arg(long, global = true, env = "ROLESWEEP_STATE_MACHINE_ARN")]
    state_machine_arn: Option<String>,

    /// Sender address of decision requests
    #[arg(long, global = true, env = "ROLESWEEP_NOTIFICATION_SENDER")]
    notification_sender: Option<String>,

    /// Base URL of the approve/deny endpoints
    #[arg(long, global = true, env = "ROLESWEEP_APPROVAL_ENDPOINT")]
    approval_endpoint: Option<String>,

    /// Lifetime of assumed credentials in seconds
    #[arg(long, global = true, env = "ROLESWEEP_CREDENTIAL_DURATION", default_value_t = DEFAULT_CREDENTIAL_DURATION_SECS)]
    credential_duration_secs: i32,

    /// Maximum attempts for retried AWS calls
    #[arg(long, global = true, env = "ROLESWEEP_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    #[arg(long, global = true, env = "ROLESWEEP_RETRY_MIN_DELAY_MS", default_value_t = DEFAULT_RETRY_MIN_DELAY_MS)]
    retry_min_delay_ms: u64,

    #[arg(long, global = true, env = "ROLESWEEP_RETRY_MAX_DELAY_MS", default_value_t = DEFAULT_RETRY_MAX_DELAY_MS)]
    retry_max_delay_ms: u64,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Empty(name))
}

impl TryFrom<ConfigArgs> for LifecycleConfig {
    type Error = ConfigError;

    fn try_from(args: ConfigArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            cross_account_role: required(args.cross_account_role, "cross_account_role")?,
            security_account_id: AccountId::parse(required(
                args.security_account_id,
                "security_account_id",
            )?)?,
            account_id: args.account_id.map(AccountId::parse).transpose()?,
            region: args.region,
            max_unused_days: args.max_unused_days,
            allowlist: args.allowlist,
            scope: args.scope,
            organizational_unit_id: args.organizational_unit_id,
            default_owner_email: required(args.default_owner_email, "default_owner_email")?,
            grace_period_days: args.grace_period_days,
            state_machine_arn: required(args.state_machine_arn, "state_machine_arn")?,
            notification_sender: required(args.notification_sender, "notification_sender")?,
            approval_endpoint: required(args.approval_endpoint, "approval_endpoint")?,
            credential_duration_secs: args.credential_duration_secs,
            max_attempts: args.max_attempts,
            retry_min_delay_ms: args.retry_min_delay_ms,
            retry_max_delay_ms: args.retry_max_delay_ms,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one lifecycle stage
    Run {
        #[arg(value_enum)]
        stage: Stage,

        /// Read the stage input from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_ok() {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stage input: {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stage input from stdin")?;
            Ok(input)
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match &args.config.config_file {
        Some(path) => LifecycleConfig::load(path)?,
        None => LifecycleConfig::try_from(args.config)?,
    };

    match args.command {
        Command::CheckConfig => {
            let allowlist = config.check()?;
            info!(
                region = %config.region,
                scope = %config.scope,
                allowlist_patterns = allowlist.len(),
                max_unused_days = config.max_unused_days,
                grace_period_days = config.grace_period_days,
                "Configuration is valid"
            );
        }

        Command::Run { stage, input } => {
            let input = read_input(input.as_ref())?;
            let runner = LifecycleRunner::new(config).await?;
            let output = runner
                .run(stage, &input)
                .await
                .with_context(|| format!("Stage {stage:?} failed"))?;
            println!("{}", encode(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_a_config() {
        let args = Args::try_parse_from([
            "rolesweep",
            "--cross-account-role",
            "rolesweep-audit",
            "--security-account-id",
            "999988887777",
            "--account-id",
            "111122223333",
            "--default-owner-email",
            "security@example.com",
            "--state-machine-arn",
            "arn:aws:states:us-east-1:999988887777:stateMachine:rolesweep",
            "--notification-sender",
            "security@example.com",
            "--approval-endpoint",
            "https://approvals.example.com",
            "--allowlist",
            "/service-role/*",
            "run",
            "validate",
        ])
        .unwrap();

        assert!(matches!(
            args.command,
            Command::Run {
                stage: Stage::Validate,
                ..
            }
        ));
        let config = LifecycleConfig::try_from(args.config).unwrap();
        assert_eq!(config.max_unused_days, DEFAULT_MAX_UNUSED_DAYS);
        assert_eq!(config.check().unwrap().len(), 1);
    }

    #[test]
    fn config_file_replaces_required_flags() {
        let args =
            Args::try_parse_from(["rolesweep", "--config", "/etc/rolesweep.json", "check-config"])
                .unwrap();
        assert!(args.config.config_file.is_some());
        assert!(matches!(args.command, Command::CheckConfig));
    }

    #[test]
    fn required_flags_without_config_file() {
        let args = Args::try_parse_from(["rolesweep", "check-config"]).unwrap();
        assert!(matches!(
            LifecycleConfig::try_from(args.config),
            Err(ConfigError::Empty("cross_account_role"))
        ));
    }

    #[test]
    fn flags_may_follow_the_subcommand() {
        let args = Args::try_parse_from([
            "rolesweep",
            "run",
            "validate",
            "--region",
            "eu-west-1",
            "--cross-account-role",
            "rolesweep-audit",
            "--security-account-id",
            "999988887777",
            "--account-id",
            "111122223333",
            "--default-owner-email",
            "security@example.com",
            "--state-machine-arn",
            "arn:aws:states:eu-west-1:999988887777:stateMachine:rolesweep",
            "--notification-sender",
            "security@example.com",
            "--approval-endpoint",
            "https://approvals.example.com",
            "--retry-min-delay-ms",
            "2000",
            "--retry-max-delay-ms",
            "1000",
        ])
        .unwrap();

        let config = LifecycleConfig::try_from(args.config).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.retry_min_delay_ms, 2000);
        assert!(matches!(
            config.check(),
            Err(ConfigError::RetryDelayOrder { .. })
        ));
    }

    #[test]
    fn bad_security_account_is_rejected() {
        let args = Args::try_parse_from([
            "rolesweep",
            "--cross-account-role",
            "r",
            "--security-account-id",
            "12345",
            "--default-owner-email",
            "a@b.c",
            "--state-machine-arn",
            "arn",
            "--notification-sender",
            "a@b.c",
            "--approval-endpoint",
            "https://x",
            "check-config",
        ])
        .unwrap();
        assert!(matches!(
            LifecycleConfig::try_from(args.config),
            Err(ConfigError::InvalidAccountId(_))
        ));
    }
}
