use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use quotaledger::ledger::MeteredOutcome;
use quotaledger::{Identity, Ledger, LedgerConfig, Scope};

/// Quota and admission ledger operator tool
#[derive(Parser, Debug)]
#[command(name = "quotaledger")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "QUOTALEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Global quota for today
    Quota,
    /// Per-identity usage for today
    Usage,
    /// Check a display name against the allow-list
    Login { name: String },
    /// Give a display name a seat
    Admit { name: String },
    /// Charge one unit of global and per-identity quota
    Consume { name: String },
    /// Give back one unit of global and per-identity quota
    Release { name: String },
    /// Clear an identity's usage for today
    Reset { name: String },
    /// Free an identity's seat
    Unregister { name: String },
    /// List registered identities
    Users,
    /// Print today's day key
    DayKey,
}

#[derive(Serialize)]
struct Released {
    identity: Identity,
    global_used: u64,
    used: u64,
}

#[derive(Serialize)]
struct Charged {
    identity: Identity,
    outcome: &'static str,
}

#[derive(Serialize)]
struct Changed {
    identity: Identity,
    changed: bool,
}

fn setup_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.json_logs);

    let config = LedgerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    let ledger = Ledger::connect(&config)
        .await
        .context("Failed to build ledger")?;

    run(&ledger, args.command).await
}

async fn run(ledger: &Ledger, command: Command) -> Result<()> {
    match command {
        Command::Quota => print(&ledger.quota_snapshot().await?),
        Command::Usage => print(&ledger.usage_report().await?),
        Command::Login { name } => print(&ledger.authenticate(&name).await?),
        Command::Admit { name } => print(&ledger.register(&name).await?),
        Command::Consume { name } => {
            let identity = Identity::normalize(&name)?;
            let outcome = ledger
                .metered(&identity, || async { Ok::<_, anyhow::Error>(()) })
                .await?;
            let outcome = match outcome {
                MeteredOutcome::Delivered(()) => "delivered",
                MeteredOutcome::Failed { .. } => "failed",
                MeteredOutcome::GlobalExhausted => "global_exhausted",
                MeteredOutcome::IdentityExhausted { .. } => "identity_exhausted",
            };
            info!(identity = %identity, outcome = outcome, "Consume requested");
            print(&Charged { identity, outcome })
        }
        Command::Release { name } => {
            let identity = Identity::normalize(&name)?;
            let global_used = ledger.release(&Scope::Global).await?;
            let used = ledger.release(&Scope::Identity(identity.clone())).await?;
            print(&Released {
                identity,
                global_used,
                used,
            })
        }
        Command::Reset { name } => {
            let identity = Identity::normalize(&name)?;
            let changed = ledger.reset_usage(&identity).await?;
            print(&Changed { identity, changed })
        }
        Command::Unregister { name } => {
            let identity = Identity::normalize(&name)?;
            let changed = ledger.unregister(&identity).await?;
            print(&Changed { identity, changed })
        }
        Command::Users => print(&ledger.registered().await?),
        Command::DayKey => {
            let today = ledger.today();
            print(&serde_json::json!({
                "day": today,
                "offset_hours": ledger.calendar().offset_hours(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_subcommand_with_name() {
        let args = Args::parse_from(["quotaledger", "--json-logs", "admit", "Budi Santoso"]);
        assert!(args.json_logs);
        assert!(matches!(args.command, Command::Admit { ref name } if name == "Budi Santoso"));
    }

    #[test]
    fn test_parses_day_key() {
        let args = Args::parse_from(["quotaledger", "-c", "ledger.yaml", "day-key"]);
        assert_eq!(args.config, Some(PathBuf::from("ledger.yaml")));
        assert!(matches!(args.command, Command::DayKey));
    }
}
