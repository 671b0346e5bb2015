//! Swifter CLI - Maintenance tools for tool governance data

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use swifter_core::prelude::*;
use swifter_core::store::{ORDERS_FILE, TOOL_METRICS_FILE, TOOLS_CONFIG_FILE, USAGE_FILE};

#[derive(Parser)]
#[command(name = "swifter")]
#[command(about = "Swifter tool governance maintenance CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory holding the governance documents
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and correct usage records
    Usage {
        #[command(subcommand)]
        command: UsageCommands,
    },
    /// Resolve tool policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Inspect and operate the reliability gate
    Reliability {
        #[command(subcommand)]
        command: ReliabilityCommands,
    },
    /// Show the effective tools configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Version information
    Version,
}

/// Selects one usage record
#[derive(Args)]
struct RecordArgs {
    /// Tool key
    #[arg(long)]
    tool: String,
    /// Authenticated user id
    #[arg(long)]
    user_id: Option<String>,
    /// Client IP address, used when no user id is given
    #[arg(long)]
    ip: Option<String>,
    /// Session token of an anonymous client
    #[arg(long)]
    token: Option<String>,
    /// Month in YYYY-MM form; defaults to the current UTC month
    #[arg(long)]
    month: Option<MonthKey>,
    /// Print the composed ledger key before acting
    #[arg(long)]
    print_key: bool,
}

impl RecordArgs {
    fn client(&self) -> Result<ClientIdentity> {
        let client = ClientIdentity {
            ip: self.ip.clone(),
            token: self.token.clone(),
            user_id: self.user_id.clone(),
        };
        client.ensure_identified()?;
        Ok(client)
    }

    fn month(&self) -> MonthKey {
        self.month.clone().unwrap_or_else(MonthKey::current)
    }

    fn key(&self) -> Result<UsageKey> {
        let key = UsageKey::new(&self.client()?, &self.tool, &self.month());
        if self.print_key {
            println!("{}", key);
        }
        Ok(key)
    }
}

#[derive(Subcommand)]
enum UsageCommands {
    /// Set the counter of a record
    Set {
        #[command(flatten)]
        record: RecordArgs,
        /// New count
        #[arg(long)]
        count: u64,
    },
    /// Set the counter of a record to zero
    Reset {
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Remove a record
    Delete {
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Show usage against the client's plan
    Show {
        #[command(flatten)]
        record: RecordArgs,
        /// Plan to check against; resolved from orders when omitted
        #[arg(long)]
        plan: Option<String>,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Resolve the policy of one tool
    Show {
        /// Tool key
        tool: String,
    },
    /// List tools that may currently run
    Allowed,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RunResult {
    /// Record a successful run
    #[arg(long)]
    success: bool,
    /// Record a failed run
    #[arg(long)]
    failure: bool,
}

#[derive(Subcommand)]
enum ReliabilityCommands {
    /// Show the reliability status of a tool
    Status {
        /// Tool key
        tool: String,
    },
    /// Record one run outcome
    Record {
        /// Tool key
        tool: String,
        #[command(flatten)]
        result: RunResult,
    },
    /// Show the alert trail, newest last
    Alerts {
        /// Only show the most recent alerts
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Clear a tool's record so it can run again
    Reset {
        /// Tool key
        tool: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective tools configuration
    Show,
    /// Print the document paths
    Paths,
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = SwifterConfig::load().context("Failed to load settings")?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    tracing::debug!(data_dir = %settings.data_dir.display(), "using data directory");
    let governor = ToolGovernor::new(&settings);

    match cli.command {
        Commands::Version => {
            println!("swifter {}", env!("CARGO_PKG_VERSION"));
            println!("swifter-core {}", swifter_core::VERSION);
        }
        Commands::Usage { command } => run_usage(&governor, command).await?,
        Commands::Policy { command } => match command {
            PolicyCommands::Show { tool } => {
                print_json(&governor.resolver().tool_policy(&tool).await)?;
            }
            PolicyCommands::Allowed => {
                for key in governor.resolver().allowed_tool_keys().await {
                    println!("{}", key);
                }
            }
        },
        Commands::Reliability { command } => run_reliability(&governor, command).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print_json(&governor.config().tools_config().await)?;
            }
            ConfigCommands::Paths => {
                let store = JsonStore::new(governor.config().data_dir());
                println!("dataDir: {}", store.root().display());
                for name in [TOOLS_CONFIG_FILE, TOOL_METRICS_FILE, USAGE_FILE, ORDERS_FILE] {
                    println!("{}: {}", name, store.path(name).display());
                }
            }
        },
    }

    Ok(())
}

async fn run_usage(governor: &ToolGovernor, command: UsageCommands) -> Result<()> {
    let ledger = governor.ledger();
    match command {
        UsageCommands::Set { record, count } => {
            let key = record.key()?;
            ledger.set_usage(&key, count).await?;
            println!("Set count={} for {}", count, key);
        }
        UsageCommands::Reset { record } => {
            let key = record.key()?;
            ledger.set_usage(&key, 0).await?;
            println!("Set count=0 for {}", key);
        }
        UsageCommands::Delete { record } => {
            let key = record.key()?;
            if ledger.delete_usage(&key).await? {
                println!("Deleted: {}", key);
            } else {
                println!("No-op (missing): {}", key);
            }
        }
        UsageCommands::Show { record, plan } => {
            let client = record.client()?;
            let at = record.month().first_instant()?;
            let request = UsageRequest::new(&client, &record.tool).at(at);
            if record.print_key {
                println!("{}", request.key());
            }
            let plan = match plan {
                Some(plan) => plan,
                None => governor.plans().resolve_plan(&client).await?,
            };
            print_json(&ledger.usage_status(&request, &plan).await)?;
        }
    }
    Ok(())
}

async fn run_reliability(governor: &ToolGovernor, command: ReliabilityCommands) -> Result<()> {
    let gate = governor.gate();
    match command {
        ReliabilityCommands::Status { tool } => {
            print_json(&gate.reliability_status(&tool).await)?;
        }
        ReliabilityCommands::Record { tool, result } => {
            let metrics = gate.record_tool_run(&tool, result.success).await?;
            print_json(&metrics)?;
        }
        ReliabilityCommands::Alerts { limit } => {
            let alerts = gate.alerts().await;
            let skip = limit.map_or(0, |limit| alerts.len().saturating_sub(limit));
            print_json(&alerts[skip..])?;
        }
        ReliabilityCommands::Reset { tool } => {
            if gate.reset_tool(&tool).await? {
                println!("Reset reliability record for {}", tool);
            } else {
                println!("No-op (missing): {}", tool);
            }
        }
    }
    Ok(())
}
