//! devnet - run a local node, indexer and proof server.
//!
//! # Usage
//!
//! ```bash
//! # Make and start the default cluster, printing its endpoints
//! devnet up
//!
//! # A second cluster on other ports
//! devnet --cluster-name t1 --node-port 19944 --indexer-port 18088 \
//!     --proof-server-port 16300 up
//!
//! # Settings from a file
//! devnet --config devnet.toml status
//!
//! # Tear everything down
//! devnet down
//! ```
//!
//! Every command other than `up` works on containers that already exist,
//! found by the cluster's deterministic container names.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CliConfig;
use devnet_orchestrator::config::endpoints_for;
use devnet_orchestrator::{Cluster, ClusterConfig, ClusterOverrides, TeardownReport};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI arguments for devnet.
#[derive(Parser, Debug)]
#[command(
    name = "devnet",
    about = "Provision and manage a local node/indexer/proof-server devnet",
    version
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Cluster name; prefixes every container and the network.
    #[arg(short = 'n', long, value_name = "NAME", env = "DEVNET_CLUSTER_NAME", global = true)]
    cluster_name: Option<String>,

    /// Host port of the node.
    #[arg(long, value_name = "PORT", global = true)]
    node_port: Option<u16>,

    /// Host port of the indexer.
    #[arg(long, value_name = "PORT", global = true)]
    indexer_port: Option<u16>,

    /// Host port of the proof server.
    #[arg(long, value_name = "PORT", global = true)]
    proof_server_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Make and start the cluster, then print its endpoints.
    Up {
        /// Leave the containers in place when startup fails.
        #[arg(long)]
        keep_on_failure: bool,
    },

    /// Start an existing cluster.
    Start,

    /// Stop the cluster's containers.
    Stop,

    /// Remove the cluster's containers and network.
    Down,

    /// Print the status of each service.
    Status,

    /// Print the cluster endpoints.
    Endpoints,

    /// Print the effective configuration and exit.
    PrintConfig,
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    cluster: &'a ClusterConfig,
    logging: &'a config::LoggingConfig,
}

/// Initialize tracing/logging.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs || config.format == "json" {
        "json"
    } else {
        &config.format
    };

    // Logs go to stderr; stdout carries command output.
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summarize(report: &TeardownReport) {
    for (what, error) in report.failures() {
        warn!(cluster = %report.cluster, step = %what, error = %error, "Not torn down");
    }
}

async fn attach(cluster: &Cluster, overrides: &ClusterOverrides) -> Result<devnet_orchestrator::ClusterData> {
    cluster.attach(overrides).await.with_context(|| {
        format!(
            "Cluster {} not found; run `devnet up` first",
            ClusterConfig::resolve(overrides).cluster_name
        )
    })
}

async fn up(cluster: &Cluster, overrides: &ClusterOverrides, keep_on_failure: bool) -> Result<()> {
    let data = match cluster.make(overrides).await {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "Make failed");
            if keep_on_failure {
                warn!("Leaving containers in place");
            } else {
                summarize(&cluster.remove_named(overrides).await);
            }
            return Err(e).context("Failed to make cluster");
        }
    };

    if let Err(e) = cluster.start(&data).await {
        error!(cluster = %data.cluster_name(), error = %e, "Startup failed");
        if keep_on_failure {
            warn!(cluster = %data.cluster_name(), "Leaving containers in place");
        } else {
            summarize(&cluster.remove(&data).await);
        }
        return Err(e).context("Failed to start cluster");
    }

    print_json(&cluster.network_config(&data))
}

/// Commands that only read the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfflineCommand {
    Endpoints,
    PrintConfig,
}

/// Commands that talk to the container engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineCommand {
    Up { keep_on_failure: bool },
    Start,
    Stop,
    Down,
    Status,
}

impl Command {
    fn split(self) -> std::result::Result<OfflineCommand, EngineCommand> {
        match self {
            Command::Endpoints => Ok(OfflineCommand::Endpoints),
            Command::PrintConfig => Ok(OfflineCommand::PrintConfig),
            Command::Up { keep_on_failure } => Err(EngineCommand::Up { keep_on_failure }),
            Command::Start => Err(EngineCommand::Start),
            Command::Stop => Err(EngineCommand::Stop),
            Command::Down => Err(EngineCommand::Down),
            Command::Status => Err(EngineCommand::Status),
        }
    }
}

fn run_offline(command: OfflineCommand, config: &CliConfig) -> Result<()> {
    let resolved = ClusterConfig::resolve(&config.cluster);
    match command {
        OfflineCommand::Endpoints => print_json(&endpoints_for(resolved.ports())),
        OfflineCommand::PrintConfig => {
            let effective = EffectiveConfig {
                cluster: &resolved,
                logging: &config.logging,
            };
            println!("{}", toml::to_string_pretty(&effective)?);
            Ok(())
        }
    }
}

async fn run_with_engine(command: EngineCommand, config: &CliConfig) -> Result<()> {
    let overrides = &config.cluster;
    let cluster = Cluster::connect()
        .await
        .context("Failed to connect to the container engine")?;

    match command {
        EngineCommand::Up { keep_on_failure } => up(&cluster, overrides, keep_on_failure).await,
        EngineCommand::Start => {
            let data = attach(&cluster, overrides).await?;
            cluster
                .start(&data)
                .await
                .context("Failed to start cluster")?;
            print_json(&cluster.network_config(&data))
        }
        EngineCommand::Stop => {
            let data = attach(&cluster, overrides).await?;
            summarize(&cluster.stop(&data).await);
            Ok(())
        }
        EngineCommand::Down => {
            let report = match cluster.attach(overrides).await {
                Ok(data) => cluster.remove(&data).await,
                Err(e) => {
                    info!(error = %e, "Cluster incomplete, removing by name");
                    cluster.remove_named(overrides).await
                }
            };
            summarize(&report);
            Ok(())
        }
        EngineCommand::Status => {
            let data = attach(&cluster, overrides).await?;
            let status = cluster.status(&data).await;

            #[derive(Serialize)]
            struct StatusOutput<'a> {
                state: devnet_orchestrator::ClusterState,
                #[serde(flatten)]
                services: &'a devnet_orchestrator::ClusterStatus,
            }

            print_json(&StatusOutput {
                state: status.state(),
                services: &status,
            })
        }
    }
}

async fn run(command: Command, config: &CliConfig) -> Result<()> {
    match command.split() {
        Ok(offline) => run_offline(offline, config),
        Err(engine) => run_with_engine(engine, config).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        CliConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    // Merge CLI arguments
    config.merge_cli_args(&args);

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    init_tracing(&config.logging, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), command = ?args.command, "devnet starting");

    if let Err(e) = run(args.command.clone(), &config).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::parse_from(["devnet", "status"]);
        assert!(args.config.is_none());
        assert!(args.node_port.is_none());
        assert!(!args.json_logs);
        assert_eq!(args.command, Command::Status);
    }

    #[test]
    fn test_cli_args_with_options() {
        let args = CliArgs::parse_from([
            "devnet",
            "up",
            "--keep-on-failure",
            "--cluster-name",
            "t1",
            "--node-port",
            "19944",
            "--proof-server-port",
            "16300",
            "--json-logs",
        ]);

        assert_eq!(
            args.command,
            Command::Up {
                keep_on_failure: true
            }
        );
        assert_eq!(args.cluster_name, Some("t1".to_string()));
        assert_eq!(args.node_port, Some(19944));
        assert_eq!(args.proof_server_port, Some(16300));
        assert!(args.json_logs);
    }

    #[test]
    fn test_commands_split_by_engine_use() {
        assert_eq!(Command::Endpoints.split(), Ok(OfflineCommand::Endpoints));
        assert_eq!(Command::PrintConfig.split(), Ok(OfflineCommand::PrintConfig));
        assert_eq!(
            Command::Up {
                keep_on_failure: false
            }
            .split(),
            Err(EngineCommand::Up {
                keep_on_failure: false
            })
        );
        assert_eq!(Command::Down.split(), Err(EngineCommand::Down));
    }

    #[test]
    fn test_offline_commands_run_without_engine() {
        let config = CliConfig::default();
        run_offline(OfflineCommand::Endpoints, &config).unwrap();
        run_offline(OfflineCommand::PrintConfig, &config).unwrap();
    }

    #[test]
    fn test_print_config_is_valid_toml() {
        let resolved = ClusterConfig::resolve(&ClusterOverrides::named("t1"));
        let logging = config::LoggingConfig::default();
        let rendered = toml::to_string_pretty(&EffectiveConfig {
            cluster: &resolved,
            logging: &logging,
        })
        .unwrap();

        let parsed: toml::Value = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed["cluster"]["cluster_name"].as_str(), Some("t1"));
        assert_eq!(parsed["cluster"]["node"]["port"].as_integer(), Some(9944));
    }
}
