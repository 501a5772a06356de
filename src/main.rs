//! Midas position-management agent CLI.
//!
//! Lists the available tools, prints their parameter schemas, and runs a
//! single tool call against a live chain:
//! - `midas tools`
//! - `midas schema <tool>`
//! - `midas call <tool> --params '<json>'`
//!
//! Tool results go to stdout as JSON; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use midas_api::{IpfsClient, PythClient};
use midas_chain::RpcLedgerBuilder;
use midas_core::{AgentConfig, ExternalSources, Services, ThreadRngSeeds, ToolRegistry};

/// Environment variable names.
mod env {
    pub const RPC_URL: &str = "RPC_URL";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const CHAIN_ID: &str = "CHAIN_ID";
    pub const GAS_BUFFER_BPS: &str = "GAS_BUFFER_BPS";
    pub const LOG_JSON: &str = "MIDAS_LOG_JSON";
}

/// Mode mainnet.
const DEFAULT_CHAIN_ID: u64 = 34443;
const DEFAULT_RPC_URL: &str = "https://mainnet.mode.network";

#[derive(Debug, Parser)]
#[command(name = "midas", version, about = "DeFi position management tools for Mode")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every registered tool
    Tools,
    /// Print the JSON schema of a tool's parameters
    Schema { tool: String },
    /// Run one tool call
    Call {
        tool: String,
        /// Parameters as a JSON object
        #[arg(long, short, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let registry = ToolRegistry::new();

    match cli.command {
        Command::Tools => {
            for spec in registry.specs() {
                println!("{:<40} {}", spec.name, spec.description);
            }
        }
        Command::Schema { tool } => {
            let spec = registry
                .spec(&tool)
                .with_context(|| format!("Unknown tool: {tool}"))?;
            println!("{}", serde_json::to_string_pretty(&spec.parameters)?);
        }
        Command::Call { tool, params } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            let services = Arc::new(connect().await?);

            match registry.call(services, &tool, params).await {
                Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                Err(e) => {
                    error!(tool = %tool, operation = e.operation(), error = %e, "Tool call failed");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let json = std::env::var(env::LOG_JSON).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,midas_core=debug,midas_chain=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Build the ledger client and every engine service from the environment.
async fn connect() -> Result<Services> {
    let config = AgentConfig::from_env()?;
    config.log_config();

    let rpc_url = std::env::var(env::RPC_URL).unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
    let private_key =
        std::env::var(env::PRIVATE_KEY).map_err(|_| anyhow::anyhow!("Missing env var: {}", env::PRIVATE_KEY))?;
    let chain_id = match std::env::var(env::CHAIN_ID) {
        Ok(id) => id.parse().with_context(|| format!("Invalid {}: {id}", env::CHAIN_ID))?,
        Err(_) => DEFAULT_CHAIN_ID,
    };

    let mut builder = RpcLedgerBuilder::new(&rpc_url, chain_id);
    if let Ok(bps) = std::env::var(env::GAS_BUFFER_BPS) {
        builder = builder.gas_buffer_bps(
            bps.parse()
                .with_context(|| format!("Invalid {}: {bps}", env::GAS_BUFFER_BPS))?,
        );
    }
    let ledger = Arc::new(builder.build(&private_key).await?);
    info!(rpc_url = %rpc_url, chain_id, "Connected");

    let timeout = config.api.http_timeout();
    let external = ExternalSources {
        metadata: Arc::new(IpfsClient::new(config.api.ipfs_gateway.clone(), timeout)),
        prices: Arc::new(PythClient::new(config.api.pyth_url.clone(), timeout)),
        seeds: Arc::new(ThreadRngSeeds),
    };

    Ok(Services::new(ledger, config, external))
}
