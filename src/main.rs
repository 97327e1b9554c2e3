//! DSNT node CLI Application
//!
//! Command-line tools for double-spend notification outputs and endpoints.

use clap::{Parser, Subcommand};
use dsnt_node::cli;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dsnt-node")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Double-spend notification tooling for a Bitcoin node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a DSNT output script
    Decode {
        /// Output script in hex
        script: String,
    },

    /// Build a DSNT output script
    Encode {
        /// Callback endpoint IP (repeatable)
        #[arg(long = "ip", required = true)]
        ips: Vec<IpAddr>,

        /// Input index of interest (repeatable, none means all inputs)
        #[arg(long = "input")]
        inputs: Vec<u32>,
    },

    /// Query an endpoint about a transaction
    Query {
        /// Endpoint address (ip:port)
        #[arg(short, long)]
        endpoint: SocketAddr,

        /// Transaction id in hex
        #[arg(short, long)]
        txid: String,

        /// Request timeout in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Print the effective configuration
    Config {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { script } => cli::cmd_decode(&script),
        Commands::Encode { ips, inputs } => cli::cmd_encode(&ips, &inputs),
        Commands::Query {
            endpoint,
            txid,
            timeout_ms,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_query(
                endpoint,
                &txid,
                Duration::from_millis(timeout_ms),
            ))
        }
        Commands::Config { config } => cli::cmd_config(config.as_deref()),
    }
}
