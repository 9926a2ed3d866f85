//! CLI argument definitions using clap
//!
//! Commands:
//! - shardlog serve [--config <path>] [--port <u16>] [--dir <path>]
//! - shardlog write --shards a,b,c
//! - shardlog replay --shards a,b,c
//! - shardlog tail --shards a,b,c

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// shardlog - a sharded, append-only distributed log
#[derive(Parser, Debug)]
#[command(name = "shardlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log severity: trace, info, warn, error or fatal
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a shard server until Ctrl-C
    Serve {
        /// Path to a server configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Directory for the shard's log (overrides the config file)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Write each line of stdin as one entry
    Write(ClientArgs),

    /// Print the merged log of every shard
    Replay(ClientArgs),

    /// Print live entries from every shard until Ctrl-C
    Tail(ClientArgs),
}

/// Shard selection shared by the client commands
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Comma-separated shard addresses (overrides the config file)
    #[arg(long, value_delimiter = ',')]
    pub shards: Vec<String>,

    /// Path to a client configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
