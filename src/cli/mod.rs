//! CLI module for shardlog
//!
//! Provides command-line interface for:
//! - serve: run one shard server
//! - write: send stdin lines as entries
//! - replay: print the merged log
//! - tail: print live entries

mod args;
mod commands;
mod errors;

pub use args::{Cli, ClientArgs, Command};
pub use commands::{client_config, run, run_command, server_config};
pub use errors::{CliError, CliErrorCode, CliResult};
