//! CLI command implementations
//!
//! Each command builds its own tokio runtime and blocks on it; `main` stays
//! synchronous.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::args::{Cli, ClientArgs, Command};
use super::errors::{CliError, CliResult};
use crate::client::{ReadClient, WriteClient};
use crate::config::{ClientConfig, ServerConfig};
use crate::log_store::LogStore;
use crate::model::LogEntry;
use crate::observability::{Event, Logger, Severity};
use crate::server::Server;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let severity = Severity::parse(&cli.log_level).ok_or_else(|| {
        CliError::config_error(format!("Invalid log level: '{}'", cli.log_level))
    })?;
    Logger::set_min_severity(severity);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve {
            config,
            port,
            host,
            dir,
        } => {
            let config = server_config(config, port, host, dir)?;
            block_on(serve(config))
        }
        Command::Write(args) => block_on(write(client_config(&args)?)),
        Command::Replay(args) => block_on(replay(client_config(&args)?)),
        Command::Tail(args) => block_on(tail(client_config(&args)?)),
    }
}

fn block_on<F: Future<Output = CliResult<()>>>(future: F) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;
    rt.block_on(future)
}

/// File values first, flags on top
pub fn server_config(
    path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
    dir: Option<PathBuf>,
) -> CliResult<ServerConfig> {
    let mut config = match &path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(dir) = dir {
        config.data_dir = dir;
    }
    config.validate()?;

    if let Some(path) = path {
        Logger::info(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
    }
    Ok(config)
}

pub fn client_config(args: &ClientArgs) -> CliResult<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = ClientConfig::load(path)?;
            Logger::info(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
            config
        }
        None => ClientConfig::default(),
    };
    if !args.shards.is_empty() {
        config.shards = args.shards.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Serve one shard until Ctrl-C, then stop and close the store
async fn serve(config: ServerConfig) -> CliResult<()> {
    let store = Arc::new(LogStore::open(&config.data_dir, config.store_config())?);
    let server = Arc::new(Server::bind(config, Arc::clone(&store)).await?);

    let on_signal = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.stop();
        }
    });

    let served = server.start().await;
    let closed = store.close().await;
    served?;
    closed?;
    Ok(())
}

/// One entry per stdin line
async fn write(config: ClientConfig) -> CliResult<()> {
    let client = WriteClient::connect(&config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        client.write(line.as_bytes())?;
    }
    client.close().await?;
    Ok(())
}

async fn replay(config: ClientConfig) -> CliResult<()> {
    let client = ReadClient::connect(&config).await?;
    let mut merge = client.replay().await?;

    let stdout = std::io::stdout();
    while let Some(entry) = merge.next().await? {
        print_entry(&mut stdout.lock(), &entry)?;
    }
    stdout.lock().flush()?;

    drop(merge);
    client.close().await;
    Ok(())
}

async fn tail(config: ClientConfig) -> CliResult<()> {
    let client = ReadClient::connect(&config).await?;
    let mut subscription = client.subscribe().await?;

    loop {
        let delivery = tokio::select! {
            delivery = subscription.recv() => delivery,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(delivery) = delivery else { break };

        let mut out = std::io::stdout().lock();
        print_entry(&mut out, &delivery?)?;
        out.flush()?;
    }

    subscription.close();
    client.close().await;
    Ok(())
}

fn print_entry(out: &mut impl Write, entry: &LogEntry) -> CliResult<()> {
    let metadata = entry.metadata();
    writeln!(
        out,
        "{} {} {}",
        metadata.writer_id(),
        metadata.sequence(),
        String::from_utf8_lossy(&entry.payload())
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Identifier, MetaData};
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"port": 7000, "host": "127.0.0.1"}"#).unwrap();

        let config = server_config(Some(path), Some(7001), None, Some(dir.path().into())).unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn test_client_needs_shards_from_somewhere() {
        let args = ClientArgs {
            shards: vec![],
            config: None,
        };
        let err = client_config(&args).unwrap_err();
        assert_eq!(err.code_str(), "SHARDLOG_CLI_CONFIG_ERROR");

        let args = ClientArgs {
            shards: vec!["127.0.0.1:1234".into()],
            config: None,
        };
        assert_eq!(client_config(&args).unwrap().shards.len(), 1);
    }

    #[test]
    fn test_print_entry_format() {
        let entry = LogEntry::new(
            MetaData::new(Identifier::from_u64(0xff), 3, Identifier::from_u64(1)),
            b"hello",
        );
        let mut out = Vec::new();
        print_entry(&mut out, &entry).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "00000000000000ff 3 hello\n");
    }
}
