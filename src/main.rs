use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use serde_json::Value;
use tracing::{info, Level};

use rtl433_net::config::{ConfigFile, LoggingConfig};
use rtl433_net::service::decoder::DEFAULT_DECODER_BINARY;
use rtl433_net::utils::logging;
use rtl433_net::{start_server, Client, ClientIdentity, Packet, Result, Rtl433Launcher, ServerIdentity};

/// Aggregate rtl_433 output from many radio nodes into one stream.
#[derive(Parser)]
#[command(name = "rtl433net", version, about)]
#[command(group(ArgGroup::new("role").required(true).args(["server", "client"])))]
struct Cli {
    /// Run the server with this TOML configuration file.
    #[arg(long, value_name = "CONFIG")]
    server: Option<PathBuf>,

    /// Run a client node forwarding to this server.
    #[arg(long, value_name = "HOST[:PORT]")]
    client: Option<String>,

    /// rtl_433 executable used by the client.
    #[arg(long, value_name = "BIN", default_value = DEFAULT_DECODER_BINARY)]
    rtl433: PathBuf,

    /// Print the effective configuration (server) or decoder command (client) and exit.
    #[arg(long)]
    dryrun: bool,

    /// Override the log level.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<Level>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn logging(&self, mut base: LoggingConfig) -> LoggingConfig {
        if let Some(level) = self.log_level {
            base.log_level = level;
        }
        base.json_format |= self.log_json;
        base
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match (&cli.server, &cli.client) {
        (Some(path), _) => run_server(&cli, path).await,
        (None, Some(addr)) => run_client(&cli, addr).await,
        (None, None) => Ok(()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(cli: &Cli, path: &Path) -> Result<()> {
    let file = ConfigFile::from_file(path)?;
    logging::init(&cli.logging(file.logging.clone()))?;

    if cli.dryrun {
        println!("{}", serde_json::to_string_pretty(&file.model)?);
        return Ok(());
    }

    info!(config = %path.display(), "Starting server");
    start_server(Arc::new(file.model), print_packet).await
}

async fn run_client(cli: &Cli, addr: &str) -> Result<()> {
    logging::init(&cli.logging(LoggingConfig::default()))?;

    let launcher = Rtl433Launcher::new(&cli.rtl433);
    let client = Client::new(addr, launcher.clone())?;

    if cli.dryrun {
        let config = client.fetch_config().await?;
        println!("{}", launcher.command_line(&config.decoder).join(" "));
        return Ok(());
    }

    info!(server = client.server(), "Starting client");
    tokio::select! {
        result = client.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C signal, shutting down");
            Ok(())
        }
    }
}

/// Write one packet to stdout as a JSON line.
fn print_packet(_server: &ServerIdentity, client: &ClientIdentity, packet: &Packet) -> Result<()> {
    let mut line = packet.fields.clone();
    line.insert("received_at".into(), Value::from(packet.received_at_millis()));
    line.insert("client".into(), Value::from(client.to_string()));

    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, &line)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
