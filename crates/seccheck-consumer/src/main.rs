//! # seccheck-server
//!
//! Reference consumer: listens for remote senders and prints every event
//! it receives, one line per event.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use seccheck_common::config::ConsumerConfig;
use seccheck_common::constants::{BIN_NAME, DEFAULT_BACKLOG, DEFAULT_SOCKET_PATH};
use seccheck_consumer::Server;
use seccheck_consumer::output::default_dispatcher;
use tracing_subscriber::EnvFilter;

/// Receives checkpoint events streamed over a Unix socket.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
struct Cli {
    /// Path of the listening socket.
    #[arg(env = "SECCHECK_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket_path: PathBuf,

    /// Pending-connection backlog.
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    backlog: i32,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[allow(clippy::print_stdout)]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let config = ConsumerConfig {
        socket_path: cli.socket_path,
        backlog: cli.backlog,
        ..ConsumerConfig::default()
    };
    println!("Socket address {}", config.socket_path.display());

    let server = Server::bind(&config, default_dispatcher())
        .with_context(|| format!("cannot listen on {}", config.socket_path.display()))?;
    server.run().context("consumer stopped")
}
