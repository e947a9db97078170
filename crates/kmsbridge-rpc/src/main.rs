//! kmsbridge - Kubernetes KMS plugin backed by a KeyControl server.
//!
//! Serves the KMS plugin gRPC API (v1beta1 and v2) on a Unix domain socket and
//! forwards encrypt/decrypt to KeyControl over mutual TLS.

mod grpc;
mod logging;
mod server;
mod supervisor;

use anyhow::Result;
use clap::Parser;
use kmsbridge_core::{BackendConfig, ProtocolConfig, StatusMode};
use logging::LogFormat;
use std::path::PathBuf;
use std::time::Duration;
use supervisor::RunOptions;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kmsbridge", version)]
#[command(about = "Kubernetes KMS plugin backed by KeyControl")]
struct Args {
    /// Unix socket path to serve the plugin API on
    #[arg(long = "sock-file", alias = "sockFile", value_name = "PATH")]
    sock_file: PathBuf,

    /// JSON configuration file
    #[arg(long = "conf-file", alias = "confFile", value_name = "PATH")]
    conf_file: PathBuf,

    /// Upper bound for one KeyControl request, in seconds
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = BackendConfig::REQUEST_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    backend_timeout: u64,

    /// Server-side limit for a whole gRPC call, in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    request_timeout: Option<u64>,

    /// Report health by encrypting a probe value against the backend
    #[arg(long)]
    probe_backend: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn run_options(self) -> RunOptions {
        RunOptions {
            socket_path: self.sock_file,
            config_path: self.conf_file,
            backend_timeout: Duration::from_secs(self.backend_timeout),
            request_timeout: self.request_timeout.map(Duration::from_secs),
            status_mode: if self.probe_backend {
                StatusMode::Probe
            } else {
                StatusMode::Local
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug, args.log_format)?;

    info!(
        "Starting {} {}",
        ProtocolConfig::RUNTIME_NAME,
        ProtocolConfig::RUNTIME_VERSION
    );
    supervisor::run(args.run_options()).await
}
