//! Process wiring: configuration, backend client, server and signals.

use crate::server::{ServerHandle, ServerSettings, ServerState, SocketServer};
use anyhow::{Context, Result};
use kmsbridge_core::{KeyControlClient, KeyControlKmsService, PluginConfig, StatusMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{info, warn};

/// Everything `run` needs from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub socket_path: PathBuf,
    pub config_path: PathBuf,
    pub backend_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub status_mode: StatusMode,
}

/// Build the server from `options` and serve until a signal stops it.
///
/// Any failure before the socket is serving is returned as an error.
pub async fn run(options: RunOptions) -> Result<()> {
    let config = PluginConfig::load(&options.config_path).with_context(|| {
        format!(
            "failed to load configuration from {}",
            options.config_path.display()
        )
    })?;
    info!(
        "Using KeyControl server {} with key {}",
        config.kms_server, config.key_id
    );

    let client = KeyControlClient::from_config(&config, options.backend_timeout)
        .context("failed to set up the KeyControl client")?;
    let service = Arc::new(KeyControlKmsService::new(client, options.status_mode));

    let server = SocketServer::new(
        options.socket_path,
        service,
        ServerSettings {
            request_timeout: options.request_timeout,
        },
    );

    let signals = ShutdownSignals::install().context("failed to install signal handlers")?;
    let forwarder = tokio::spawn(forward_signals(signals, server.handle()));

    let result = server.listen_and_serve().await;
    let _ = forwarder.await;

    result.with_context(|| format!("KMS plugin on {} failed", server.socket_path().display()))
}

struct ShutdownSignals {
    terminate: Signal,
    interrupt: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

/// First signal drains, a second one stops hard. Exits once the server stops.
async fn forward_signals(mut signals: ShutdownSignals, handle: ServerHandle) {
    let mut draining = false;
    loop {
        let name = tokio::select! {
            _ = handle.wait_for(ServerState::Stopped) => return,
            name = signals.next() => name,
        };

        if draining {
            warn!(
                "{} received while {}, stopping immediately",
                name,
                handle.state()
            );
            handle.close();
            return;
        }
        info!(
            "{} received while {}, draining in-flight requests",
            name,
            handle.state()
        );
        handle.shutdown();
        draining = true;
    }
}
