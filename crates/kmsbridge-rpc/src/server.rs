//! Unix domain socket gRPC server.
//!
//! Lifecycle: `NotStarted -> Listening -> Draining -> Stopped`, or straight
//! from `Listening` to `Stopped` on a hard stop. A server instance runs at
//! most once.
//!
//! Graceful shutdown closes the listener first, so new connections are
//! refused, then lets in-flight calls finish. A hard stop additionally fails
//! every in-flight call with `Cancelled`.

use crate::grpc::{KmsAdapter, LegacyKmsAdapter};
use futures::stream::{self, Stream};
use kmsbridge_core::{CancellationToken, KmsService};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch};
use tonic::transport::Server;
use tracing::{debug, info, warn};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Listening,
    Draining,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Errors that end `listen_and_serve`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already started; a server instance runs once")]
    AlreadyStarted,

    #[error("socket {} is in use by a running listener", path.display())]
    AddressInUse { path: PathBuf },

    #[error("cannot remove stale socket {}: {source}", path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot listen on {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Transport tunables.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Server-side upper bound applied to every call, on top of the caller's deadline.
    pub request_timeout: Option<Duration>,
}

/// gRPC server bound to a Unix socket path.
pub struct SocketServer {
    socket_path: PathBuf,
    service: Arc<dyn KmsService>,
    settings: ServerSettings,
    state: Arc<watch::Sender<ServerState>>,
    started: AtomicBool,
    drain: CancellationToken,
    halt: CancellationToken,
}

/// Cloneable control handle for a [`SocketServer`].
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<watch::Sender<ServerState>>,
    drain: CancellationToken,
    halt: CancellationToken,
}

impl ServerHandle {
    /// Stop accepting connections and let in-flight calls finish.
    pub fn shutdown(&self) {
        info!("Graceful shutdown requested");
        self.state.send_if_modified(|state| {
            if *state == ServerState::Listening {
                *state = ServerState::Draining;
                true
            } else {
                false
            }
        });
        self.drain.cancel();
    }

    /// Stop immediately, failing in-flight calls with `Cancelled`.
    pub fn close(&self) {
        warn!("Hard stop requested");
        self.halt.cancel();
        self.drain.cancel();
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the server reaches `target`.
    pub async fn wait_for(&self, target: ServerState) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel stays open.
        let _ = rx.wait_for(|state| *state == target).await;
    }
}

impl SocketServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        service: Arc<dyn KmsService>,
        settings: ServerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ServerState::NotStarted);
        Self {
            socket_path: socket_path.into(),
            service,
            settings,
            state: Arc::new(state),
            started: AtomicBool::new(false),
            drain: CancellationToken::new(),
            halt: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: self.state.clone(),
            drain: self.drain.clone(),
            halt: self.halt.clone(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and serve until shutdown.
    ///
    /// Returns `Ok(())` after a graceful or hard stop. The socket file is
    /// removed once serving ends.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        if self.drain.is_cancelled() {
            debug!("Shutdown requested before start, not binding");
            self.state.send_replace(ServerState::Stopped);
            return Ok(());
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.send_replace(ServerState::Stopped);
                return Err(e);
            }
        };

        self.state.send_replace(ServerState::Listening);
        info!("KMS plugin listening on {}", self.socket_path.display());

        let result = self.serve(listener).await;

        self.remove_socket_file();
        self.state.send_replace(ServerState::Stopped);
        match &result {
            Ok(()) => info!("KMS plugin server stopped"),
            Err(e) => warn!("KMS plugin server stopped with error: {}", e),
        }
        result
    }

    async fn bind(&self) -> Result<UnixListener, ServerError> {
        remove_stale_socket(&self.socket_path).await?;
        UnixListener::bind(&self.socket_path).map_err(|source| ServerError::Bind {
            path: self.socket_path.clone(),
            source,
        })
    }

    async fn serve(&self, listener: UnixListener) -> Result<(), ServerError> {
        let (closed_tx, closed_rx) = oneshot::channel::<()>();
        let incoming = accept_until_drained(listener, closed_tx, self.drain.clone());

        let mut builder = Server::builder();
        if let Some(timeout) = self.settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .add_service(LegacyKmsAdapter::new(self.service.clone(), self.halt.clone()).into_server())
            .add_service(KmsAdapter::new(self.service.clone(), self.halt.clone()).into_server())
            .serve_with_incoming_shutdown(incoming, async move {
                // Resolves when the accept stream drops its sender.
                let _ = closed_rx.await;
            })
            .await?;
        Ok(())
    }

    fn remove_socket_file(&self) {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!("Removed socket {}", self.socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove socket {}: {}",
                self.socket_path.display(),
                e
            ),
        }
    }
}

/// Accept connections until `drain` fires, then drop the listener.
///
/// Dropping the listener refuses new connections right away; dropping
/// `closed` tells the transport to finish up.
fn accept_until_drained(
    listener: UnixListener,
    closed: oneshot::Sender<()>,
    drain: CancellationToken,
) -> impl Stream<Item = std::io::Result<UnixStream>> {
    stream::unfold(Some((listener, closed, drain)), |state| async move {
        let (listener, closed, drain) = state?;
        let accepted = tokio::select! {
            _ = drain.cancelled() => None,
            accepted = listener.accept() => Some(accepted),
        };

        match accepted {
            Some(accepted) => {
                let connection = accepted.map(|(stream, _)| stream);
                Some((connection, Some((listener, closed, drain))))
            }
            None => {
                debug!("Listener closed, no longer accepting connections");
                None
            }
        }
    })
}

/// Clear a leftover socket file at `path`.
///
/// A path that accepts connections belongs to a running server and is left
/// alone. Anything else at the path is removed.
pub async fn remove_stale_socket(path: &Path) -> Result<(), ServerError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ServerError::StaleSocket {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    if UnixStream::connect(path).await.is_ok() {
        return Err(ServerError::AddressInUse {
            path: path.to_path_buf(),
        });
    }

    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ServerError::StaleSocket {
            path: path.to_path_buf(),
            source,
        }),
    }
}
