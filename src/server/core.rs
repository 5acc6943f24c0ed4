//! Core SocketServer struct and constructors.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::Dispatcher;

/// Maximum number of concurrent worker connections allowed.
pub const MAX_CONNECTIONS: usize = 100;

/// How long a connection may take to deliver its request.
pub(super) const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a connection turned away at the limit may take to send its request.
pub(super) const REJECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Sleep between polls of the non-blocking listener.
pub(super) const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    /// Another listener is answering on the socket path.
    #[error("socket {} is already in use by a running listener", .0.display())]
    AlreadyBound(PathBuf),
    #[error("permission denied for socket {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub(super) fn from_io(path: &Path, context: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => ServerError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            io::ErrorKind::AddrInUse => ServerError::AlreadyBound(path.to_path_buf()),
            _ => ServerError::Io { context, source },
        }
    }
}

/// Listener on a Unix domain socket, dispatching each request it receives.
pub struct SocketServer {
    pub(super) socket_path: PathBuf,
    pub(super) dispatcher: Arc<Dispatcher>,
    pub(super) shutdown_flag: Arc<AtomicBool>,
    pub(super) connection_count: Arc<AtomicUsize>,
    pub(super) accept_thread: Option<JoinHandle<()>>,
}

impl SocketServer {
    /// Create a server for `socket_path`. Nothing is bound until
    /// [`start`](Self::start).
    pub fn new(socket_path: &Path, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
            dispatcher,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            connection_count: Arc::new(AtomicUsize::new(0)),
            accept_thread: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.accept_thread.is_some()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }
}
