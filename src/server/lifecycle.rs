//! SocketServer lifecycle methods: start, stop and the accept loop.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::connection::{handle_connection, reject_connection};
use super::core::{ServerError, SocketServer, ACCEPT_POLL_INTERVAL, MAX_CONNECTIONS};
use crate::dispatch::Dispatcher;

impl SocketServer {
    /// Bind the socket and start accepting connections in the background.
    ///
    /// A socket file left behind by an unclean shutdown is removed first. If
    /// a live listener still answers on it, fails with
    /// [`ServerError::AlreadyBound`] instead. Starting a running server is a
    /// no-op.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }

        self.remove_stale_socket()?;

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| ServerError::from_io(&self.socket_path, "Failed to bind Unix socket", e))?;

        // Owner read/write only
        fs::set_permissions(&self.socket_path, Permissions::from_mode(0o600)).map_err(|e| {
            ServerError::from_io(&self.socket_path, "Failed to set socket permissions", e)
        })?;

        // Non-blocking so the loop can observe the shutdown flag
        listener.set_nonblocking(true).map_err(|e| {
            ServerError::from_io(&self.socket_path, "Failed to set socket to non-blocking", e)
        })?;

        self.shutdown_flag.store(false, Ordering::Relaxed);
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let connection_count = Arc::clone(&self.connection_count);

        let handle = thread::Builder::new()
            .name("socket-accept".to_string())
            .spawn(move || accept_loop(listener, dispatcher, shutdown_flag, connection_count))
            .map_err(|e| ServerError::Io {
                context: "Failed to spawn accept thread",
                source: e,
            })?;
        self.accept_thread = Some(handle);

        tracing::info!(socket = %self.socket_path.display(), "Socket listener started");
        Ok(())
    }

    /// Stop accepting, wait for in-flight connections, remove the socket file.
    ///
    /// Stopping a server that is not running does nothing.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        let Some(handle) = self.accept_thread.take() else {
            return Ok(());
        };

        self.shutdown_flag.store(true, Ordering::Relaxed);
        if handle.join().is_err() {
            tracing::error!("Accept thread panicked");
        }

        self.cleanup()?;
        tracing::info!(socket = %self.socket_path.display(), "Socket listener stopped");
        Ok(())
    }

    fn remove_stale_socket(&self) -> Result<(), ServerError> {
        if UnixStream::connect(&self.socket_path).is_ok() {
            return Err(ServerError::AlreadyBound(self.socket_path.clone()));
        }

        // Ignore NotFound to avoid a TOCTOU race
        match fs::remove_file(&self.socket_path) {
            Ok(()) => {
                tracing::info!(socket = %self.socket_path.display(), "Removed stale socket file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::from_io(
                &self.socket_path,
                "Failed to remove stale socket file",
                e,
            )),
        }
    }

    pub(super) fn cleanup(&self) -> Result<(), ServerError> {
        remove_socket_file(&self.socket_path)
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Failed to stop socket listener cleanly");
        }
    }
}

fn remove_socket_file(path: &Path) -> Result<(), ServerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServerError::from_io(path, "Failed to remove socket file", e)),
    }
}

fn accept_loop(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    shutdown_flag: Arc<AtomicBool>,
    connection_count: Arc<AtomicUsize>,
) {
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown_flag.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                // Check connection limit before accepting
                let current = connection_count.load(Ordering::Relaxed);
                if current >= MAX_CONNECTIONS {
                    tracing::warn!(limit = MAX_CONNECTIONS, "Connection limit reached, rejecting");
                    if let Err(e) = reject_connection(stream) {
                        tracing::debug!(error = %e, "Rejected connection dropped");
                    }
                    continue;
                }

                connection_count.fetch_add(1, Ordering::Relaxed);
                let dispatcher = Arc::clone(&dispatcher);
                let connection_count_for_thread = Arc::clone(&connection_count);

                let spawned = thread::Builder::new()
                    .name("socket-conn".to_string())
                    .spawn(move || {
                        let result = handle_connection(stream, &dispatcher);
                        connection_count_for_thread.fetch_sub(1, Ordering::Relaxed);
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "Connection dropped");
                        }
                    });
                match spawned {
                    Ok(handle) => in_flight.push(handle),
                    Err(e) => {
                        connection_count.fetch_sub(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "Failed to spawn connection handler");
                    }
                }
                in_flight.retain(|handle| !handle.is_finished());
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "Accept error");
                break;
            }
        }
    }

    drop(listener);
    for handle in in_flight {
        if handle.join().is_err() {
            tracing::error!("Connection handler panicked");
        }
    }
}
