//! Worker-side client for the bridge socket.

use anyhow::{Context, Result};
use serde_json::Value;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::{read_frame, write_frame};

/// Sends one request per connection and reads its single reply.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    socket_path: PathBuf,
    timeout: Option<Duration>,
}

impl BridgeClient {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
            timeout: None,
        }
    }

    /// Bound how long to wait for the reply. User-input requests may take as
    /// long as the end user does, so there is no default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request(&self, request: &Value) -> Result<Value> {
        let body = serde_json::to_vec(request).context("Failed to serialize request")?;
        let reply = self.request_raw(&body)?;
        serde_json::from_slice(&reply).context("Failed to parse response")
    }

    /// Send `body` as-is and return the raw reply body.
    pub fn request_raw(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.socket_path).with_context(|| {
            format!("Failed to connect to bridge socket {}", self.socket_path.display())
        })?;
        stream
            .set_read_timeout(self.timeout)
            .context("Failed to set read timeout")?;

        write_frame(&mut stream, body).context("Failed to send request")?;
        read_frame(&mut stream).context("Failed to read response")
    }
}
