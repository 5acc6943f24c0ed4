//! Per-connection request handling.

use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use super::core::{READ_TIMEOUT, REJECT_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::protocol::{encode_response, read_frame, write_frame, FrameError, Response};

/// Serve exactly one request on `stream`, then close it.
///
/// Every connection that delivered any part of a request gets one response.
/// A peer that disconnects without sending anything gets none.
pub(super) fn handle_connection(mut stream: UnixStream, dispatcher: &Dispatcher) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode from the listener
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let response = match read_frame(&mut stream) {
        Ok(body) => dispatcher.handle_bytes(&body),
        Err(FrameError::Closed) => {
            tracing::debug!("Connection closed without a request");
            return Ok(());
        }
        Err(e) if e.request_started() => {
            tracing::warn!(error = %e, "Unreadable request");
            Response::error("Invalid request format")
        }
        Err(FrameError::Io(e)) => return Err(e),
        Err(e) => return Err(io::Error::other(e)),
    };

    write_frame(&mut stream, &encode_response(&response))?;
    // The peer may already be gone
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

/// Answer a connection over the limit with a busy error instead of dispatching it.
///
/// The request is read first so the reply is not lost to a reset. Runs on the
/// accept thread, hence the short timeouts.
pub(super) fn reject_connection(mut stream: UnixStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(REJECT_TIMEOUT))?;
    stream.set_write_timeout(Some(REJECT_TIMEOUT))?;

    match read_frame(&mut stream) {
        Ok(_) => {}
        Err(e) if e.request_started() => {}
        Err(FrameError::Closed) => return Ok(()),
        Err(FrameError::Io(e)) => return Err(e),
        Err(e) => return Err(io::Error::other(e)),
    }

    write_frame(&mut stream, &encode_response(&Response::error("Server busy")))?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}
