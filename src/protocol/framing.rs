use std::io::{self, ErrorKind, Read, Write};
use thiserror::Error;

/// Largest body a peer may announce (10 MB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream before sending anything.
    #[error("connection closed before a message was sent")]
    Closed,
    #[error("message truncated: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },
    #[error("message too large: {0} bytes")]
    TooLarge(usize),
    #[error("I/O error while reading message: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the peer actually started sending a message.
    ///
    /// Only such connections are owed a reply.
    pub fn request_started(&self) -> bool {
        matches!(self, FrameError::Truncated { .. } | FrameError::TooLarge(_))
    }
}

/// Write one length-prefixed frame.
///
/// Format: 4-byte big-endian length prefix + body
pub fn write_frame<W: Write>(stream: &mut W, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "frame body exceeds u32"))?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

/// Read one length-prefixed frame.
///
/// Distinguishes a peer that never sent anything ([`FrameError::Closed`]) from
/// one that stopped mid-message ([`FrameError::Truncated`]). A read timeout
/// after part of a message arrived also counts as truncation.
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_bytes = [0u8; 4];
    let filled = read_full(stream, &mut len_bytes, false)?;
    if filled == 0 {
        return Err(FrameError::Closed);
    }
    if filled < len_bytes.len() {
        return Err(FrameError::Truncated {
            expected: len_bytes.len(),
            received: filled,
        });
    }

    let len = usize::try_from(u32::from_be_bytes(len_bytes)).unwrap_or(usize::MAX);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    let received = read_full(stream, &mut body, true)?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }
    Ok(body)
}

/// Fill `buf` until EOF or, once the message has `started`, a read timeout.
/// Returns the number of bytes actually read.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8], started: bool) -> Result<usize, FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) && (started || filled > 0) => break,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(filled)
}

// Socket read timeouts surface as WouldBlock on Unix
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_then_read_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, br#"{"action":"get_active_note_title"}"#).unwrap();
        assert_eq!(&buffer[..4], &34u32.to_be_bytes());

        let body = read_frame(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(body, br#"{"action":"get_active_note_title"}"#);
    }

    #[test]
    fn test_empty_stream_is_closed() {
        let result = read_frame(&mut Cursor::new(Vec::new()));
        assert!(matches!(result, Err(FrameError::Closed)));
        assert!(!result.unwrap_err().request_started());
    }

    #[test]
    fn test_partial_length_prefix_is_truncated() {
        let result = read_frame(&mut Cursor::new(vec![0u8, 0]));
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 4,
                received: 2
            }
        ));
        assert!(err.request_started());
    }

    #[test]
    fn test_short_body_is_truncated() {
        let mut buffer = 10u32.to_be_bytes().to_vec();
        buffer.extend_from_slice(b"{\"ac");
        let err = read_frame(&mut Cursor::new(buffer)).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 10,
                received: 4
            }
        ));
    }

    #[test]
    fn test_read_frame_too_large() {
        let len: u32 = 20 * 1024 * 1024;
        let err = read_frame(&mut Cursor::new(len.to_be_bytes().to_vec())).unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(err.request_started());
    }

    /// Hands out its chunks, then times out like a stalled socket.
    struct StallingReader {
        chunks: Vec<Vec<u8>>,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "timed out"));
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_stall_mid_body_is_truncated() {
        let mut stream = StallingReader {
            chunks: vec![20u32.to_be_bytes().to_vec(), b"{\"action\"".to_vec()],
        };
        let err = read_frame(&mut stream).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 20,
                received: 9
            }
        ));
        assert!(err.request_started());
    }

    #[test]
    fn test_stall_mid_prefix_is_truncated() {
        let mut stream = StallingReader {
            chunks: vec![vec![0u8]],
        };
        let err = read_frame(&mut stream).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 4,
                received: 1
            }
        ));
    }

    #[test]
    fn test_stall_before_anything_is_io_error() {
        let mut stream = StallingReader { chunks: Vec::new() };
        let err = read_frame(&mut stream).unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
        assert!(!err.request_started());
    }

    #[test]
    fn test_stall_after_prefix_of_empty_body_is_complete() {
        let mut stream = StallingReader {
            chunks: vec![0u32.to_be_bytes().to_vec()],
        };
        assert!(read_frame(&mut stream).unwrap().is_empty());
    }

    #[test]
    fn test_zero_length_frame_is_empty_body() {
        let body = read_frame(&mut Cursor::new(0u32.to_be_bytes().to_vec())).unwrap();
        assert!(body.is_empty());
    }
}
