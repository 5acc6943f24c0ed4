//! Wire protocol between the host and worker scripts.
//!
//! Two directions share this module:
//! - socket requests/responses, one exchange per connection, length-prefixed
//! - commands a worker prints on stdout, one JSON object per line

mod codec;
mod framing;
mod types;

pub use codec::{decode_command, decode_request, encode_response, CodecError};
pub(crate) use codec::preview;
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_SIZE};
pub use types::{ActionTag, Command, Payload, Request, Response};
