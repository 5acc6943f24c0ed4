//! Socket listener that serves worker requests.
//!
//! One request and one response per connection, each connection on its own
//! thread. The listener owns the socket file for as long as it runs.

mod connection;
mod core;
mod lifecycle;


pub use core::{ServerError, SocketServer, MAX_CONNECTIONS};
