pub mod broker;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod frontmatter;
pub mod host;
pub mod launcher;
pub mod logging;
pub mod protocol;
pub mod server;

/// Default file name of the host socket inside the temp directory.
pub const DEFAULT_SOCKET_NAME: &str = "notebridge.sock";
