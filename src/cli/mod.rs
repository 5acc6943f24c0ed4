//! Command-line front end of the `notebridge` binary.

mod dispatch;
mod services;
mod types;

pub use dispatch::dispatch;
pub use types::Cli;
