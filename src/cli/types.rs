use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "notebridge")]
#[command(about = "Local bridge between a notes vault and worker scripts", long_about = None)]
#[command(version)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by NOTEBRIDGE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the host's notes live and which note is open.
#[derive(clap::Args, Debug, Clone)]
pub struct VaultArgs {
    /// Vault root directory
    #[arg(long, default_value = ".")]
    pub vault: PathBuf,

    /// Vault-relative path of the note to treat as active
    #[arg(long)]
    pub note: Option<String>,

    /// Socket path (defaults to the configured one)
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve worker requests until interrupted
    Serve {
        #[command(flatten)]
        vault: VaultArgs,
    },

    /// Run one script against the vault and wait for it to finish
    Run {
        /// Script to run
        script: PathBuf,

        #[command(flatten)]
        vault: VaultArgs,
    },

    /// Run every script in the configured scripts folder, one at a time
    RunAll {
        #[command(flatten)]
        vault: VaultArgs,
    },

    /// Send one raw JSON request to a running host and print the reply
    Call {
        /// Request body, e.g. '{"action":"get_active_note_title"}'
        request: String,

        /// Socket path (defaults to the configured one)
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Show or change the persisted configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Set the scripts folder (absolute or vault-relative)
    SetScriptsFolder { folder: PathBuf },
    /// Set the socket path
    SetSocketPath { path: PathBuf },
    /// Enable or disable passing -B to workers
    SetDisableCache {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}
