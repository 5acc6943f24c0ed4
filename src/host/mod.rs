//! The host application as seen by the bridge.
//!
//! The document model is not safe for concurrent use, so every access goes
//! through [`MainContext`], which runs host calls one at a time on a single
//! thread. Connection handlers and the launcher only hold a cloneable
//! [`MainContextHandle`].

mod context;
mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{MainContext, MainContextHandle};
pub use vault::FileVault;

use serde_yaml::Mapping;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::broker::InputDialog;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("No active note")]
    NoActiveNote,
    #[error("Note not found: {0}")]
    NotFound(String),
    #[error("Invalid frontmatter in {path}: {reason}")]
    InvalidFrontmatter { path: String, reason: String },
    #[error("Not supported by this host: {0}")]
    Unsupported(&'static str),
    #[error("Host main context is not running")]
    Unavailable,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Accessors the bridge needs from the host application.
///
/// Implementations run on the host's main context only; methods may assume
/// exclusive access. `open_input_dialog` must return promptly and keep the
/// dialog until the end user confirms or dismisses it.
pub trait Host: Send {
    /// Text of the active note, `None` when no note is open.
    fn active_note_content(&mut self) -> Result<Option<String>, HostError>;

    /// Vault-relative path of the active note.
    fn active_note_relative_path(&self) -> Option<String>;

    /// File name of the active note without extension.
    fn active_note_title(&self) -> Option<String>;

    /// Absolute path of the vault root, if the host is file-backed.
    fn vault_path(&self) -> Option<PathBuf>;

    /// Frontmatter of the active note.
    ///
    /// `Err(NoActiveNote)` when nothing is open, `Ok(None)` when the note has
    /// no frontmatter.
    fn active_note_frontmatter(&mut self) -> Result<Option<Mapping>, HostError>;

    /// Show a transient notification to the end user.
    fn notify(&mut self, text: &str, duration: Duration);

    fn open_input_dialog(&mut self, dialog: InputDialog);

    /// Vault-relative paths of every note.
    fn note_paths(&self) -> Result<Vec<String>, HostError> {
        Err(HostError::Unsupported("listing notes"))
    }

    fn note_content(&mut self, relative_path: &str) -> Result<String, HostError> {
        Err(HostError::NotFound(relative_path.to_string()))
    }

    fn note_frontmatter(&mut self, relative_path: &str) -> Result<Option<Mapping>, HostError> {
        Err(HostError::NotFound(relative_path.to_string()))
    }

    fn modify_note(&mut self, relative_path: &str, _content: &str) -> Result<(), HostError> {
        Err(HostError::NotFound(relative_path.to_string()))
    }
}
