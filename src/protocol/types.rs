use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::broker::InputRequestSpec;
use crate::frontmatter::FrontmatterMap;

/// Capability a worker can invoke over the socket.
///
/// The set is closed: decoding maps every other tag to
/// [`CodecError::UnknownAction`](super::CodecError::UnknownAction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTag {
    GetActiveNoteContent,
    GetActiveNoteAbsolutePath,
    GetActiveNoteRelativePath,
    GetActiveNoteTitle,
    GetCurrentVaultAbsolutePath,
    ShowNotification,
    GetFrontmatter,
    RequestUserInput,
    GetAllNotePaths,
    GetNoteContent,
    GetNoteFrontmatter,
    ModifyNoteContent,
    Ping,
    GetScriptSettings,
}

impl ActionTag {
    pub const ALL: [ActionTag; 14] = [
        ActionTag::GetActiveNoteContent,
        ActionTag::GetActiveNoteAbsolutePath,
        ActionTag::GetActiveNoteRelativePath,
        ActionTag::GetActiveNoteTitle,
        ActionTag::GetCurrentVaultAbsolutePath,
        ActionTag::ShowNotification,
        ActionTag::GetFrontmatter,
        ActionTag::RequestUserInput,
        ActionTag::GetAllNotePaths,
        ActionTag::GetNoteContent,
        ActionTag::GetNoteFrontmatter,
        ActionTag::ModifyNoteContent,
        ActionTag::Ping,
        ActionTag::GetScriptSettings,
    ];

    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionTag::GetActiveNoteContent => "get_active_note_content",
            ActionTag::GetActiveNoteAbsolutePath => "get_active_note_absolute_path",
            ActionTag::GetActiveNoteRelativePath => "get_active_note_relative_path",
            ActionTag::GetActiveNoteTitle => "get_active_note_title",
            ActionTag::GetCurrentVaultAbsolutePath => "get_current_vault_absolute_path",
            ActionTag::ShowNotification => "show_notification",
            ActionTag::GetFrontmatter => "get_frontmatter",
            ActionTag::RequestUserInput => "request_user_input",
            ActionTag::GetAllNotePaths => "get_all_note_paths",
            ActionTag::GetNoteContent => "get_note_content",
            ActionTag::GetNoteFrontmatter => "get_note_frontmatter",
            ActionTag::ModifyNoteContent => "modify_note_content",
            ActionTag::Ping => "_test_connection_ping",
            ActionTag::GetScriptSettings => "get_script_settings",
        }
    }

    /// Look up an action by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == name)
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded worker request with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetActiveNoteContent,
    GetActiveNoteAbsolutePath,
    GetActiveNoteRelativePath,
    GetActiveNoteTitle,
    GetCurrentVaultAbsolutePath,
    ShowNotification {
        text: String,
        /// Display duration in milliseconds; the host default applies when absent.
        duration_ms: Option<u64>,
    },
    GetFrontmatter,
    RequestUserInput(InputRequestSpec),
    GetAllNotePaths,
    GetNoteContent {
        path: String,
    },
    GetNoteFrontmatter {
        path: String,
    },
    ModifyNoteContent {
        file_path: String,
        content: String,
    },
    /// Connectivity check; answered without touching the host.
    Ping,
    GetScriptSettings {
        /// Script path relative to the scripts folder.
        script_path: String,
    },
}

impl Request {
    pub fn action(&self) -> ActionTag {
        match self {
            Request::GetActiveNoteContent => ActionTag::GetActiveNoteContent,
            Request::GetActiveNoteAbsolutePath => ActionTag::GetActiveNoteAbsolutePath,
            Request::GetActiveNoteRelativePath => ActionTag::GetActiveNoteRelativePath,
            Request::GetActiveNoteTitle => ActionTag::GetActiveNoteTitle,
            Request::GetCurrentVaultAbsolutePath => ActionTag::GetCurrentVaultAbsolutePath,
            Request::ShowNotification { .. } => ActionTag::ShowNotification,
            Request::GetFrontmatter => ActionTag::GetFrontmatter,
            Request::RequestUserInput(_) => ActionTag::RequestUserInput,
            Request::GetAllNotePaths => ActionTag::GetAllNotePaths,
            Request::GetNoteContent { .. } => ActionTag::GetNoteContent,
            Request::GetNoteFrontmatter { .. } => ActionTag::GetNoteFrontmatter,
            Request::ModifyNoteContent { .. } => ActionTag::ModifyNoteContent,
            Request::Ping => ActionTag::Ping,
            Request::GetScriptSettings { .. } => ActionTag::GetScriptSettings,
        }
    }
}

/// Success payloads, one shape per action family.
///
/// Serialized untagged: each variant is exactly the JSON object a worker sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Content {
        content: Option<String>,
    },
    AbsolutePath {
        #[serde(rename = "absolutePath")]
        absolute_path: Option<String>,
    },
    RelativePath {
        #[serde(rename = "relativePath")]
        relative_path: Option<String>,
    },
    Title {
        title: Option<String>,
    },
    VaultPath {
        #[serde(rename = "vaultPath")]
        vault_path: Option<String>,
    },
    Status {
        status: &'static str,
    },
    Frontmatter {
        frontmatter: Option<FrontmatterMap>,
    },
    UserInput {
        #[serde(rename = "userInput")]
        user_input: Value,
    },
    Paths {
        paths: Vec<String>,
    },
    Settings {
        settings: Map<String, Value>,
    },
}

/// Exactly one of these is written back per accepted request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(Payload),
    Error { error: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// Instruction a worker prints on stdout for the host to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Command {
    #[serde(rename = "show_notification")]
    Notify { text: String },
}
