//! In-memory host for unit tests.

use serde_yaml::Mapping;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Host, HostError};
use crate::broker::InputDialog;
use crate::frontmatter::extract_frontmatter;

enum DialogPolicy {
    Answer(VecDeque<String>),
    Dismiss,
    Hold(Vec<InputDialog>),
}

pub(crate) struct ScriptedHost {
    vault: Option<PathBuf>,
    note: Option<(String, String)>,
    dialogs: DialogPolicy,
    panic_on_title: bool,
    pub(crate) notifications: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHost {
    fn new(dialogs: DialogPolicy) -> Self {
        Self {
            vault: Some(PathBuf::from("/vault")),
            note: None,
            dialogs,
            panic_on_title: false,
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Confirms each dialog with the next answer; dismisses once they run out.
    pub(crate) fn answering<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DialogPolicy::Answer(
            answers.into_iter().map(Into::into).collect(),
        ))
    }

    pub(crate) fn dismissing() -> Self {
        Self::new(DialogPolicy::Dismiss)
    }

    /// Keeps every dialog open forever.
    pub(crate) fn holding() -> Self {
        Self::new(DialogPolicy::Hold(Vec::new()))
    }

    pub(crate) fn with_note(relative_path: &str, content: &str) -> Self {
        Self::dismissing().note(relative_path, content)
    }

    pub(crate) fn note(mut self, relative_path: &str, content: &str) -> Self {
        self.note = Some((relative_path.to_string(), content.to_string()));
        self
    }

    /// Panics on the main context when asked for the active note title.
    pub(crate) fn panicking(mut self) -> Self {
        self.panic_on_title = true;
        self
    }

    pub(crate) fn without_vault(mut self) -> Self {
        self.vault = None;
        self
    }
}

impl Host for ScriptedHost {
    fn active_note_content(&mut self) -> Result<Option<String>, HostError> {
        Ok(self.note.as_ref().map(|(_, content)| content.clone()))
    }

    fn active_note_relative_path(&self) -> Option<String> {
        self.note.as_ref().map(|(path, _)| path.clone())
    }

    fn active_note_title(&self) -> Option<String> {
        if self.panic_on_title {
            panic!("host failed while reading the note title");
        }
        self.note.as_ref().and_then(|(path, _)| {
            std::path::Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
    }

    fn vault_path(&self) -> Option<PathBuf> {
        self.vault.clone()
    }

    fn active_note_frontmatter(&mut self) -> Result<Option<Mapping>, HostError> {
        let (path, content) = self.note.as_ref().ok_or(HostError::NoActiveNote)?;
        extract_frontmatter(content).map_err(|e| HostError::InvalidFrontmatter {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    fn notify(&mut self, text: &str, _duration: Duration) {
        self.notifications.lock().unwrap().push(text.to_string());
    }

    fn open_input_dialog(&mut self, mut dialog: InputDialog) {
        match &mut self.dialogs {
            DialogPolicy::Answer(answers) => match answers.pop_front() {
                Some(answer) => {
                    if dialog.confirm(&answer).is_err() {
                        dialog.dismiss();
                    }
                }
                None => dialog.dismiss(),
            },
            DialogPolicy::Dismiss => dialog.dismiss(),
            DialogPolicy::Hold(open) => open.push(dialog),
        }
    }

    fn note_paths(&self) -> Result<Vec<String>, HostError> {
        Ok(self.note.iter().map(|(path, _)| path.clone()).collect())
    }

    fn note_content(&mut self, relative_path: &str) -> Result<String, HostError> {
        match &self.note {
            Some((path, content)) if path == relative_path => Ok(content.clone()),
            _ => Err(HostError::NotFound(relative_path.to_string())),
        }
    }

    fn modify_note(&mut self, relative_path: &str, content: &str) -> Result<(), HostError> {
        match &mut self.note {
            Some((path, existing)) if path == relative_path => {
                *existing = content.to_string();
                Ok(())
            }
            _ => Err(HostError::NotFound(relative_path.to_string())),
        }
    }
}
