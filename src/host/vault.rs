//! Host backed by a directory of Markdown notes.

use serde_yaml::Mapping;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use super::{Host, HostError};
use crate::broker::{InputDialog, TerminalPrompter};
use crate::frontmatter::extract_frontmatter;

/// A vault directory with at most one active note.
///
/// Notifications go to stdout; input dialogs go to the attached
/// [`TerminalPrompter`], or are dismissed when there is none.
pub struct FileVault {
    root: PathBuf,
    active: Option<String>,
    prompter: Option<TerminalPrompter>,
}

impl FileVault {
    pub fn new(root: &Path) -> Result<Self, HostError> {
        let root = root.canonicalize().map_err(|source| HostError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            active: None,
            prompter: None,
        })
    }

    pub fn with_prompter(mut self, prompter: TerminalPrompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Make `relative_path` the active note.
    pub fn open_note(&mut self, relative_path: &str) -> Result<(), HostError> {
        let path = self.resolve(relative_path)?;
        if !path.is_file() {
            return Err(HostError::NotFound(relative_path.to_string()));
        }
        self.active = Some(normalize_separators(relative_path));
        Ok(())
    }

    pub fn close_note(&mut self) {
        self.active = None;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a vault-relative path onto the filesystem, refusing escapes.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, HostError> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative_path.is_empty() || escapes {
            return Err(HostError::NotFound(relative_path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, relative_path: &str) -> Result<String, HostError> {
        let path = self.resolve(relative_path)?;
        if !path.is_file() {
            return Err(HostError::NotFound(relative_path.to_string()));
        }
        fs::read_to_string(&path).map_err(|source| HostError::Io {
            path: relative_path.to_string(),
            source,
        })
    }

    fn frontmatter_of(&self, relative_path: &str) -> Result<Option<Mapping>, HostError> {
        let content = self.read(relative_path)?;
        extract_frontmatter(&content).map_err(|e| HostError::InvalidFrontmatter {
            path: relative_path.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Host for FileVault {
    fn active_note_content(&mut self) -> Result<Option<String>, HostError> {
        match self.active.clone() {
            Some(path) => self.read(&path).map(Some),
            None => Ok(None),
        }
    }

    fn active_note_relative_path(&self) -> Option<String> {
        self.active.clone()
    }

    fn active_note_title(&self) -> Option<String> {
        let active = self.active.as_deref()?;
        Path::new(active)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    fn vault_path(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn active_note_frontmatter(&mut self) -> Result<Option<Mapping>, HostError> {
        let active = self.active.clone().ok_or(HostError::NoActiveNote)?;
        self.frontmatter_of(&active)
    }

    fn notify(&mut self, text: &str, duration: Duration) {
        tracing::debug!(duration = ?duration, "Notification");
        println!("[notice] {text}");
    }

    fn open_input_dialog(&mut self, dialog: InputDialog) {
        match &self.prompter {
            Some(prompter) => prompter.open(dialog),
            None => {
                tracing::warn!(
                    title = %dialog.spec().prompt_title,
                    "No input prompter attached; dismissing dialog"
                );
                dialog.dismiss();
            }
        }
    }

    fn note_paths(&self) -> Result<Vec<String>, HostError> {
        let pattern = format!(
            "{}/**/*.md",
            glob::Pattern::escape(&self.root.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|e| HostError::Io {
            path: pattern.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.msg),
        })?;

        let mut paths: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let relative = path.strip_prefix(&self.root).ok()?.to_path_buf();
                let hidden = relative
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
                (!hidden).then(|| normalize_separators(&relative.to_string_lossy()))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn note_content(&mut self, relative_path: &str) -> Result<String, HostError> {
        self.read(relative_path)
    }

    fn note_frontmatter(&mut self, relative_path: &str) -> Result<Option<Mapping>, HostError> {
        self.frontmatter_of(relative_path)
    }

    fn modify_note(&mut self, relative_path: &str, content: &str) -> Result<(), HostError> {
        let path = self.resolve(relative_path)?;
        if !path.is_file() {
            return Err(HostError::NotFound(relative_path.to_string()));
        }
        fs::write(&path, content).map_err(|source| HostError::Io {
            path: relative_path.to_string(),
            source,
        })?;
        tracing::info!(note = relative_path, "Note modified");
        Ok(())
    }
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
