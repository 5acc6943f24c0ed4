//! Sequential batch runs over a scripts folder.

use std::path::{Path, PathBuf};

use super::{notify, LaunchError, ProcessLauncher};

/// Outcome counts of [`ProcessLauncher::run_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub launched: usize,
    pub failed_to_launch: usize,
    pub non_zero_exits: usize,
}

/// Scripts directly inside `folder` with the given extension, sorted by file
/// name. Hidden files and subdirectories are skipped.
pub fn discover_scripts(folder: &Path, extension: &str) -> Result<Vec<PathBuf>, LaunchError> {
    if !folder.is_dir() {
        return Err(LaunchError::InvalidFolder {
            folder: folder.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&folder.to_string_lossy()),
        glob::Pattern::escape(extension)
    );
    let entries = glob::glob(&pattern).map_err(|e| LaunchError::InvalidFolder {
        folder: folder.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| !name.to_string_lossy().starts_with('.'))
        })
        .collect();
    scripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(scripts)
}

impl ProcessLauncher {
    /// Run every script in `folder`, one at a time.
    ///
    /// Each worker is waited for before the next starts, so two workers never
    /// talk to the host at once. A script that fails to launch is skipped.
    pub fn run_all(&self, folder: &Path, extension: &str) -> Result<BatchSummary, LaunchError> {
        let scripts = discover_scripts(folder, extension)?;
        let mut summary = BatchSummary::default();

        if scripts.is_empty() {
            tracing::info!(folder = %folder.display(), "No scripts found");
            notify(
                &self.host,
                format!("No scripts found in {}", folder.display()),
                self.notification_duration,
            );
            return Ok(summary);
        }

        tracing::info!(count = scripts.len(), folder = %folder.display(), "Running all scripts");
        for script in &scripts {
            let mut worker = match self.launch(script) {
                Ok(worker) => worker,
                Err(_) => {
                    summary.failed_to_launch += 1;
                    continue;
                }
            };
            summary.launched += 1;
            if !worker.wait()?.success() {
                summary.non_zero_exits += 1;
            }
        }
        Ok(summary)
    }
}
