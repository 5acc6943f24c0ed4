//! Scripts launched when the host starts serving.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::ProcessLauncher;
use crate::config::ScriptConfig;

/// Delayed auto-start launches still waiting for their turn.
///
/// Launched workers are not tracked here; their handles are dropped and each
/// is reaped when it exits.
pub struct AutoStart {
    launched: usize,
    pending: Vec<(Sender<()>, JoinHandle<()>)>,
}

impl AutoStart {
    /// Workers started without delay.
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Delayed launches not yet started or cancelled.
    pub fn pending(&self) -> usize {
        self.pending.iter().filter(|(_, handle)| !handle.is_finished()).count()
    }

    /// Drop every launch that has not happened yet.
    pub fn cancel(self) {
        for (wake, handle) in self.pending {
            drop(wake);
            if handle.join().is_err() {
                tracing::error!("Auto-start thread panicked");
            }
        }
    }
}

impl ProcessLauncher {
    /// Launch every script in `scripts` flagged `auto_start`, resolved against
    /// `folder`. Scripts with a delay are launched from a background thread.
    pub fn auto_start(&self, folder: &Path, scripts: &BTreeMap<String, ScriptConfig>) -> AutoStart {
        let mut auto = AutoStart {
            launched: 0,
            pending: Vec::new(),
        };

        for (key, entry) in scripts.iter().filter(|(_, entry)| entry.auto_start) {
            let script = folder.join(key);
            if !script.is_file() {
                tracing::warn!(script = %key, "Auto-start script not found");
                continue;
            }

            if entry.auto_start_delay_secs == 0 {
                tracing::info!(script = %key, "Auto-starting script");
                if self.launch(&script).is_ok() {
                    auto.launched += 1;
                }
                continue;
            }

            let delay = Duration::from_secs(entry.auto_start_delay_secs);
            tracing::info!(script = %key, delay_secs = delay.as_secs(), "Auto-start scheduled");
            let (wake, cancelled) = mpsc::channel::<()>();
            let launcher = self.clone();
            let spawned = thread::Builder::new()
                .name("auto-start".to_string())
                .spawn(move || match cancelled.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {
                        // Failures are already notified by launch
                        let _ = launcher.launch(&script);
                    }
                    _ => tracing::debug!(script = %script.display(), "Auto-start cancelled"),
                });
            match spawned {
                Ok(handle) => auto.pending.push((wake, handle)),
                Err(e) => tracing::error!(script = %key, error = %e, "Failed to schedule auto-start"),
            }
        }
        auto
    }
}
