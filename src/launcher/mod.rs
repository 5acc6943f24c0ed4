//! Worker process launcher.
//!
//! Spawns a script under the configured interpreter, turns command lines on
//! its stdout into host actions, and logs everything else. Workers inherit
//! the host's working directory and environment unchanged.

mod autostart;
mod batch;
mod output;
mod settings;

pub use autostart::AutoStart;
pub use batch::{discover_scripts, BatchSummary};
pub use output::{classify_line, OutputLine};
pub use settings::{
    parse_definitions, ScriptSettings, SettingDefinition, DISCOVERY_FLAG, DISCOVERY_TIMEOUT,
    MODE_ENV,
};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

use crate::config::BridgeConfig;
use crate::host::MainContextHandle;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("Interpreter `{interpreter}` not found: {source}")]
    InterpreterNotFound {
        interpreter: String,
        #[source]
        source: which::Error,
    },
    #[error("Failed to start {}: {source}", .script.display())]
    Spawn {
        script: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Settings discovery failed for {}: {reason}", .script.display())]
    Settings { script: PathBuf, reason: String },
    #[error("Invalid scripts folder {}: {reason}", .folder.display())]
    InvalidFolder { folder: PathBuf, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

/// How workers are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub interpreter: String,
    pub disable_bytecode_cache: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

impl LaunchOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            disable_bytecode_cache: config.disable_bytecode_cache,
        }
    }

    /// Interpreter arguments: the optional `-B` flag, then the script path.
    pub fn argv(&self, script: &Path) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(2);
        if self.disable_bytecode_cache {
            argv.push(OsString::from("-B"));
        }
        argv.push(script.as_os_str().to_os_string());
        argv
    }

    /// Look the interpreter up on `PATH`.
    pub fn resolve_interpreter(&self) -> Result<PathBuf, LaunchError> {
        which::which(&self.interpreter).map_err(|source| LaunchError::InterpreterNotFound {
            interpreter: self.interpreter.clone(),
            source,
        })
    }
}

/// Starts workers and reports their fate to the host.
#[derive(Clone)]
pub struct ProcessLauncher {
    host: MainContextHandle,
    options: LaunchOptions,
    notification_duration: Duration,
}

impl ProcessLauncher {
    pub fn new(host: MainContextHandle, options: LaunchOptions, notification_duration: Duration) -> Self {
        Self {
            host,
            options,
            notification_duration,
        }
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Start `script`. Failures are shown to the end user as well as returned.
    pub fn launch(&self, script: &Path) -> Result<WorkerProcess, LaunchError> {
        let result = self.spawn(script);
        if let Err(e) = &result {
            tracing::error!(script = %script.display(), error = %e, "Failed to launch script");
            notify(&self.host, e.to_string(), self.notification_duration);
        }
        result
    }

    fn spawn(&self, script: &Path) -> Result<WorkerProcess, LaunchError> {
        if !script.is_file() {
            return Err(LaunchError::ScriptNotFound(script.to_path_buf()));
        }
        let interpreter = self.options.resolve_interpreter()?;
        let argv = self.options.argv(script);

        let mut child = Command::new(&interpreter)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                script: script.to_path_buf(),
                source,
            })?;

        let name = script_name(script);
        let pid = child.id();
        tracing::info!(script = %name, pid, interpreter = %interpreter.display(), "Started script");

        // Drain both pipes from the start so a chatty worker never blocks on a
        // full pipe buffer.
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let host = self.host.clone();
            let name = name.clone();
            let duration = self.notification_duration;
            readers.push(spawn_reader("worker-stdout", move || {
                output::pump_stdout(stdout, &host, &name, duration)
            })?);
        }
        if let Some(stderr) = child.stderr.take() {
            let name = name.clone();
            readers.push(spawn_reader("worker-stderr", move || {
                output::pump_stderr(stderr, &name)
            })?);
        }

        Ok(WorkerProcess {
            child,
            script_path: script.to_path_buf(),
            argv: std::iter::once(interpreter.into_os_string()).chain(argv).collect(),
            pid,
            readers,
            report: ExitReport {
                name,
                host: self.host.clone(),
                notification_duration: self.notification_duration,
            },
            status: None,
        })
    }
}

fn spawn_reader<F>(name: &str, body: F) -> Result<JoinHandle<()>, LaunchError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| LaunchError::Io {
            context: "Failed to spawn output reader",
            source,
        })
}

/// A running (or finished) worker.
///
/// Dropping the handle before the worker exits leaves it running; it is still
/// reaped and its exit reported once it ends.
pub struct WorkerProcess {
    child: Child,
    script_path: PathBuf,
    argv: Vec<OsString>,
    pid: u32,
    readers: Vec<JoinHandle<()>>,
    report: ExitReport,
    status: Option<ExitStatus>,
}

impl WorkerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Full command line, interpreter first.
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Block until the worker exits and its output is fully processed.
    pub fn wait(&mut self) -> Result<ExitStatus, LaunchError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().map_err(|source| LaunchError::Io {
            context: "Failed to wait for script",
            source,
        })?;
        Ok(self.finish(status))
    }

    /// Like [`wait`](Self::wait), giving up after `timeout` with `Ok(None)`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, LaunchError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        let status = self
            .child
            .wait_timeout(timeout)
            .map_err(|source| LaunchError::Io {
                context: "Failed to wait for script",
                source,
            })?;
        Ok(status.map(|status| self.finish(status)))
    }

    /// Ask the worker to exit with SIGTERM. A worker that already exited is
    /// not an error.
    pub fn terminate(&mut self) -> Result<(), LaunchError> {
        if self.status.is_some() {
            return Ok(());
        }
        let pid = i32::try_from(self.pid).map_err(|_| LaunchError::Io {
            context: "Worker pid out of range",
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(LaunchError::Io {
                context: "Failed to signal script",
                source: io::Error::from(errno),
            }),
        }
    }

    /// Record the exit once; the exit code is only ever logged and notified.
    fn finish(&mut self, status: ExitStatus) -> ExitStatus {
        join_readers(&mut self.readers, &self.report.name);
        self.status = Some(status);
        let outcome = match status.code() {
            Some(code) => ExitOutcome::Code(code),
            None => ExitOutcome::Signal(status.signal()),
        };
        self.report.log(self.pid, outcome);
        status
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.finish(status);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(script = %self.report.name, error = %e, "Failed to poll script");
            }
        }

        let pid = self.pid;
        let mut readers = std::mem::take(&mut self.readers);
        let report = self.report.clone();
        let spawned = thread::Builder::new()
            .name("worker-reaper".to_string())
            .spawn(move || {
                if let Some(outcome) = reap(pid) {
                    join_readers(&mut readers, &report.name);
                    report.log(pid, outcome);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(script = %self.report.name, pid, error = %e, "Failed to start reaper; script left unreaped");
        }
    }
}

enum ExitOutcome {
    Code(i32),
    Signal(Option<i32>),
}

/// What is needed to tell the host how a worker ended.
#[derive(Clone)]
struct ExitReport {
    name: String,
    host: MainContextHandle,
    notification_duration: Duration,
}

impl ExitReport {
    fn log(&self, pid: u32, outcome: ExitOutcome) {
        match outcome {
            ExitOutcome::Code(0) => {
                tracing::info!(script = %self.name, pid, exit_code = 0, "Script finished");
            }
            ExitOutcome::Code(code) => {
                tracing::warn!(script = %self.name, pid, exit_code = code, "Script failed");
                notify(
                    &self.host,
                    format!("Script {} exited with code {code}", self.name),
                    self.notification_duration,
                );
            }
            ExitOutcome::Signal(signal) => {
                tracing::warn!(script = %self.name, pid, signal = ?signal, "Script terminated by signal");
            }
        }
    }
}

// Readers end at EOF, which follows exit unless a grandchild holds the pipes
// open.
fn join_readers(readers: &mut Vec<JoinHandle<()>>, name: &str) {
    for reader in readers.drain(..) {
        if reader.join().is_err() {
            tracing::error!(script = %name, "Output reader panicked");
        }
    }
}

/// Block until `pid` exits. Only for children whose `Child` handle is gone.
fn reap(pid: u32) -> Option<ExitOutcome> {
    let pid = Pid::from_raw(i32::try_from(pid).ok()?);
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Some(ExitOutcome::Code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Some(ExitOutcome::Signal(Some(signal as i32)))
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => {
                tracing::warn!(pid = %pid, error = %e, "Failed to reap script");
                return None;
            }
        }
    }
}

pub(crate) fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}

/// Show `text` on the host, logging instead if the host is gone.
pub(crate) fn notify(host: &MainContextHandle, text: String, duration: Duration) {
    if let Err(e) = host.call(move |host| host.notify(&text, duration)) {
        tracing::warn!(error = %e, "Could not deliver notification");
    }
}
