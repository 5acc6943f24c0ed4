//! Script settings: discovery and resolution.
//!
//! A script declares its settings by printing a JSON array of definitions
//! when run with `--get-settings-json`. Values stored in the bridge config
//! override the declared defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

use super::{discover_scripts, LaunchError, ProcessLauncher};
use crate::config::{normalize_script_key, ScriptConfig};
use crate::protocol::preview;

/// Argument asking a script to print its settings definitions and exit.
pub const DISCOVERY_FLAG: &str = "--get-settings-json";

/// Set to `discovery` in the environment of a script being asked for its
/// settings.
pub const MODE_ENV: &str = "NOTEBRIDGE_MODE";

/// How long a script may take to describe its settings.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for the output readers once the script has exited.
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// One setting a script declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefinition {
    pub key: String,
    /// Control kind: text, textarea, number, toggle, dropdown or slider.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// Parse the stdout of a discovery run. Empty output means no settings.
pub fn parse_definitions(output: &str) -> Result<Vec<SettingDefinition>, String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| format!("invalid JSON ({e}) in {}", preview(trimmed.as_bytes())))?;
    if !value.is_array() {
        return Err(format!("expected a JSON array, got {}", preview(trimmed.as_bytes())));
    }
    serde_json::from_value(value).map_err(|e| format!("invalid setting definition: {e}"))
}

impl ProcessLauncher {
    /// Run `script` with [`DISCOVERY_FLAG`] and parse the definitions it prints.
    ///
    /// The script runs in its own directory and is killed after
    /// [`DISCOVERY_TIMEOUT`].
    pub fn discover_settings(&self, script: &Path) -> Result<Vec<SettingDefinition>, LaunchError> {
        let script = fs::canonicalize(script)
            .ok()
            .filter(|path| path.is_file())
            .ok_or_else(|| LaunchError::ScriptNotFound(script.to_path_buf()))?;
        let interpreter = self.options.resolve_interpreter()?;

        let mut command = Command::new(&interpreter);
        command
            .arg(&script)
            .arg(DISCOVERY_FLAG)
            .env(MODE_ENV, "discovery")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = script.parent() {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            script: script.clone(),
            source,
        })?;

        let stdout = collect_output(child.stdout.take());
        let stderr = collect_output(child.stderr.take());

        let status = child
            .wait_timeout(DISCOVERY_TIMEOUT)
            .map_err(|source| LaunchError::Io {
                context: "Failed to wait for settings discovery",
                source,
            })?;
        let Some(status) = status else {
            kill_child(&mut child);
            return Err(LaunchError::Settings {
                script,
                reason: format!("timed out after {}s", DISCOVERY_TIMEOUT.as_secs()),
            });
        };

        let stdout = stdout.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();
        let stderr = stderr.recv_timeout(OUTPUT_COLLECTION_TIMEOUT).unwrap_or_default();
        if !status.success() {
            if !stderr.trim().is_empty() {
                tracing::warn!(script = %script.display(), stderr = %stderr.trim(), "Settings discovery stderr");
            }
            return Err(LaunchError::Settings {
                script,
                reason: format!("exited with {status}"),
            });
        }

        let definitions =
            parse_definitions(&stdout).map_err(|reason| LaunchError::Settings {
                script: script.clone(),
                reason,
            })?;
        tracing::info!(script = %script.display(), count = definitions.len(), "Discovered script settings");
        Ok(definitions)
    }
}

fn collect_output<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    match stream {
        Some(mut stream) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                let _ = sender.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = sender.send(String::new());
        }
    }
    receiver
}

fn kill_child(child: &mut Child) {
    // May already have exited
    let _ = child.kill();
    let _ = child.wait();
}

/// Declared settings of every configured script, with the stored values
/// applied.
#[derive(Debug, Clone, Default)]
pub struct ScriptSettings {
    definitions: BTreeMap<String, Vec<SettingDefinition>>,
    values: BTreeMap<String, Map<String, Value>>,
}

impl ScriptSettings {
    /// Ask every script in `folder` that has an entry in `scripts` for its
    /// settings. Scripts that fail discovery are logged and left without
    /// definitions.
    pub fn discover(
        launcher: &ProcessLauncher,
        folder: &Path,
        extension: &str,
        scripts: &BTreeMap<String, ScriptConfig>,
    ) -> Result<Self, LaunchError> {
        let mut settings = Self::default();
        for script in discover_scripts(folder, extension)? {
            let Some(key) = script_key(folder, &script) else {
                continue;
            };
            let Some(entry) = scripts.get(&key) else {
                tracing::debug!(script = %key, "Not configured, skipping settings discovery");
                continue;
            };
            match launcher.discover_settings(&script) {
                Ok(definitions) => settings.insert(&key, definitions, entry),
                Err(e) => tracing::warn!(script = %key, error = %e, "Settings discovery failed"),
            }
        }
        Ok(settings)
    }

    pub fn insert(&mut self, script: &str, definitions: Vec<SettingDefinition>, entry: &ScriptConfig) {
        let key = normalize_script_key(script);
        let values = entry
            .settings
            .iter()
            .filter_map(|(name, value)| match serde_json::to_value(value) {
                Ok(value) => Some((name.clone(), value)),
                Err(e) => {
                    tracing::warn!(script = %key, setting = %name, error = %e, "Ignoring stored setting");
                    None
                }
            })
            .collect();
        self.values.insert(key.clone(), values);
        self.definitions.insert(key, definitions);
    }

    pub fn definitions(&self, script: &str) -> &[SettingDefinition] {
        self.definitions
            .get(&normalize_script_key(script))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Effective value of every declared setting, in declaration order.
    ///
    /// Unknown scripts resolve to an empty map.
    pub fn resolve(&self, script: &str) -> Map<String, Value> {
        let key = normalize_script_key(script);
        let stored = self.values.get(&key);
        self.definitions(&key)
            .iter()
            .map(|definition| {
                let value = stored
                    .and_then(|values| values.get(&definition.key))
                    .cloned()
                    .unwrap_or_else(|| definition.default.clone());
                (definition.key.clone(), value)
            })
            .collect()
    }
}

fn script_key(folder: &Path, script: &Path) -> Option<String> {
    let relative = script.strip_prefix(folder).ok()?;
    Some(normalize_script_key(&relative.to_string_lossy()))
}
