//! Persisted bridge configuration
//!
//! Stored as TOML in the user's config directory. A missing file means
//! defaults; unknown keys are ignored.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::DEFAULT_SOCKET_NAME;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Folder holding worker scripts, absolute or relative to the vault root.
    pub scripts_folder: Option<PathBuf>,
    pub socket_path: PathBuf,
    /// Pass `-B` so workers do not write bytecode caches next to the scripts.
    pub disable_bytecode_cache: bool,
    /// Worker interpreter, looked up on `PATH` at launch.
    pub interpreter: String,
    /// Extension of scripts picked up by batch runs, without the dot.
    pub script_extension: String,
    /// Seconds a user-input request waits for the end user. 0 waits until the
    /// dialog is closed.
    pub input_timeout_secs: Option<u64>,
    pub notification_duration_ms: u64,
    /// Per-script entries keyed by path relative to the scripts folder.
    ///
    /// Only scripts listed here are asked for their settings, since asking
    /// means running them.
    pub scripts: BTreeMap<String, ScriptConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Launch when `notebridge serve` starts.
    pub auto_start: bool,
    pub auto_start_delay_secs: u64,
    /// Values overriding the defaults the script declares for its settings.
    pub settings: toml::Table,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scripts_folder: None,
            socket_path: std::env::temp_dir().join(DEFAULT_SOCKET_NAME),
            disable_bytecode_cache: true,
            interpreter: "python3".to_string(),
            script_extension: "py".to_string(),
            input_timeout_secs: Some(300),
            notification_duration_ms: 4000,
            scripts: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/notebridge/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(base.join("notebridge").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn input_timeout(&self) -> Option<Duration> {
        self.input_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    /// Entry for `script`, given relative to the scripts folder.
    pub fn script(&self, script: &str) -> Option<&ScriptConfig> {
        self.scripts.get(&normalize_script_key(script))
    }

    /// Resolve the scripts folder against `vault_root` and check it exists.
    pub fn resolve_scripts_folder(&self, vault_root: &Path) -> Result<PathBuf> {
        let Some(folder) = &self.scripts_folder else {
            bail!("No scripts folder configured. Set one with `notebridge config set-scripts-folder <dir>`");
        };

        let resolved = if folder.is_absolute() {
            folder.clone()
        } else {
            vault_root.join(folder)
        };
        if !resolved.is_dir() {
            bail!("Scripts folder {} is not a directory", resolved.display());
        }
        Ok(resolved)
    }
}

/// Canonical key for a script path: forward slashes, no leading `./`.
pub fn normalize_script_key(script: &str) -> String {
    let key = script.replace('\\', "/");
    key.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = BridgeConfig::load(&temp_dir.path().join("config.toml")).unwrap();

        assert_eq!(config, BridgeConfig::default());
        assert!(config.disable_bytecode_cache);
        assert!(config.socket_path.ends_with(DEFAULT_SOCKET_NAME));
        assert_eq!(config.input_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested/config.toml");

        let config = BridgeConfig {
            scripts_folder: Some(PathBuf::from("Scripts")),
            disable_bytecode_cache: false,
            input_timeout_secs: Some(60),
            ..BridgeConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_script_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
interpreter = "python3"

[scripts."tagger.py"]
auto_start = true
auto_start_delay_secs = 2

[scripts."tagger.py".settings]
limit = 10
prefix = "auto-"

[scripts."report.py"]
"#,
        )
        .unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        let tagger = config.script("./tagger.py").unwrap();
        assert!(tagger.auto_start);
        assert_eq!(tagger.auto_start_delay_secs, 2);
        assert_eq!(tagger.settings.get("limit"), Some(&toml::Value::Integer(10)));

        let report = config.script("report.py").unwrap();
        assert_eq!(report, &ScriptConfig::default());
        assert!(config.script("missing.py").is_none());

        config.save(&path).unwrap();
        assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_normalize_script_key() {
        assert_eq!(normalize_script_key("./tools/tag.py"), "tools/tag.py");
        assert_eq!(normalize_script_key("tools\\tag.py"), "tools/tag.py");
        assert_eq!(normalize_script_key("tag.py"), "tag.py");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "interpreter = \"python3.12\"\nunknown_key = 1\n").unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.interpreter, "python3.12");
        assert_eq!(config.notification_duration_ms, 4000);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "interpreter = [").unwrap();

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = BridgeConfig {
            input_timeout_secs: Some(0),
            ..BridgeConfig::default()
        };
        assert_eq!(config.input_timeout(), None);
    }

    #[test]
    fn test_resolve_scripts_folder() {
        let vault = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(vault.path().join("Scripts")).unwrap();

        let mut config = BridgeConfig::default();
        assert!(config.resolve_scripts_folder(vault.path()).is_err());

        config.scripts_folder = Some(PathBuf::from("Scripts"));
        assert_eq!(
            config.resolve_scripts_folder(vault.path()).unwrap(),
            vault.path().join("Scripts")
        );

        config.scripts_folder = Some(vault.path().join("Scripts"));
        assert!(config.resolve_scripts_folder(Path::new("/elsewhere")).is_ok());

        config.scripts_folder = Some(PathBuf::from("Missing"));
        let err = config.resolve_scripts_folder(vault.path()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
