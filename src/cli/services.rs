//! Host-side services shared by the serving subcommands.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notebridge::broker::{TerminalPrompter, UserInputBroker};
use notebridge::config::BridgeConfig;
use notebridge::dispatch::Dispatcher;
use notebridge::host::{FileVault, MainContext};
use notebridge::launcher::{AutoStart, LaunchOptions, ProcessLauncher, ScriptSettings};
use notebridge::server::SocketServer;

/// The vault host, its main context and the socket listener, started together.
pub struct HostServices {
    server: SocketServer,
    context: MainContext,
    config: BridgeConfig,
}

impl HostServices {
    pub fn start(config: BridgeConfig, vault_root: &Path, note: Option<&str>) -> Result<Self> {
        let mut vault = FileVault::new(vault_root)
            .with_context(|| format!("Failed to open vault {}", vault_root.display()))?
            .with_prompter(TerminalPrompter::stdio());
        if let Some(note) = note {
            vault
                .open_note(note)
                .with_context(|| format!("Failed to open note {note}"))?;
        }

        let context = MainContext::spawn(vault);
        let settings = discover_settings(&config, &context, vault_root);
        let broker = UserInputBroker::new(context.handle(), config.input_timeout());
        let dispatcher = Arc::new(
            Dispatcher::new(context.handle(), broker, config.notification_duration())
                .with_script_settings(settings),
        );

        let mut server = SocketServer::new(&config.socket_path, dispatcher);
        if let Err(e) = server.start() {
            let text = format!("Bridge could not start: {e}");
            let duration = config.notification_duration();
            let _ = context.handle().call(move |host| host.notify(&text, duration));
            return Err(e).context("Failed to start socket listener");
        }

        Ok(Self {
            server,
            context,
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn launcher(&self) -> ProcessLauncher {
        launcher(&self.config, &self.context)
    }

    /// Launch the scripts configured to start with the host. `None` when no
    /// scripts folder is usable.
    pub fn auto_start(&self, vault_root: &Path) -> Option<AutoStart> {
        if !self.config.scripts.values().any(|entry| entry.auto_start) {
            return None;
        }
        match self.config.resolve_scripts_folder(vault_root) {
            Ok(folder) => Some(self.launcher().auto_start(&folder, &self.config.scripts)),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping auto-start scripts");
                None
            }
        }
    }

    /// Stop the listener (removing its socket), then the host.
    pub fn shutdown(mut self) -> Result<()> {
        self.server.stop().context("Failed to stop socket listener")?;
        self.context.shutdown();
        Ok(())
    }
}

fn launcher(config: &BridgeConfig, context: &MainContext) -> ProcessLauncher {
    ProcessLauncher::new(
        context.handle(),
        LaunchOptions::from_config(config),
        config.notification_duration(),
    )
}

/// Settings of the configured scripts, asked for before the listener opens.
fn discover_settings(config: &BridgeConfig, context: &MainContext, vault_root: &Path) -> ScriptSettings {
    if config.scripts.is_empty() {
        return ScriptSettings::default();
    }
    let folder = match config.resolve_scripts_folder(vault_root) {
        Ok(folder) => folder,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping script settings discovery");
            return ScriptSettings::default();
        }
    };
    ScriptSettings::discover(
        &launcher(config, context),
        &folder,
        &config.script_extension,
        &config.scripts,
    )
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Script settings discovery failed");
        ScriptSettings::default()
    })
}

/// Flag raised by Ctrl-C.
pub fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;
    Ok(interrupted)
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
