use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread;

use notebridge::client::BridgeClient;
use notebridge::config::BridgeConfig;

use super::services::{interrupt_flag, HostServices, POLL_INTERVAL};
use super::types::{Cli, Commands, ConfigCommands, VaultArgs};

pub fn dispatch(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => BridgeConfig::default_path()?,
    };

    match cli.command {
        Commands::Serve { vault } => serve(load(&config_path, &vault)?, &vault),
        Commands::Run { script, vault } => run(load(&config_path, &vault)?, &vault, &script),
        Commands::RunAll { vault } => run_all(load(&config_path, &vault)?, &vault),
        Commands::Call { request, socket } => {
            let socket = match socket {
                Some(socket) => socket,
                None => BridgeConfig::load(&config_path)?.socket_path,
            };
            call(&socket, &request)
        }
        Commands::Config { command } => config(&config_path, command),
    }
}

fn load(config_path: &Path, vault: &VaultArgs) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load(config_path)?;
    if let Some(socket) = &vault.socket {
        config.socket_path = socket.clone();
    }
    Ok(config)
}

fn serve(config: BridgeConfig, vault: &VaultArgs) -> Result<()> {
    let interrupted = interrupt_flag()?;
    let services = HostServices::start(config, &vault.vault, vault.note.as_deref())?;
    println!(
        "Serving {} on {} (Ctrl+C to stop)",
        vault.vault.display(),
        services.config().socket_path.display()
    );
    let auto_start = services.auto_start(&vault.vault);

    while !interrupted.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
    }
    if let Some(auto_start) = auto_start {
        auto_start.cancel();
    }
    services.shutdown()
}

fn run(config: BridgeConfig, vault: &VaultArgs, script: &Path) -> Result<()> {
    let interrupted = interrupt_flag()?;
    let services = HostServices::start(config, &vault.vault, vault.note.as_deref())?;

    let outcome = services.launcher().launch(script).map_err(anyhow::Error::from);
    let result = outcome.and_then(|mut worker| loop {
        if let Some(status) = worker.wait_timeout(POLL_INTERVAL)? {
            break Ok(status);
        }
        if interrupted.swap(false, Ordering::SeqCst) {
            tracing::info!(pid = worker.pid(), "Interrupted, terminating script");
            worker.terminate()?;
        }
    });

    services.shutdown()?;
    let status = result?;
    if !status.success() {
        anyhow::bail!("Script exited with {status}");
    }
    Ok(())
}

fn run_all(config: BridgeConfig, vault: &VaultArgs) -> Result<()> {
    let folder = config.resolve_scripts_folder(&vault.vault)?;
    let extension = config.script_extension.clone();
    let services = HostServices::start(config, &vault.vault, vault.note.as_deref())?;

    let result = services.launcher().run_all(&folder, &extension);
    services.shutdown()?;

    let summary = result.context("Batch run failed")?;
    println!(
        "Ran {} script(s): {} failed to launch, {} exited with an error",
        summary.launched, summary.failed_to_launch, summary.non_zero_exits
    );
    Ok(())
}

fn call(socket: &Path, request: &str) -> Result<()> {
    let reply = BridgeClient::new(socket).request_raw(request.as_bytes())?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

fn config(config_path: &Path, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = BridgeConfig::load(config_path)?;
            let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{rendered}");
            Ok(())
        }
        ConfigCommands::SetScriptsFolder { folder } => {
            update_config(config_path, |config| config.scripts_folder = Some(folder))
        }
        ConfigCommands::SetSocketPath { path } => {
            update_config(config_path, |config| config.socket_path = path)
        }
        ConfigCommands::SetDisableCache { enabled } => {
            update_config(config_path, |config| config.disable_bytecode_cache = enabled)
        }
    }
}

fn update_config(config_path: &Path, edit: impl FnOnce(&mut BridgeConfig)) -> Result<()> {
    let mut config = BridgeConfig::load(config_path)?;
    edit(&mut config);
    config.save(config_path)?;
    println!("Updated {}", config_path.display());
    Ok(())
}
