//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use crate::cli::progress::{
    format_duration, print_error, print_header, print_info, print_success, print_warning,
    waiting_spinner, TransferProgress,
};
use crate::cli::{Args, Commands};
use crate::core::config::{get_config_path, Config};
use crate::core::settings::{self, JsonSettings, MemorySettings, SettingsStore};
use crate::device::media;
use crate::device::tool::{connected_devices, CameraTool, CancelToken, Gphoto2};
use crate::device::{Device, DeviceId, DeviceState};
use crate::monitor::{DeviceManager, ManagerEvent, ManagerOptions, SystemEventListener, TransferMode};
use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Input;
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long the processing loop waits before re-checking the shutdown flag
const POLL: Duration = Duration::from_millis(100);

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    match &args.command {
        None => watch(args, config, false, false, shutdown_flag),
        Some(Commands::Watch {
            auto_copy,
            move_files,
        }) => watch(args, config, *auto_copy, *move_files, shutdown_flag),
        Some(Commands::List) => list_cameras(config),
        Some(Commands::Files { port }) => list_camera_files(config, port),
        Some(Commands::Copy {
            port,
            move_files,
            indexes,
        }) => {
            let mode = if *move_files {
                TransferMode::Move
            } else {
                TransferMode::Copy
            };
            transfer(args, config, port, indexes, mode, shutdown_flag)
        }
        Some(Commands::SetDestination { path }) => set_destination(config, path.clone()),
        Some(Commands::ShowConfig) => show_config(config),
        Some(Commands::GenerateConfig { output }) => generate_config_file(output.clone()),
    }
}

/// Persisted store, or a throwaway one when `--destination` overrides it
fn open_settings(args: &Args, config: &Config) -> Result<Arc<dyn SettingsStore>> {
    if let Some(destination) = &args.destination {
        info!("Using destination {} for this run", destination.display());
        return Ok(Arc::new(MemorySettings::with_destination(destination)));
    }
    let path = config.settings.resolve_path()?;
    debug!("Settings store: {}", path.display());
    Ok(Arc::new(JsonSettings::open(&path)?))
}

fn tool(config: &Config) -> Arc<Gphoto2> {
    Arc::new(Gphoto2::from_config(&config.tool))
}

fn parse_port(port: &str) -> Result<DeviceId> {
    port.parse::<DeviceId>().map_err(|e| anyhow!(e))
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn print_manager_event(event: &ManagerEvent, devices: &[Device]) {
    let device = devices.iter().find(|d| d.id() == event.id());
    match (event, device) {
        (ManagerEvent::Added(id), Some(device)) => {
            print_success(&format!("[{}] Camera attached: {} ({})", timestamp(), device.name(), id));
        }
        (ManagerEvent::StateChanged(_), Some(device)) => {
            let line = format!(
                "[{}] {}: {} {}",
                timestamp(),
                device.name(),
                device.state(),
                device.state_param()
            );
            match device.state() {
                DeviceState::Error => print_error(&line),
                DeviceState::Done => print_success(&line),
                _ => print_info(&line),
            }
        }
        (ManagerEvent::Removed { id, name }, _) => {
            print_warning(&format!("[{}] Camera detached: {} ({})", timestamp(), name, id));
        }
        _ => {}
    }
}

/// Track cameras until Ctrl+C
pub fn watch(
    args: &Args,
    config: &Config,
    auto_copy: bool,
    move_files: bool,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let settings = open_settings(args, config)?;
    let mut options = ManagerOptions::from_config(config);
    if auto_copy {
        let mode = if move_files {
            TransferMode::Move
        } else {
            TransferMode::Copy
        };
        if settings::destination_path(settings.as_ref()).is_none() {
            warn!("--auto-copy given but no destination is set; transfers will fail");
        }
        options.auto_transfer = Some(mode);
    }

    print_header("Camera Watcher");
    let mut manager = DeviceManager::new(tool(config), settings, options);
    if manager.device_count() == 0 {
        print_info("No cameras attached, waiting for one to be plugged in...");
    }
    for device in manager.devices() {
        print_success(&format!("Camera attached: {} ({})", device.name(), device.id()));
    }
    manager.subscribe(print_manager_event);

    let mut listener = SystemEventListener::spawn(
        &config.events.program,
        &config.events.args,
        manager.sender(),
        manager.processing_flag(),
    )
    .context("System event listener could not be started")?;

    info!("Watching for cameras (Ctrl+C to stop)");
    while !shutdown_flag.load(Ordering::SeqCst) && !manager.is_stopped() {
        manager.step(POLL);
    }

    manager.close();
    listener.stop();
    print_info("Stopped watching");
    Ok(())
}

/// List attached cameras
pub fn list_cameras(config: &Config) -> Result<()> {
    info!("Scanning for attached cameras...");
    let gphoto2 = tool(config);
    let devices: Vec<Device> = connected_devices(&*gphoto2)?.collect();

    if devices.is_empty() {
        print_info("No cameras found.");
        println!();
        print_info("Make sure the camera is:");
        print_info("  1. Connected via USB cable and switched on");
        print_info("  2. In PTP/MTP mode (not mass storage)");
        print_info("  3. Not mounted by the desktop file manager");
        return Ok(());
    }

    println!("Found {} camera(s):", devices.len());
    println!();
    for (i, device) in devices.iter().enumerate() {
        println!("[{}] {}", i + 1, device.name());
        println!("    Port: {}", device.port_path());
    }
    Ok(())
}

/// List the files on one camera, marking copyable media
pub fn list_camera_files(config: &Config, port: &str) -> Result<()> {
    let id = parse_port(port)?;
    let files = tool(config).list_files(&id.port_path(), &CancelToken::new())?;

    if files.is_empty() {
        print_info(&format!("No files on {}", id));
        return Ok(());
    }

    let mut copyable = 0;
    for (i, line) in files.iter().enumerate() {
        let name = media::file_name(line);
        let marker = if media::is_copyable(name, &config.filter.extensions) {
            copyable += 1;
            "*"
        } else {
            " "
        };
        println!("{} {:>5}  {}", marker, i + 1, line.trim());
    }
    println!();
    print_info(&format!(
        "{} files, {} copyable (marked *)",
        files.len(),
        copyable
    ));
    Ok(())
}

/// One-shot copy or move with a progress bar
pub fn transfer(
    args: &Args,
    config: &Config,
    port: &str,
    indexes: &[usize],
    mode: TransferMode,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<()> {
    let id = parse_port(port)?;
    let settings = open_settings(args, config)?;
    let Some(destination) = settings::destination_path(settings.as_ref()) else {
        bail!("No destination set. Use 'camwatcher set-destination <path>' or --destination");
    };

    let mut manager = DeviceManager::new(tool(config), settings, ManagerOptions::from_config(config));
    if manager.device(id).is_none() {
        bail!("No camera at {}. Run 'camwatcher list' to see attached cameras", id);
    }

    let spinner = waiting_spinner(&format!("Listing files on {}...", id));
    while manager.is_busy(id) && !shutdown_flag.load(Ordering::SeqCst) {
        manager.step(POLL);
    }
    spinner.finish_and_clear();

    let Some(device) = manager.device(id) else {
        bail!("Camera at {} went away", id);
    };
    if device.state() == DeviceState::Error {
        bail!("Listing files on {} failed: {}", id, device.state_param());
    }
    if shutdown_flag.load(Ordering::SeqCst) {
        return Ok(());
    }

    let indexes = if indexes.is_empty() {
        media::copyable_indexes(device.file_paths(), &config.filter.extensions)
    } else {
        indexes.to_vec()
    };
    if indexes.is_empty() {
        print_info(&format!("Nothing to {} on {}", mode_verb(mode), device.name()));
        return Ok(());
    }

    println!(
        "{} {} files from {} to {}",
        if mode == TransferMode::Move { "Moving" } else { "Copying" },
        indexes.len(),
        device.name(),
        destination.display()
    );

    let progress = TransferProgress::new(indexes.len() as u64);
    let bar = progress.clone();
    manager.subscribe(move |event, devices| {
        if let ManagerEvent::StateChanged(changed) = event {
            if *changed != id {
                return;
            }
            if let Some(device) = devices.iter().find(|d| d.id() == id) {
                if device.state().is_transferring() {
                    bar.update(&device.state_param().to_string());
                }
            }
        }
    });

    let started = Instant::now();
    manager.copy_files(id, indexes, mode)?;

    let mut cancel_sent = false;
    while manager.is_busy(id) {
        if shutdown_flag.load(Ordering::SeqCst) && !cancel_sent {
            progress.println("Cancelling after the current file...");
            manager.cancel(id);
            cancel_sent = true;
        }
        manager.step(POLL);
    }

    let Some(device) = manager.device(id) else {
        progress.abandon("camera detached");
        bail!("Camera at {} went away during the transfer", id);
    };
    let outcome = device.state_param().to_string();
    match device.state() {
        DeviceState::Done => {
            progress.finish(&outcome);
            print_success(&format!("{} in {}", outcome, format_duration(started.elapsed())));
            Ok(())
        }
        DeviceState::Error => {
            progress.abandon(&outcome);
            bail!("{} ({})", outcome, id)
        }
        _ => {
            progress.abandon(&outcome);
            print_warning(&outcome);
            Ok(())
        }
    }
}

fn mode_verb(mode: TransferMode) -> &'static str {
    match mode {
        TransferMode::Copy => "copy",
        TransferMode::Move => "move",
    }
}

/// Store the destination folder, prompting when none is given
pub fn set_destination(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let store = JsonSettings::open(config.settings.resolve_path()?)?;
    let current = settings::destination_path(&store);

    let path = match path {
        Some(path) => path,
        None => {
            if let Some(current) = &current {
                print_info(&format!("Current destination: {}", current.display()));
            }
            let default = current
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let entered: String = Input::new()
                .with_prompt("Destination folder for copied files")
                .default(default)
                .interact_text()
                .context("Failed to read input")?;
            PathBuf::from(entered.trim())
        }
    };

    if path.as_os_str().is_empty() {
        bail!("Destination must not be empty");
    }
    if !path.is_dir() {
        print_warning(&format!(
            "{} does not exist yet; it will be created on the first transfer",
            path.display()
        ));
    }

    settings::set_destination_path(&store, &path)?;
    print_success(&format!("Destination set to {}", path.display()));
    info!("Saved {} to {}", settings::DESTINATION_PATH_KEY, store.path().display());
    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) -> Result<()> {
    let config_path = Config::get_active_config_path();
    println!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        println!("(Using default settings - no config file found)");
    }

    let settings_path = config.settings.resolve_path()?;
    println!("Settings store: {}", settings_path.display());
    match JsonSettings::open(&settings_path)
        .ok()
        .and_then(|store| settings::destination_path(&store))
    {
        Some(destination) => println!("Destination: {}", destination.display()),
        None => println!("Destination: (not set)"),
    }
    println!();
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => path,
        None => get_config_path().ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&output_path, Config::generate_default_config())
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    print_success(&format!("Configuration file: {}", output_path.display()));
    print_info("Edit this file to customize the watcher settings.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.settings.file = dir.path().join("settings.json");
        config
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("usb:001,005").unwrap(), DeviceId::new(1, 5));
        assert!(parse_port("1,5").is_err());
    }

    #[test]
    fn test_set_destination_persists() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let target = dir.path().join("photos");

        set_destination(&config, Some(target.clone())).unwrap();

        let store = JsonSettings::open(dir.path().join("settings.json")).unwrap();
        assert_eq!(settings::destination_path(&store), Some(target));
    }

    #[test]
    fn test_destination_flag_overrides_store() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let args = Args {
            command: None,
            config: None,
            log_level: None,
            destination: Some(PathBuf::from("/mnt/card")),
        };

        let store = open_settings(&args, &config).unwrap();
        assert_eq!(
            settings::destination_path(store.as_ref()),
            Some(PathBuf::from("/mnt/card"))
        );
        assert!(!dir.path().join("settings.json").exists());
    }

    #[test]
    fn test_generate_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("camwatcher.toml");

        generate_config_file(Some(path.clone())).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.tool.program, "gphoto2");
    }
}
