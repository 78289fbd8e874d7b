//! Camera Watcher Library
//!
//! Detects USB cameras, lists their files and copies or moves them to a
//! destination folder, driving each camera through an explicit state machine.
//! Cameras are reached through gphoto2; hot-plug events come from the system log.
//!
//! # Architecture
//!
//! - [`core`] - Configuration, error types and the persisted settings store
//! - [`device`] - The device entity, its states and the gphoto2 adapter
//! - [`monitor`] - Device manager, background jobs and the system event listener
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - Scriptable mock camera tool for testing without hardware
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use camera_watcher::core::config::Config;
//! use camera_watcher::core::settings::JsonSettings;
//! use camera_watcher::device::Gphoto2;
//! use camera_watcher::monitor::{DeviceManager, ManagerOptions, SystemEventListener};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let settings = JsonSettings::open(config.settings.resolve_path()?)?;
//!
//!     let mut manager = DeviceManager::new(
//!         Arc::new(Gphoto2::from_config(&config.tool)),
//!         Arc::new(settings),
//!         ManagerOptions::from_config(&config),
//!     );
//!     manager.subscribe(|event, devices| println!("{:?} ({} attached)", event, devices.len()));
//!
//!     let _listener = SystemEventListener::spawn(
//!         &config.events.program,
//!         &config.events.args,
//!         manager.sender(),
//!         manager.processing_flag(),
//!     )?;
//!     manager.run();
//!     Ok(())
//! }
//! ```
//!
//! # Testing Without a Camera
//!
//! ```rust,no_run
//! use camera_watcher::core::settings::MemorySettings;
//! use camera_watcher::monitor::{DeviceManager, ManagerOptions};
//! use camera_watcher::testdb::MockCameraTool;
//! use std::sync::Arc;
//!
//! let tool = MockCameraTool::new().with_camera("Nikon DSC D750", 1, 5, &["/DCIM/DSC_0001.JPG"]);
//! let manager = DeviceManager::new(
//!     Arc::new(tool),
//!     Arc::new(MemorySettings::new()),
//!     ManagerOptions::default(),
//! );
//! assert_eq!(manager.device_count(), 1);
//! ```

pub mod cli;
pub mod core;
pub mod device;
pub mod monitor;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
