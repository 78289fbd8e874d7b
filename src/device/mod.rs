//! Device interaction module
//!
//! Cameras are reached through an external command-line tool (gphoto2). This
//! module holds the device entity and its lifecycle states, and the adapter
//! that runs the tool.
//!
//! # Submodules
//!
//! - `camera` - The [`Device`] entity and its USB identity
//! - `state` - Lifecycle states and the state parameter payload
//! - `media` - Listing line parsing and copyable-file filtering
//! - `tool` - Subprocess invocation and the [`CameraTool`] abstraction
//!
//! # Architecture
//!
//! The manager only talks to cameras through the [`CameraTool`] trait:
//!
//! - [`Gphoto2`] - Runs the real tool with timeouts and cancellation
//! - `testdb::MockCameraTool` - Scriptable in-memory replacement for tests

pub mod camera;
pub mod media;
pub mod state;
pub mod tool;

pub use camera::{Device, DeviceId, StateObserver};
pub use state::{DeviceState, StateParam};
pub use tool::{
    connected_devices, parse_auto_detect, run_sync, CameraTool, CancelToken, Gphoto2,
    RunOptions,
};
