//! Device monitoring module
//!
//! Hot-plug tracking and background transfers around a single processing
//! context.
//!
//! # Submodules
//!
//! - `events` - Hand-off channel messages and manager notifications
//! - `manager` - The [`DeviceManager`] registry and message loop
//! - `tasks` - Listing and transfer jobs run on background threads
//! - `listener` - System log follower feeding USB hot-plug lines
//!
//! # Data Flow
//!
//! ```text
//! journalctl ──> SystemEventListener ──┐
//!                                      ├──> channel ──> DeviceManager ──> subscribers
//! list/copy jobs ──────────────────────┘                     │
//!        ^                                                    │
//!        └────────────────── spawned by ──────────────────────┘
//! ```

pub mod events;
pub mod listener;
pub mod manager;
pub mod tasks;

pub use events::{ManagerEvent, ManagerObserver, Message, TaskId, TransferMode};
pub use listener::{classify, SystemEventListener, UsbEvent};
pub use manager::{DeviceManager, ManagerOptions};
pub use tasks::{copy_files_job, list_files_job, TransferRequest};
