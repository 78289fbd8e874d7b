//! Test Database Module
//!
//! Lets the manager, task runner and listener be exercised without a camera
//! attached to the machine.
//!
//! # Features
//!
//! - **Mock Tool**: A scriptable [`CameraTool`](crate::device::CameraTool) with
//!   attached cameras, listings and injected failures
//! - **Call Log**: Every invocation is recorded for order/argument assertions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use camera_watcher::testdb::MockCameraTool;
//! use camera_watcher::device::connected_devices;
//!
//! let tool = MockCameraTool::new()
//!     .with_camera("Nikon DSC D750", 1, 5, &["/DCIM/100NIKON/DSC_0001.JPG"]);
//! tool.fail_get("usb:001,005", 1);
//!
//! let devices: Vec<_> = connected_devices(&tool).unwrap().collect();
//! assert_eq!(devices.len(), 1);
//! ```

pub mod mock_tool;

pub use mock_tool::{MockCameraTool, ToolCall};
