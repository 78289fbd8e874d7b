//! Core functionality module
//!
//! Configuration, error types and the persisted settings store shared by the
//! device, monitor and CLI layers.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases
//! - `settings` - Persisted key-value settings (destination folder)

pub mod config;
pub mod error;
pub mod settings;
