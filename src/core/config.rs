//! Configuration module for the camera watcher
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Linux: ~/.config/camera_watcher/config.toml
//! - macOS: ~/Library/Application Support/camera_watcher/config.toml
//!
//! A `camwatcher.toml` in the working directory takes precedence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory
const APP_NAME: &str = "camera_watcher";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default settings store file name
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Local override checked before the standard location
const LOCAL_CONFIG_FILE: &str = "./camwatcher.toml";

/// Image extensions recognised as copyable media
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "3fr", "ari", "arw", "bay", "braw", "cri", "crw", "cap", "dcs",
    "dng", "erf", "fff", "gpr", "jxs", "mef", "mdc", "mos", "mrw", "nef", "orf", "pef", "pxn",
    "r3d", "raf", "raw", "rwz", "srw", "tco", "x3f",
];

/// Video extensions recognised as copyable media
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "webm", "mkv", "flv", "vob", "ogv", "ogg", "rrc", "gifv", "mng", "mov", "avi", "qt", "wmv",
    "yuv", "rm", "asf", "amv", "mp4", "m4p", "m4v", "mpg", "mp2", "mpeg", "mpe", "mpv", "svi",
    "3gp", "3g2", "mxf", "roq", "nsv", "f4v", "f4p", "f4a", "f4b", "mod",
];

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External enumeration/transfer tool
    pub tool: ToolConfig,

    /// System log follower
    pub events: EventsConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Which files count as copyable media
    pub filter: FilterConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Persisted settings store
    pub settings: SettingsConfig,
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program name or path of the gphoto2 binary
    pub program: String,

    /// Deadline for `--auto-detect` in seconds (0 = none)
    pub detect_timeout_secs: u64,

    /// Deadline for `--list-files` in seconds (0 = none)
    pub list_timeout_secs: u64,

    /// Deadline for a single `--get-file` / `--delete-file` in seconds (0 = none)
    pub transfer_timeout_secs: u64,
}

/// System event listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Log-follow program
    ///
    /// Its output must carry kernel log lines (`usb 1-4: New USB device found`,
    /// `usb 1-4: USB disconnect`), as `journalctl` or `dmesg --follow` print them.
    /// `udevadm monitor` output is not recognised.
    pub program: String,

    /// Arguments passed to the log-follow program
    pub args: Vec<String>,

    /// Capacity of the bounded hand-off channel
    pub channel_capacity: usize,
}

/// Output directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Create subfolder with device name
    pub subfolder_by_device: bool,

    /// Create the destination directory when it does not exist
    pub create_missing: bool,
}

/// Media filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Lowercase file extensions, without the dot
    pub extensions: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

/// Settings store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Settings file path (empty = standard location)
    pub file: PathBuf,
}

impl ToolConfig {
    pub fn detect_timeout(&self) -> Option<Duration> {
        secs(self.detect_timeout_secs)
    }

    pub fn list_timeout(&self) -> Option<Duration> {
        secs(self.list_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        secs(self.transfer_timeout_secs)
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "gphoto2".to_string(),
            detect_timeout_secs: 15,
            list_timeout_secs: 120,
            transfer_timeout_secs: 600,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            program: "journalctl".to_string(),
            args: vec!["--follow".to_string(), "--lines=0".to_string()],
            channel_capacity: 256,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            subfolder_by_device: false,
            create_missing: true,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extensions: IMAGE_EXTENSIONS
                .iter()
                .chain(VIDEO_EXTENSIONS)
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./camwatcher.log"),
        }
    }
}

impl SettingsConfig {
    /// Resolve the settings file, falling back to the standard config directory
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        if !self.file.as_os_str().is_empty() {
            return Ok(self.file.clone());
        }
        get_config_dir()
            .map(|dir| dir.join(SETTINGS_FILE_NAME))
            .ok_or(ConfigError::ConfigDirNotFound)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Load from the local override, then the standard location, then defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// The file `load_default` would read, or the standard location if none exists yet
    pub fn get_active_config_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return local;
        }
        get_config_path().unwrap_or(local)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(parent.to_path_buf(), e.to_string()))?;
        }

        fs::write(path, content).map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Commented template written by `generate-config`
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    FileNotFound(PathBuf),
    ReadError(PathBuf, String),
    ParseError(PathBuf, String),
    SerializeError(String),
    WriteError(PathBuf, String),
    ConfigDirNotFound,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), err)
            }
            ConfigError::ParseError(path, err) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), err)
            }
            ConfigError::SerializeError(err) => {
                write!(f, "Failed to serialize configuration: {}", err)
            }
            ConfigError::WriteError(path, err) => {
                write!(f, "Failed to write '{}': {}", path.display(), err)
            }
            ConfigError::ConfigDirNotFound => {
                write!(f, "Could not determine configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
