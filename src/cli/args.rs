//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch for USB cameras and copy or move their photos and videos
#[derive(Parser, Debug)]
#[command(name = "camwatcher")]
#[command(version)]
#[command(about = "Watch for USB cameras and copy or move their photos and videos via gphoto2", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Destination folder for this run (does not change the stored setting)
    #[arg(short, long, global = true)]
    pub destination: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track cameras as they are plugged in and out (default)
    Watch {
        /// Start copying as soon as a camera's files are listed
        #[arg(long)]
        auto_copy: bool,

        /// With --auto-copy, delete the originals after a successful copy
        #[arg(long = "move", requires = "auto_copy")]
        move_files: bool,
    },

    /// List attached cameras
    List,

    /// List the files on one camera
    Files {
        /// Port selector as printed by `list`, e.g. usb:001,005
        port: String,
    },

    /// Copy (or move) files from one camera
    Copy {
        /// Port selector as printed by `list`, e.g. usb:001,005
        port: String,

        /// Delete the originals once every file is copied
        #[arg(long = "move")]
        move_files: bool,

        /// 1-based file index as printed by `files` (repeatable; default: all media)
        #[arg(short, long = "index", value_name = "N")]
        indexes: Vec<usize>,
    },

    /// Store the destination folder used for transfers
    ///
    /// Without a path the current value is shown and a new one is prompted for.
    SetDestination {
        path: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_watch() {
        let args = Args::try_parse_from(["camwatcher"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_copy_with_indexes() {
        let args = Args::try_parse_from([
            "camwatcher", "copy", "usb:001,005", "--move", "-i", "3", "--index", "1",
        ])
        .unwrap();
        match args.command {
            Some(Commands::Copy {
                port,
                move_files,
                indexes,
            }) => {
                assert_eq!(port, "usb:001,005");
                assert!(move_files);
                assert_eq!(indexes, vec![3, 1]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_watch_move_requires_auto_copy() {
        assert!(Args::try_parse_from(["camwatcher", "watch", "--move"]).is_err());
        assert!(Args::try_parse_from(["camwatcher", "watch", "--auto-copy", "--move"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["camwatcher", "list", "--log-level", "debug", "-d", "/tmp/x"])
                .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.destination, Some(PathBuf::from("/tmp/x")));
    }
}
