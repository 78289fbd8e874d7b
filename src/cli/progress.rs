//! Progress bars and console output for the CLI
//!
//! Transfers report progress as state parameter text (`"Copying 2 / 5"`); the
//! bar here is driven by parsing that text back, so the CLI shows exactly what
//! any other observer of the device would see.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

// ============================================================================
// Styles
// ============================================================================

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap()
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

fn transfer_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap()
        .progress_chars("━━╾─")
}

fn finished_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  ✓ [{bar:40.green/dim}] {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("━━━")
}

// ============================================================================
// Console output helpers
// ============================================================================

pub fn print_header(title: &str) {
    let width = 60;
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{:^w$}║", title, w = width - 2);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

pub fn print_error(msg: &str) {
    println!("  ✗ {}", msg);
}

// ============================================================================
// Progress
// ============================================================================

/// Split `"<verb> i / total"` into `(i, total)`
pub fn parse_progress(text: &str) -> Option<(u64, u64)> {
    let mut words = text.split_whitespace().skip(1);
    let current = words.next()?.parse().ok()?;
    if words.next()? != "/" {
        return None;
    }
    let total = words.next()?.parse().ok()?;
    Some((current, total))
}

/// Spinner shown while waiting for a camera's listing
pub fn waiting_spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(msg.to_string());
    spinner
}

/// Bar following a single transfer job
#[derive(Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(transfer_bar_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("Starting...");
        Self { bar }
    }

    /// Feed one progress parameter; text that is not a counter is shown as is
    pub fn update(&self, text: &str) {
        match parse_progress(text) {
            Some((current, total)) => {
                self.bar.set_length(total);
                self.bar.set_position(current.saturating_sub(1));
            }
            None => self.bar.set_message(text.to_string()),
        }
    }

    pub fn finish(&self, msg: &str) {
        self.bar.set_style(finished_bar_style());
        let len = self.bar.length().unwrap_or(0);
        self.bar.set_position(len);
        self.bar.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self, msg: &str) {
        self.bar.abandon_with_message(msg.to_string());
    }

    /// Print a line without tearing the bar
    pub fn println(&self, msg: &str) {
        self.bar.suspend(|| println!("  → {}", msg));
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Log tee
// ============================================================================

/// Writes every log record to stderr and to the log file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write_all(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("Copying 2 / 5"), Some((2, 5)));
        assert_eq!(parse_progress("Moving 10 / 10"), Some((10, 10)));
        assert_eq!(parse_progress("Found 3 files"), None);
        assert_eq!(parse_progress("3 files copied successfully"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42.0s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn test_dual_writer_tees_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("camwatcher.log");
        let mut writer = DualWriter {
            console: std::io::stderr(),
            file: std::fs::File::create(&path).unwrap(),
        };
        writeln!(writer, "[INFO] hello").unwrap();
        writer.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[INFO] hello\n");
    }
}
