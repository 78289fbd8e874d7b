//! Mock camera tool for testing without a real camera
//!
//! [`MockCameraTool`] answers the same calls as gphoto2 from a scripted state:
//! attached cameras, per-port file listings and injected failures. Every call is
//! recorded so tests can assert on order and arguments. Clones share state, so a
//! test can keep one handle while the manager owns another.

use crate::core::error::{CameraError, Result};
use crate::device::media;
use crate::device::tool::{CameraTool, CancelToken};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// One recorded tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    AutoDetect,
    ListFiles(String),
    GetFile {
        port_path: String,
        index: usize,
        working_dir: PathBuf,
    },
    DeleteFile {
        port_path: String,
        index: usize,
    },
}

#[derive(Debug, Default)]
struct MockState {
    detect_output: Vec<String>,
    detect_error: Option<String>,
    listings: HashMap<String, Vec<String>>,
    listing_errors: HashMap<String, String>,
    failing_gets: HashSet<(String, usize)>,
    unwritten_gets: HashSet<(String, usize)>,
    failing_deletes: HashSet<(String, usize)>,
    transfer_delay: Option<Duration>,
    calls: Vec<ToolCall>,
}

/// Scriptable in-memory [`CameraTool`]
#[derive(Debug, Clone, Default)]
pub struct MockCameraTool {
    state: Arc<Mutex<MockState>>,
}

impl MockCameraTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`attach`](Self::attach)
    pub fn with_camera(self, name: &str, bus: u16, port: u16, files: &[&str]) -> Self {
        self.attach(name, bus, port, files);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn port_path(bus: u16, port: u16) -> String {
        format!("usb:{:03},{:03}", bus, port)
    }

    /// Plug a camera in: it shows up in auto-detect with the given listing
    pub fn attach(&self, name: &str, bus: u16, port: u16, files: &[&str]) {
        let port_path = Self::port_path(bus, port);
        let mut state = self.lock();
        state.detect_output.retain(|line| !line.ends_with(&port_path));
        state.detect_output.push(format!("{}\t{}", name, port_path));
        state
            .listings
            .insert(port_path, files.iter().map(|f| f.to_string()).collect());
    }

    /// Unplug the camera at `bus`/`port`
    pub fn detach(&self, bus: u16, port: u16) {
        let port_path = Self::port_path(bus, port);
        let mut state = self.lock();
        state.detect_output.retain(|line| !line.ends_with(&port_path));
        state.listings.remove(&port_path);
    }

    /// Replace the raw auto-detect output
    pub fn set_detect_output(&self, lines: Vec<String>) {
        self.lock().detect_output = lines;
    }

    pub fn fail_detect(&self, detail: &str) {
        self.lock().detect_error = Some(detail.to_string());
    }

    pub fn clear_detect_failure(&self) {
        self.lock().detect_error = None;
    }

    pub fn fail_listing(&self, port_path: &str, detail: &str) {
        self.lock()
            .listing_errors
            .insert(port_path.to_string(), detail.to_string());
    }

    pub fn fail_get(&self, port_path: &str, index: usize) {
        self.lock().failing_gets.insert((port_path.to_string(), index));
    }

    /// Make a get of `index` report success without writing the file
    pub fn skip_write(&self, port_path: &str, index: usize) {
        self.lock()
            .unwritten_gets
            .insert((port_path.to_string(), index));
    }

    pub fn fail_delete(&self, port_path: &str, index: usize) {
        self.lock()
            .failing_deletes
            .insert((port_path.to_string(), index));
    }

    /// Make every get/delete take at least `delay`, honouring cancellation
    pub fn set_transfer_delay(&self, delay: Duration) {
        self.lock().transfer_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.lock().calls.clone()
    }

    pub fn auto_detect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ToolCall::AutoDetect))
            .count()
    }

    /// Indexes fetched from `port_path`, in call order
    pub fn fetched(&self, port_path: &str) -> Vec<usize> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ToolCall::GetFile {
                    port_path: p,
                    index,
                    ..
                } if p == port_path => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Indexes deleted from `port_path`, in call order
    pub fn deleted(&self, port_path: &str) -> Vec<usize> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ToolCall::DeleteFile {
                    port_path: p,
                    index,
                } if p == port_path => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ToolCall) {
        self.lock().calls.push(call);
    }

    fn wait(&self, command: &str, cancel: &CancelToken) -> Result<()> {
        let Some(delay) = self.lock().transfer_delay else {
            return Ok(());
        };
        let started = Instant::now();
        while started.elapsed() < delay {
            if cancel.is_cancelled() {
                return Err(CameraError::Cancelled {
                    command: command.to_string(),
                });
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl CameraTool for MockCameraTool {
    fn auto_detect(&self) -> Result<Vec<String>> {
        self.record(ToolCall::AutoDetect);
        let state = self.lock();
        if let Some(detail) = &state.detect_error {
            return Err(CameraError::ExecutionError {
                command: "gphoto2 --auto-detect --parsable".to_string(),
                detail: detail.clone(),
            });
        }
        let mut lines = vec![
            "Model                          Port".to_string(),
            "----------------------------------------------------------".to_string(),
        ];
        lines.extend(state.detect_output.iter().cloned());
        Ok(lines)
    }

    fn list_files(&self, port_path: &str, _cancel: &CancelToken) -> Result<Vec<String>> {
        self.record(ToolCall::ListFiles(port_path.to_string()));
        let command = format!("gphoto2 --list-files -q --port {}", port_path);
        let state = self.lock();
        if let Some(detail) = state.listing_errors.get(port_path) {
            return Err(CameraError::ExecutionError {
                command,
                detail: detail.clone(),
            });
        }
        state
            .listings
            .get(port_path)
            .cloned()
            .ok_or_else(|| CameraError::ExecutionError {
                command,
                detail: "*** Error: No camera found. ***".to_string(),
            })
    }

    fn get_file(
        &self,
        port_path: &str,
        index: usize,
        working_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.record(ToolCall::GetFile {
            port_path: port_path.to_string(),
            index,
            working_dir: working_dir.to_path_buf(),
        });
        let command = format!("gphoto2 --get-file={} --force-overwrite --port={}", index, port_path);
        self.wait(&command, cancel)?;

        let line = {
            let state = self.lock();
            if state.failing_gets.contains(&(port_path.to_string(), index)) {
                return Err(CameraError::ExecutionError {
                    command,
                    detail: format!("*** Error: Could not get file {} ***", index),
                });
            }
            if state.unwritten_gets.contains(&(port_path.to_string(), index)) {
                return Ok(());
            }
            state
                .listings
                .get(port_path)
                .and_then(|files| files.get(index.wrapping_sub(1)))
                .cloned()
        };

        let Some(line) = line else {
            return Err(CameraError::ExecutionError {
                command,
                detail: format!("*** Error: File number {} out of range ***", index),
            });
        };
        fs::write(working_dir.join(media::file_name(&line)), line.as_bytes())?;
        Ok(())
    }

    fn delete_file(&self, port_path: &str, index: usize, cancel: &CancelToken) -> Result<()> {
        self.record(ToolCall::DeleteFile {
            port_path: port_path.to_string(),
            index,
        });
        let command = format!("gphoto2 --delete-file={} --port={}", index, port_path);
        self.wait(&command, cancel)?;

        let mut state = self.lock();
        if state.failing_deletes.contains(&(port_path.to_string(), index)) {
            return Err(CameraError::ExecutionError {
                command,
                detail: format!("*** Error: Could not delete file {} ***", index),
            });
        }
        if let Some(files) = state.listings.get_mut(port_path) {
            if index >= 1 && index <= files.len() {
                files.remove(index - 1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_lists_attached_cameras() {
        let tool = MockCameraTool::new().with_camera("Nikon DSC D750", 1, 5, &["/DCIM/A.JPG"]);
        let lines = tool.auto_detect().unwrap();
        assert!(lines.iter().any(|l| l == "Nikon DSC D750\tusb:001,005"));

        tool.detach(1, 5);
        let lines = tool.auto_detect().unwrap();
        assert!(!lines.iter().any(|l| l.contains("usb:001,005")));
        assert_eq!(tool.auto_detect_count(), 2);
    }

    #[test]
    fn test_get_file_writes_into_working_dir() {
        let dir = TempDir::new().unwrap();
        let tool = MockCameraTool::new().with_camera(
            "Cam",
            1,
            2,
            &["/DCIM/100/IMG_1.JPG", "/DCIM/100/IMG_2.JPG"],
        );
        tool.get_file("usb:001,002", 2, dir.path(), &CancelToken::new())
            .unwrap();
        assert!(dir.path().join("IMG_2.JPG").exists());
        assert_eq!(tool.fetched("usb:001,002"), vec![2]);
    }

    #[test]
    fn test_injected_failures() {
        let dir = TempDir::new().unwrap();
        let tool = MockCameraTool::new().with_camera("Cam", 1, 2, &["/A.JPG"]);
        tool.fail_get("usb:001,002", 1);
        tool.fail_listing("usb:001,002", "busy");

        let err = tool
            .get_file("usb:001,002", 1, dir.path(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, CameraError::ExecutionError { .. }));
        assert!(tool.list_files("usb:001,002", &CancelToken::new()).is_err());
        assert!(tool
            .get_file("usb:001,002", 9, dir.path(), &CancelToken::new())
            .is_err());
    }

    #[test]
    fn test_delete_shifts_later_indexes() {
        let tool = MockCameraTool::new().with_camera("Cam", 1, 2, &["/A.JPG", "/B.JPG", "/C.JPG"]);
        tool.delete_file("usb:001,002", 1, &CancelToken::new()).unwrap();
        let files = tool.list_files("usb:001,002", &CancelToken::new()).unwrap();
        assert_eq!(files, vec!["/B.JPG", "/C.JPG"]);
    }
}
