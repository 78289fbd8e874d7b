//! External tool adapter
//!
//! Wraps invocations of gphoto2. Every call is synchronous and blocks the calling
//! thread until the child exits, its deadline passes or its token is cancelled.
//!
//! Anything written to stderr is treated as a failure, regardless of the exit
//! code. gphoto2 reports most problems (no camera, busy device, missing file) on
//! stderr while still exiting 0, so the stream is the reliable signal; tools that
//! print informational stderr will be reported as failed.

use crate::core::config::ToolConfig;
use crate::core::error::{CameraError, Result};
use crate::device::camera::Device;
use log::{debug, info, warn};
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running child is checked for exit, timeout or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared flag used to abort a running invocation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied to a single invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: None,
        }
    }

    pub fn cancel_with(mut self, token: &CancelToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }
}

/// Run `command` to completion and return its stdout lines
///
/// Fails with [`CameraError::ExecutionError`] when the process writes anything to
/// stderr, with the trimmed stderr text as detail.
pub fn run_sync<S: AsRef<str>>(
    command: &[S],
    working_dir: Option<&Path>,
    options: &RunOptions,
) -> Result<Vec<String>> {
    let command_line = command
        .iter()
        .map(|part| part.as_ref())
        .collect::<Vec<_>>()
        .join(" ");

    let Some((program, args)) = command.split_first() else {
        return Err(CameraError::SpawnError {
            command: command_line,
            message: "empty command".to_string(),
        });
    };

    info!(
        "Running: {} (cwd: {})",
        command_line,
        working_dir
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| CameraError::SpawnError {
        command: command_line.clone(),
        message: e.to_string(),
    })?;

    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    wait_for_exit(&mut child, &command_line, options)?;

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if !stderr.is_empty() {
        return Err(CameraError::ExecutionError {
            command: command_line,
            detail: stderr.trim().to_string(),
        });
    }

    Ok(stdout.lines().map(str::to_string).collect())
}

fn wait_for_exit(child: &mut Child, command_line: &str, options: &RunOptions) -> Result<()> {
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            debug!("'{}' exited with {}", command_line, status);
            return Ok(());
        }

        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            kill(child, command_line);
            return Err(CameraError::Cancelled {
                command: command_line.to_string(),
            });
        }

        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout {
                kill(child, command_line);
                return Err(CameraError::Timeout {
                    command: command_line.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child, command_line: &str) {
    warn!("Killing '{}'", command_line);
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_pipe_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Operations the manager needs from the camera tool
///
/// Implemented by [`Gphoto2`] for real hardware and by the mock in `testdb`.
pub trait CameraTool: Send + Sync {
    /// Raw `--auto-detect --parsable` output lines
    fn auto_detect(&self) -> Result<Vec<String>>;

    /// One line per file on the camera; line N is file index N
    fn list_files(&self, port_path: &str, cancel: &CancelToken) -> Result<Vec<String>>;

    /// Download file `index` into `working_dir`
    fn get_file(
        &self,
        port_path: &str,
        index: usize,
        working_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Delete file `index` from the camera
    fn delete_file(&self, port_path: &str, index: usize, cancel: &CancelToken) -> Result<()>;
}

/// gphoto2 command-line backend
#[derive(Debug, Clone)]
pub struct Gphoto2 {
    program: String,
    detect_timeout: Option<Duration>,
    list_timeout: Option<Duration>,
    transfer_timeout: Option<Duration>,
}

impl Gphoto2 {
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_config(&ToolConfig {
            program: program.into(),
            ..ToolConfig::default()
        })
    }

    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            detect_timeout: config.detect_timeout(),
            list_timeout: config.list_timeout(),
            transfer_timeout: config.transfer_timeout(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CameraTool for Gphoto2 {
    fn auto_detect(&self) -> Result<Vec<String>> {
        run_sync(
            &[self.program.as_str(), "--auto-detect", "--parsable"],
            None,
            &RunOptions::with_timeout(self.detect_timeout),
        )
    }

    fn list_files(&self, port_path: &str, cancel: &CancelToken) -> Result<Vec<String>> {
        run_sync(
            &[self.program.as_str(), "--list-files", "-q", "--port", port_path],
            None,
            &RunOptions::with_timeout(self.list_timeout).cancel_with(cancel),
        )
    }

    fn get_file(
        &self,
        port_path: &str,
        index: usize,
        working_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let get = format!("--get-file={}", index);
        let port = format!("--port={}", port_path);
        run_sync(
            &[self.program.as_str(), get.as_str(), "--force-overwrite", port.as_str()],
            Some(working_dir),
            &RunOptions::with_timeout(self.transfer_timeout).cancel_with(cancel),
        )
        .map(|_| ())
    }

    fn delete_file(&self, port_path: &str, index: usize, cancel: &CancelToken) -> Result<()> {
        let delete = format!("--delete-file={}", index);
        let port = format!("--port={}", port_path);
        run_sync(
            &[self.program.as_str(), delete.as_str(), port.as_str()],
            None,
            &RunOptions::with_timeout(self.transfer_timeout).cancel_with(cancel),
        )
        .map(|_| ())
    }
}

fn auto_detect_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)usb:(\d+),(\d+)").expect("valid auto-detect pattern"))
}

/// Parse one `--auto-detect` line; header and non-USB lines yield `None`
pub fn parse_auto_detect(line: &str) -> Option<Device> {
    let caps = auto_detect_regex().captures(line)?;
    let name = caps.get(1)?.as_str().trim();
    let bus = caps.get(2)?.as_str().parse().ok()?;
    let port = caps.get(3)?.as_str().parse().ok()?;
    Some(Device::new(name, bus, port))
}

/// Cameras currently attached, not yet registered anywhere
pub fn connected_devices(tool: &dyn CameraTool) -> Result<impl Iterator<Item = Device>> {
    let lines = tool.auto_detect()?;
    Ok(lines.into_iter().filter_map(|line| parse_auto_detect(&line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MockCameraTool;

    #[test]
    fn test_parse_parsable_line() {
        let device = parse_auto_detect("Nikon DSC D750\tusb:001,005").unwrap();
        assert_eq!(device.name(), "Nikon DSC D750");
        assert_eq!(device.bus(), 1);
        assert_eq!(device.port(), 5);
    }

    #[test]
    fn test_parse_column_layout() {
        let device =
            parse_auto_detect("Canon EOS 5D Mark III          usb:002,014     ").unwrap();
        assert_eq!(device.name(), "Canon EOS 5D Mark III");
        assert_eq!(device.port_path(), "usb:002,014");
    }

    #[test]
    fn test_non_matching_lines_are_skipped() {
        assert!(parse_auto_detect("Model                          Port").is_none());
        assert!(parse_auto_detect("----------------------------------").is_none());
        assert!(parse_auto_detect("Sony Alpha\tptpip:192.168.1.20").is_none());
        assert!(parse_auto_detect("").is_none());
    }

    #[test]
    fn test_connected_devices_filters_garbage() {
        let tool = MockCameraTool::new();
        tool.set_detect_output(vec![
            "Model                          Port".to_string(),
            "Nikon DSC D750\tusb:001,005".to_string(),
            "garbage".to_string(),
            "Canon EOS R\tusb:003,002".to_string(),
        ]);

        let devices: Vec<_> = connected_devices(&tool).unwrap().collect();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].port_path(), "usb:001,005");
        assert_eq!(devices[1].name(), "Canon EOS R");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let empty: [&str; 0] = [];
        let result = run_sync(&empty, None, &RunOptions::default());
        assert!(matches!(result, Err(CameraError::SpawnError { .. })));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = run_sync(
            &["camwatcher-no-such-program-xyz"],
            None,
            &RunOptions::default(),
        );
        assert!(matches!(result, Err(CameraError::SpawnError { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_lines_are_returned() {
        let lines = run_sync(
            &["sh", "-c", "printf 'one\\ntwo\\n'"],
            None,
            &RunOptions::default(),
        )
        .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_with_zero_exit_is_failure() {
        let result = run_sync(
            &["sh", "-c", "echo partial; echo '*** Error: busy ***' >&2; exit 0"],
            None,
            &RunOptions::default(),
        );
        match result {
            Err(CameraError::ExecutionError { detail, .. }) => {
                assert_eq!(detail, "*** Error: busy ***");
            }
            other => panic!("expected ExecutionError, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_blank_stderr_is_failure() {
        let result = run_sync(
            &["sh", "-c", "echo ok; printf '\\n' >&2"],
            None,
            &RunOptions::default(),
        );
        match result {
            Err(CameraError::ExecutionError { detail, .. }) => assert_eq!(detail, ""),
            other => panic!("expected ExecutionError, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_without_stderr_is_success() {
        let lines = run_sync(&["sh", "-c", "echo ok; exit 3"], None, &RunOptions::default())
            .unwrap();
        assert_eq!(lines, vec!["ok"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_working_dir_is_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        run_sync(&["sh", "-c", "touch fetched.jpg"], Some(dir.path()), &RunOptions::default())
            .unwrap();
        assert!(dir.path().join("fetched.jpg").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let result = run_sync(
            &["sleep", "5"],
            None,
            &RunOptions::with_timeout(Some(Duration::from_millis(100))),
        );
        assert!(matches!(result, Err(CameraError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        let token = CancelToken::new();
        let trigger = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let result = run_sync(&["sleep", "5"], None, &RunOptions::default().cancel_with(&token));
        canceller.join().unwrap();
        assert!(matches!(result, Err(CameraError::Cancelled { .. })));
    }
}
