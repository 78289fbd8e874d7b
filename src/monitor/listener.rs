//! System Event Listener
//!
//! Follows the system log (`journalctl --follow` by default) on a dedicated
//! thread and forwards every line into the processing context. Classification
//! happens there, so the reader thread holds nothing but the line it just read.

use crate::core::error::{CameraError, Result};
use crate::monitor::events::Message;
use crossbeam_channel::{SendTimeoutError, Sender};
use log::{debug, info, trace, warn};
use regex::Regex;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a send may wait on a full channel before the stop flag is checked again
const SEND_RETRY: Duration = Duration::from_millis(50);

/// Kernel USB hot-plug notice, carrying the `<bus>-<port>` id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    Attached(String),
    Detached(String),
}

fn attach_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"usb\W(\d+-\d+):\WNew USB device found").expect("valid attach pattern")
    })
}

fn detach_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"usb\W(\d+-\d+):\WUSB disconnect").expect("valid detach pattern")
    })
}

/// Classify one log line; anything else is `None`
pub fn classify(line: &str) -> Option<UsbEvent> {
    if let Some(caps) = attach_regex().captures(line) {
        return Some(UsbEvent::Attached(caps[1].to_string()));
    }
    detach_regex()
        .captures(line)
        .map(|caps| UsbEvent::Detached(caps[1].to_string()))
}

/// Running log follower and its reader thread
pub struct SystemEventListener {
    child: Option<Child>,
    handle: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl SystemEventListener {
    /// Start `program args...` and forward its stdout lines to `tx`
    ///
    /// A spawn failure is returned as [`CameraError::ListenerError`].
    pub fn spawn(
        program: &str,
        args: &[String],
        tx: Sender<Message>,
        processing: Arc<AtomicBool>,
    ) -> Result<Self> {
        info!("Starting system event listener: {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CameraError::ListenerError(format!("{}: {}", program, e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(CameraError::ListenerError(format!(
                "{}: stdout not captured",
                program
            )));
        };

        let mut listener = Self::from_reader(stdout, tx, processing)?;
        listener.child = Some(child);
        Ok(listener)
    }

    /// Forward lines from an arbitrary reader instead of a subprocess
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        tx: Sender<Message>,
        processing: Arc<AtomicBool>,
    ) -> Result<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stopping);
        let handle = thread::Builder::new()
            .name("system-events".to_string())
            .spawn(move || forward_lines(BufReader::new(reader), &tx, &processing, &stop_flag))
            .map_err(|e| CameraError::ListenerError(e.to_string()))?;

        Ok(Self {
            child: None,
            handle: Some(handle),
            stopping,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Kill the follower process and wait for the reader thread
    ///
    /// Lines still waiting for room in a full channel are dropped.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            debug!("Stopping system event listener");
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SystemEventListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward_lines<R: BufRead>(
    reader: R,
    tx: &Sender<Message>,
    processing: &AtomicBool,
    stopping: &AtomicBool,
) {
    'lines: for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("System log stream read failed: {}", e);
                break;
            }
        };
        if !processing.load(Ordering::SeqCst) {
            trace!("Not processing events, skipping: {}", line);
            continue;
        }
        let mut message = Message::LogLine(line);
        loop {
            match tx.send_timeout(message, SEND_RETRY) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if stopping.load(Ordering::SeqCst) {
                        debug!("Listener stopped with a full channel");
                        return;
                    }
                    if !processing.load(Ordering::SeqCst) {
                        trace!("Stopped processing, dropping pending line");
                        continue 'lines;
                    }
                    message = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!("Manager gone, listener exiting");
                    return;
                }
            }
        }
    }
    debug!("System log stream ended");
}
