//! Device Manager
//!
//! The [`DeviceManager`] is the processing context: it owns the registry and
//! every device's state, and it is the only consumer of the hand-off channel.
//! Listener lines, job results and external requests all arrive as [`Message`]s
//! and are applied one at a time, so no two registry mutations or notifications
//! ever interleave.
//!
//! Reconciliation is a full diff. Every [`refresh`](DeviceManager::refresh)
//! recomputes the attached set from a fresh enumeration, so repeating it without
//! a hardware change emits nothing.

use crate::core::config::Config;
use crate::core::error::{CameraError, Result};
use crate::core::settings::{self, SettingsStore};
use crate::device::media;
use crate::device::tool::{connected_devices, CameraTool, CancelToken};
use crate::device::{Device, DeviceId, DeviceState, StateParam};
use crate::monitor::events::{ManagerEvent, ManagerObserver, Message, TaskId, TransferMode};
use crate::monitor::listener::classify;
use crate::monitor::tasks::{copy_files_job, list_files_job, TransferRequest};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour knobs taken from the config file and CLI flags
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Extensions picked by `StartCopy`/`Move` requests
    pub extensions: Vec<String>,
    /// Put each camera's files in a subfolder named after it
    pub subfolder_by_device: bool,
    /// Create the destination when it does not exist yet
    pub create_missing: bool,
    /// Size of the bounded hand-off channel
    pub channel_capacity: usize,
    /// Start a transfer as soon as a camera's listing arrives
    pub auto_transfer: Option<TransferMode>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ManagerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extensions: config.filter.extensions.clone(),
            subfolder_by_device: config.output.subfolder_by_device,
            create_missing: config.output.create_missing,
            channel_capacity: config.events.channel_capacity.max(1),
            auto_transfer: None,
        }
    }
}

#[derive(Debug)]
struct ActiveTask {
    task: TaskId,
    cancel: CancelToken,
}

/// Registry of attached cameras and owner of their state
pub struct DeviceManager {
    tool: Arc<dyn CameraTool>,
    settings: Arc<dyn SettingsStore>,
    options: ManagerOptions,
    devices: Vec<Device>,
    active: HashMap<DeviceId, ActiveTask>,
    next_task: TaskId,
    subscribers: Vec<ManagerObserver>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    processing: Arc<AtomicBool>,
    stopped: bool,
}

impl DeviceManager {
    /// Build the manager and run the initial reconciliation
    pub fn new(
        tool: Arc<dyn CameraTool>,
        settings: Arc<dyn SettingsStore>,
        options: ManagerOptions,
    ) -> Self {
        let (tx, rx) = bounded(options.channel_capacity.max(1));
        let mut manager = Self {
            tool,
            settings,
            options,
            devices: Vec::new(),
            active: HashMap::new(),
            next_task: 1,
            subscribers: Vec::new(),
            tx,
            rx,
            processing: Arc::new(AtomicBool::new(true)),
            stopped: false,
        };
        manager.refresh();
        manager
    }

    /// Producer handle for the listener and for external requests
    pub fn sender(&self) -> Sender<Message> {
        self.tx.clone()
    }

    /// Flag shared with the listener; cleared by [`close`](Self::close)
    pub fn processing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.processing)
    }

    pub fn is_processing_events(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Stop reacting to system events; running jobs are left alone
    pub fn close(&mut self) {
        info!("Device manager closing, ignoring further system events");
        self.processing.store(false, Ordering::SeqCst);
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether a listing or transfer job is running for `id`
    pub fn is_busy(&self, id: DeviceId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&ManagerEvent, &[Device]) + Send + 'static,
    {
        self.subscribers.push(Box::new(handler));
    }

    /// Attach an observer to one registered device
    pub fn observe_device<F>(&mut self, id: DeviceId, observer: F) -> Result<()>
    where
        F: FnMut(&DeviceId, DeviceState, &StateParam) + Send + 'static,
    {
        self.device_mut(id)
            .ok_or_else(|| CameraError::DeviceNotFound(id.port_path()))?
            .observe(observer);
        Ok(())
    }

    /// Currently stored destination folder
    pub fn destination(&self) -> Option<PathBuf> {
        settings::destination_path(self.settings.as_ref())
    }

    fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    fn emit(&mut self, event: ManagerEvent) {
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&event, &self.devices);
        }
    }

    fn transition(&mut self, id: DeviceId, state: DeviceState, param: impl Into<StateParam>) {
        let Some(device) = self.device_mut(id) else {
            debug!("Ignoring transition to {} for unknown device {}", state, id);
            return;
        };
        device.transition(state, param);
        self.emit(ManagerEvent::StateChanged(id));
    }

    fn allocate_task(&mut self) -> TaskId {
        let task = self.next_task;
        self.next_task += 1;
        task
    }

    fn is_current(&self, id: DeviceId, task: TaskId) -> bool {
        self.active.get(&id).is_some_and(|active| active.task == task)
    }

    /// Cancel the running job and drop whatever it still sends
    fn detach_task(&mut self, id: DeviceId) {
        if let Some(active) = self.active.remove(&id) {
            debug!("Detaching task {} from {}", active.task, id);
            active.cancel.cancel();
        }
    }

    /// Reconcile the registry against a fresh enumeration
    pub fn refresh(&mut self) {
        let found: Vec<Device> = match connected_devices(self.tool.as_ref()) {
            Ok(devices) => devices.collect(),
            Err(e) => {
                error!("Device enumeration failed, keeping registry: {}", e);
                return;
            }
        };

        let present: HashSet<DeviceId> = found.iter().map(Device::id).collect();
        let gone: Vec<DeviceId> = self
            .devices
            .iter()
            .map(Device::id)
            .filter(|id| !present.contains(id))
            .collect();

        for device in found {
            if self.device(device.id()).is_none() {
                self.add_device(device);
            }
        }

        for id in gone {
            self.remove_device(id);
        }

        debug!("Refresh done, {} devices registered", self.devices.len());
    }

    fn add_device(&mut self, device: Device) {
        let id = device.id();
        info!("Device added: {} ({})", device.name(), id);
        self.devices.push(device);
        self.emit(ManagerEvent::Added(id));
        self.transition(id, DeviceState::Idle, "Discovering files..");
        self.start_listing(id);
    }

    fn remove_device(&mut self, id: DeviceId) {
        self.transition(id, DeviceState::Removed, ());
        self.detach_task(id);

        let Some(pos) = self.devices.iter().position(|d| d.id() == id) else {
            return;
        };
        let device = self.devices.remove(pos);
        info!("Device removed: {} ({})", device.name(), id);
        self.emit(ManagerEvent::Removed {
            id,
            name: device.name().to_string(),
        });
    }

    fn start_listing(&mut self, id: DeviceId) {
        self.transition(id, DeviceState::Init, "Discovering files..");

        let task = self.allocate_task();
        let cancel = CancelToken::new();
        match list_files_job(
            Arc::clone(&self.tool),
            id,
            task,
            cancel.clone(),
            self.tx.clone(),
        ) {
            Ok(_) => {
                self.active.insert(id, ActiveTask { task, cancel });
            }
            Err(e) => {
                error!("Could not start listing job for {}: {}", id, e);
                self.transition(
                    id,
                    DeviceState::Error,
                    format!("Could not list files: {}", e),
                );
            }
        }
    }

    fn on_files_listed(
        &mut self,
        id: DeviceId,
        task: TaskId,
        result: std::result::Result<Vec<String>, String>,
    ) {
        if !self.is_current(id, task) {
            debug!("Dropping listing result {} for {}", task, id);
            return;
        }
        self.active.remove(&id);

        match result {
            Ok(files) => {
                let Some(device) = self.device_mut(id) else {
                    return;
                };
                device.set_file_paths(files);
                let found = found_text(device.file_count());
                self.transition(id, DeviceState::Idle, found);
                self.emit(ManagerEvent::Updated(id));

                if let Some(mode) = self.options.auto_transfer {
                    self.auto_transfer(id, mode);
                }
            }
            Err(text) => {
                self.transition(id, DeviceState::Error, text);
                self.emit(ManagerEvent::Updated(id));
            }
        }
    }

    fn auto_transfer(&mut self, id: DeviceId, mode: TransferMode) {
        let indexes = self.copyable_indexes(id);
        if indexes.is_empty() {
            debug!("Nothing to transfer from {}", id);
            return;
        }
        if let Err(e) = self.copy_files(id, indexes, mode) {
            warn!("Automatic transfer from {} not started: {}", id, e);
        }
    }

    fn copyable_indexes(&self, id: DeviceId) -> Vec<usize> {
        self.device(id)
            .map(|d| media::copyable_indexes(d.file_paths(), &self.options.extensions))
            .unwrap_or_default()
    }

    /// Apply a user-triggered state change
    pub fn request(&mut self, id: DeviceId, state: DeviceState) -> Result<()> {
        let Some(device) = self.device(id) else {
            return Err(CameraError::DeviceNotFound(id.port_path()));
        };
        let file_count = device.file_count();

        match state {
            DeviceState::Idle => {
                self.detach_task(id);
                self.transition(id, DeviceState::Idle, found_text(file_count));
            }
            DeviceState::VerifyCopy | DeviceState::VerifyMove => match self.destination() {
                Some(destination) => {
                    self.transition(id, state, destination.display().to_string());
                }
                None => {
                    self.transition(id, DeviceState::Error, CameraError::NoDestination.to_string());
                    return Err(CameraError::NoDestination);
                }
            },
            DeviceState::StartCopy | DeviceState::Move if self.is_busy(id) => {
                warn!("{} is busy, ignoring {} request", id, state);
            }
            DeviceState::StartCopy => {
                self.transition(id, DeviceState::StartCopy, ());
                let indexes = self.copyable_indexes(id);
                self.copy_files(id, indexes, TransferMode::Copy)?;
            }
            DeviceState::Move => {
                let indexes = self.copyable_indexes(id);
                self.copy_files(id, indexes, TransferMode::Move)?;
            }
            DeviceState::Init
            | DeviceState::Copy
            | DeviceState::Done
            | DeviceState::Error
            | DeviceState::Removed => self.transition(id, state, ()),
        }
        Ok(())
    }

    /// Start transferring `indexes` (1-based, in the given order) from `id`
    pub fn copy_files(&mut self, id: DeviceId, indexes: Vec<usize>, mode: TransferMode) -> Result<()> {
        let Some(device) = self.device(id) else {
            return Err(CameraError::DeviceNotFound(id.port_path()));
        };
        let files = device.file_paths().to_vec();
        if let Some(active) = self.active.get(&id) {
            warn!(
                "{} is busy with task {}, ignoring {} request",
                id,
                active.task,
                mode.verb()
            );
            return Ok(());
        }

        let destination = match self.transfer_destination(id) {
            Ok(destination) => destination,
            Err(e) => {
                self.transition(id, DeviceState::Error, e.to_string());
                return Err(e);
            }
        };

        let task = self.allocate_task();
        let cancel = CancelToken::new();
        info!(
            "Starting {} of {} files from {} to {}",
            mode.verb(),
            indexes.len(),
            id,
            destination.display()
        );
        let request = TransferRequest {
            id,
            task,
            indexes,
            files,
            destination,
            mode,
            cancel: cancel.clone(),
        };

        match copy_files_job(Arc::clone(&self.tool), request, self.tx.clone()) {
            Ok(_) => {
                self.active.insert(id, ActiveTask { task, cancel });
                Ok(())
            }
            Err(e) => {
                self.transition(
                    id,
                    DeviceState::Error,
                    format!("Could not start transfer: {}", e),
                );
                Err(e.into())
            }
        }
    }

    fn transfer_destination(&self, id: DeviceId) -> Result<PathBuf> {
        let base = self.destination().ok_or(CameraError::NoDestination)?;
        let dir = match self.device(id) {
            Some(device) if self.options.subfolder_by_device => {
                base.join(media::slugify(device.name()))
            }
            _ => base,
        };

        if !dir.is_dir() {
            if !self.options.create_missing {
                return Err(CameraError::IoError(format!(
                    "Destination {} does not exist",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir).map_err(|e| {
                CameraError::IoError(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(dir)
    }

    /// Ask the running job of `id` to stop; it reports its own final state
    pub fn cancel(&mut self, id: DeviceId) -> bool {
        match self.active.get(&id) {
            Some(active) => {
                info!("Cancelling task {} on {}", active.task, id);
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn on_log_line(&mut self, line: &str) {
        if !self.is_processing_events() {
            trace!("Closed, ignoring log line");
            return;
        }
        if let Some(event) = classify(line) {
            info!("USB event: {:?}", event);
            self.refresh();
        }
    }

    /// Apply one message in the processing context
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::LogLine(line) => self.on_log_line(&line),
            Message::FilesListed { id, task, result } => self.on_files_listed(id, task, result),
            Message::Transition {
                id,
                task,
                state,
                param,
            } => {
                if self.is_current(id, task) {
                    self.transition(id, state, param);
                } else {
                    debug!("Dropping transition from task {} on {}", task, id);
                }
            }
            Message::TaskFinished { id, task } => {
                if self.is_current(id, task) {
                    self.active.remove(&id);
                }
            }
            Message::Refresh => self.refresh(),
            Message::Request { id, state } => {
                if let Err(e) = self.request(id, state) {
                    warn!("Request {} for {} failed: {}", state, id, e);
                }
            }
            Message::Copy { id, indexes, mode } => {
                if let Err(e) = self.copy_files(id, indexes, mode) {
                    warn!("Transfer request for {} failed: {}", id, e);
                }
            }
            Message::Cancel { id } => {
                self.cancel(id);
            }
            Message::Shutdown => {
                info!("Device manager shutting down");
                self.stopped = true;
            }
        }
    }

    /// Wait up to `timeout` for one message and apply it
    ///
    /// Returns whether a message was handled.
    pub fn step(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Apply everything already queued without waiting
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Process messages until `Message::Shutdown` arrives
    pub fn run(&mut self) {
        while !self.stopped {
            match self.rx.recv() {
                Ok(message) => self.handle(message),
                Err(_) => break,
            }
        }
    }
}

fn found_text(count: usize) -> String {
    format!("Found {} files", count)
}
