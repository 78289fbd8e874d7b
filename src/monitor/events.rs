//! Messages carried by the hand-off channel and notifications emitted by the manager

use crate::device::{Device, DeviceId, DeviceState, StateParam};

/// Identifies one background job so stale results can be told apart
pub type TaskId = u64;

/// Whether originals stay on the camera after a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

impl TransferMode {
    /// State reported while files are transferred
    pub fn state(&self) -> DeviceState {
        match self {
            TransferMode::Copy => DeviceState::Copy,
            TransferMode::Move => DeviceState::Move,
        }
    }

    pub(crate) fn progress_verb(&self) -> &'static str {
        match self {
            TransferMode::Copy => "Copying",
            TransferMode::Move => "Moving",
        }
    }

    pub(crate) fn verb(&self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }

    pub(crate) fn past_tense(&self) -> &'static str {
        match self {
            TransferMode::Copy => "copied",
            TransferMode::Move => "moved",
        }
    }
}

/// Everything that reaches the processing context
#[derive(Debug, Clone)]
pub enum Message {
    /// Raw line from the system log stream
    LogLine(String),
    /// Listing job outcome; the error side carries the failure text
    FilesListed {
        id: DeviceId,
        task: TaskId,
        result: Result<Vec<String>, String>,
    },
    /// A job asks for a device transition
    Transition {
        id: DeviceId,
        task: TaskId,
        state: DeviceState,
        param: StateParam,
    },
    /// A job has sent its last message
    TaskFinished { id: DeviceId, task: TaskId },
    Refresh,
    /// User-triggered transition
    Request { id: DeviceId, state: DeviceState },
    Copy {
        id: DeviceId,
        indexes: Vec<usize>,
        mode: TransferMode,
    },
    Cancel { id: DeviceId },
    Shutdown,
}

/// Registry notifications, sent after the mutation is complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Added(DeviceId),
    /// A listing finished (successfully or not)
    Updated(DeviceId),
    /// The device went through a transition
    StateChanged(DeviceId),
    Removed { id: DeviceId, name: String },
}

impl ManagerEvent {
    pub fn id(&self) -> DeviceId {
        match self {
            ManagerEvent::Added(id)
            | ManagerEvent::Updated(id)
            | ManagerEvent::StateChanged(id)
            | ManagerEvent::Removed { id, .. } => *id,
        }
    }
}

/// Manager subscriber, called with the event and the registry after the change
pub type ManagerObserver = Box<dyn FnMut(&ManagerEvent, &[Device]) + Send>;
