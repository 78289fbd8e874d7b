//! Device lifecycle states and their parameter payload

use std::fmt::{self, Display};

/// Lifecycle state of an attached camera
///
/// Any state may follow any other; the transition operation does not police
/// legality so front-ends stay free to drive the flow as they like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    #[default]
    Idle,
    Init,
    VerifyCopy,
    VerifyMove,
    StartCopy,
    Copy,
    Move,
    Done,
    Error,
    Removed,
}

impl DeviceState {
    pub const ALL: [DeviceState; 10] = [
        DeviceState::Idle,
        DeviceState::Init,
        DeviceState::VerifyCopy,
        DeviceState::VerifyMove,
        DeviceState::StartCopy,
        DeviceState::Copy,
        DeviceState::Move,
        DeviceState::Done,
        DeviceState::Error,
        DeviceState::Removed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DeviceState::Idle => "Idle",
            DeviceState::Init => "Initializing",
            DeviceState::VerifyCopy => "VerifyCopy",
            DeviceState::VerifyMove => "VerifyMove",
            DeviceState::StartCopy => "StartCopy",
            DeviceState::Copy => "Copy",
            DeviceState::Move => "Moving",
            DeviceState::Done => "Done",
            DeviceState::Error => "Error",
            DeviceState::Removed => "Removed",
        }
    }

    /// Whether a background transfer reports progress in this state
    pub fn is_transferring(&self) -> bool {
        matches!(self, DeviceState::Copy | DeviceState::Move)
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Contextual data attached to a state: progress text, error detail, ...
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateParam {
    #[default]
    None,
    Text(String),
    List(Vec<String>),
}

impl StateParam {
    pub fn text(value: impl Into<String>) -> Self {
        StateParam::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateParam::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, StateParam::None)
    }
}

impl Display for StateParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateParam::None => Ok(()),
            StateParam::Text(text) => f.write_str(text),
            StateParam::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for StateParam {
    fn from(value: &str) -> Self {
        StateParam::Text(value.to_string())
    }
}

impl From<String> for StateParam {
    fn from(value: String) -> Self {
        StateParam::Text(value)
    }
}

impl From<()> for StateParam {
    fn from(_: ()) -> Self {
        StateParam::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(DeviceState::Init.to_string(), "Initializing");
        assert_eq!(DeviceState::Move.to_string(), "Moving");
        assert_eq!(DeviceState::VerifyMove.to_string(), "VerifyMove");
        assert_eq!(DeviceState::default(), DeviceState::Idle);
    }

    #[test]
    fn test_param_display() {
        assert_eq!(StateParam::None.to_string(), "");
        assert_eq!(StateParam::text("Copying 1 / 3").to_string(), "Copying 1 / 3");
        assert_eq!(
            StateParam::List(vec!["a".into(), "b".into()]).to_string(),
            "a, b"
        );
    }

    #[test]
    fn test_transferring_states() {
        let transferring: Vec<_> = DeviceState::ALL
            .iter()
            .filter(|s| s.is_transferring())
            .collect();
        assert_eq!(transferring, vec![&DeviceState::Copy, &DeviceState::Move]);
    }
}
