//! The attached camera entity
//!
//! A [`Device`] is identified only by its USB bus and port. Its state and state
//! parameter change exclusively through [`Device::transition`], which notifies
//! every observer before returning.

use crate::device::state::{DeviceState, StateParam};
use log::info;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// USB location of a camera, rendered as the gphoto2 port selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub bus: u16,
    pub port: u16,
}

impl DeviceId {
    pub fn new(bus: u16, port: u16) -> Self {
        Self { bus, port }
    }

    /// Selector string `usb:BBB,PPP`, zero-padded to three digits
    pub fn port_path(&self) -> String {
        format!("usb:{:03},{:03}", self.bus, self.port)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.port_path())
    }
}

impl FromStr for DeviceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix("usb:")
            .ok_or_else(|| format!("port '{}' must look like usb:BBB,PPP", s))?;
        let (bus, port) = rest
            .split_once(',')
            .ok_or_else(|| format!("port '{}' must look like usb:BBB,PPP", s))?;
        let bus = bus
            .parse()
            .map_err(|_| format!("invalid bus number in '{}'", s))?;
        let port = port
            .parse()
            .map_err(|_| format!("invalid port number in '{}'", s))?;
        Ok(Self { bus, port })
    }
}

/// Callback invoked on every state transition
pub type StateObserver = Box<dyn FnMut(&DeviceId, DeviceState, &StateParam) + Send>;

/// One attached camera
pub struct Device {
    name: String,
    id: DeviceId,
    file_paths: Vec<String>,
    state: DeviceState,
    state_param: StateParam,
    observers: Vec<StateObserver>,
}

impl Device {
    pub fn new(name: impl Into<String>, bus: u16, port: u16) -> Self {
        Self {
            name: name.into(),
            id: DeviceId::new(bus, port),
            file_paths: Vec::new(),
            state: DeviceState::Idle,
            state_param: StateParam::None,
            observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn bus(&self) -> u16 {
        self.id.bus
    }

    pub fn port(&self) -> u16 {
        self.id.port
    }

    /// Identity key and external tool selector
    pub fn port_path(&self) -> String {
        self.id.port_path()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn state_param(&self) -> &StateParam {
        &self.state_param
    }

    pub fn file_paths(&self) -> &[String] {
        &self.file_paths
    }

    pub fn set_file_paths(&mut self, paths: Vec<String>) {
        self.file_paths = paths;
    }

    pub fn file_count(&self) -> usize {
        self.file_paths.len()
    }

    /// Register an observer called with every future transition
    pub fn observe<F>(&mut self, observer: F)
    where
        F: FnMut(&DeviceId, DeviceState, &StateParam) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Set state and parameter, then notify observers synchronously
    pub fn transition(&mut self, state: DeviceState, param: impl Into<StateParam>) {
        self.state = state;
        self.state_param = param.into();
        info!(
            "Dev state \"{}\" ({}, {}) {}",
            self.state, self.name, self.id, self.state_param
        );

        for observer in self.observers.iter_mut() {
            observer(&self.id, self.state, &self.state_param);
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.port_path() == other.port_path()
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.port_path().hash(state);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("port_path", &self.port_path())
            .field("files", &self.file_paths.len())
            .field("state", &self.state)
            .field("state_param", &self.state_param)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_port_path_is_zero_padded() {
        let device = Device::new("Nikon DSC D750", 1, 5);
        assert_eq!(device.port_path(), "usb:001,005");
        assert_eq!(DeviceId::new(12, 123).port_path(), "usb:012,123");
    }

    #[test]
    fn test_identity_ignores_name_and_files() {
        let a = Device::new("Canon EOS 5D", 2, 7);
        let mut b = Device::new("Some other label", 2, 7);
        b.set_file_paths(vec!["/DCIM/IMG_0001.JPG".into()]);

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_different_port_is_different_device() {
        assert_ne!(Device::new("Cam", 1, 5), Device::new("Cam", 1, 6));
    }

    #[test]
    fn test_transition_notifies_with_new_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut device = Device::new("Cam", 1, 5);
        device.observe(move |id, state, param| {
            sink.lock().unwrap().push((*id, state, param.clone()));
        });

        device.transition(DeviceState::Copy, "Copying 1 / 2");
        device.transition(DeviceState::Done, ());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, DeviceId::new(1, 5));
        assert_eq!(seen[0].1, DeviceState::Copy);
        assert_eq!(seen[0].2, StateParam::text("Copying 1 / 2"));
        assert_eq!(seen[1].1, DeviceState::Done);
        assert!(seen[1].2.is_none());
        assert_eq!(device.state(), DeviceState::Done);
    }

    #[test]
    fn test_observer_sees_committed_state() {
        // Observers run after both fields are written, never in between
        let mut device = Device::new("Cam", 3, 1);
        device.transition(DeviceState::Error, "boom");
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        device.observe(move |_, state, param| {
            *sink.lock().unwrap() = Some((state, param.to_string()));
        });
        device.transition(DeviceState::Idle, "Found 3 files");
        assert_eq!(
            *seen.lock().unwrap(),
            Some((DeviceState::Idle, "Found 3 files".to_string()))
        );
    }

    #[test]
    fn test_parse_selector() {
        let id: DeviceId = "usb:001,005".parse().unwrap();
        assert_eq!(id, DeviceId::new(1, 5));
        let id: DeviceId = "usb:3,17".parse().unwrap();
        assert_eq!(id.port_path(), "usb:003,017");
        assert!("ptpip:10.0.0.2".parse::<DeviceId>().is_err());
        assert!("usb:001".parse::<DeviceId>().is_err());
    }
}
