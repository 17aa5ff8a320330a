//! The table of open input devices.
//!
//! [`InputDeviceManager`] owns every [`InputDevice`] (keyed by device id) and
//! tells its [`DeviceListener`]s about additions and removals.  Nothing else
//! holds a strong reference to a device: the event loop callback and the seat
//! layer only keep the id or a `Weak`, so removing a device here is what
//! destroys it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use inputflow_core::DeviceInfo;
use thiserror::Error;
use tracing::info;

use crate::infrastructure::input_device::InputDevice;

/// Error type for device table mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceManagerError {
    #[error("device id {0} is already registered")]
    DuplicateId(i32),

    #[error("no device matches {0}")]
    NotFound(String),
}

/// Observer of device table changes.
///
/// Listeners are called while the manager is mutably borrowed and must not
/// call back into it.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceListener {
    fn on_device_added(&self, device: &Rc<RefCell<InputDevice>>);
    fn on_device_removed(&self, info: &DeviceInfo);
}

/// Owner of all open devices.
#[derive(Default)]
pub struct InputDeviceManager {
    devices: BTreeMap<i32, Rc<RefCell<InputDevice>>>,
    listeners: Vec<Rc<dyn DeviceListener>>,
}

impl InputDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Rc<dyn DeviceListener>) {
        self.listeners.push(listener);
    }

    /// Takes ownership of `device` and notifies listeners.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceManagerError::DuplicateId`] if a device with the same id
    /// is registered; `device` is dropped (and closed) in that case.
    pub fn add_device(&mut self, device: InputDevice) -> Result<Rc<RefCell<InputDevice>>, DeviceManagerError> {
        let id = device.id();
        if self.devices.contains_key(&id) {
            return Err(DeviceManagerError::DuplicateId(id));
        }
        info!(
            device_id = id,
            name = %device.info().name,
            path = %device.device_file().display(),
            capabilities = ?device.info().capabilities,
            "device added"
        );
        let device = Rc::new(RefCell::new(device));
        self.devices.insert(id, Rc::clone(&device));
        for listener in &self.listeners {
            listener.on_device_added(&device);
        }
        Ok(device)
    }

    /// Removes and closes the device with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceManagerError::NotFound`] if no such device exists.
    pub fn remove_device(&mut self, id: i32) -> Result<DeviceInfo, DeviceManagerError> {
        let device = self
            .devices
            .remove(&id)
            .ok_or_else(|| DeviceManagerError::NotFound(format!("id {id}")))?;
        Ok(self.finish_removal(device))
    }

    /// Removes and closes the device opened from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceManagerError::NotFound`] if no device uses that file.
    pub fn remove_device_by_file(&mut self, path: &Path) -> Result<DeviceInfo, DeviceManagerError> {
        let id = self
            .devices
            .iter()
            .find(|(_, d)| d.borrow().device_file() == path)
            .map(|(&id, _)| id)
            .ok_or_else(|| DeviceManagerError::NotFound(path.display().to_string()))?;
        self.remove_device(id)
    }

    pub fn device(&self, id: i32) -> Option<Rc<RefCell<InputDevice>>> {
        self.devices.get(&id).cloned()
    }

    pub fn device_ids(&self) -> Vec<i32> {
        self.devices.keys().copied().collect()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.devices.values().any(|d| d.borrow().device_file() == path)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Closes every device, notifying listeners, in id order.
    pub fn clear(&mut self) {
        let ids = self.device_ids();
        for id in ids {
            let _ = self.remove_device(id);
        }
    }

    fn finish_removal(&mut self, device: Rc<RefCell<InputDevice>>) -> DeviceInfo {
        let info = {
            let mut device = device.borrow_mut();
            device.close();
            device.info().clone()
        };
        info!(device_id = info.id, path = %info.device_file.display(), "device removed");
        for listener in &self.listeners {
            listener.on_device_removed(&info);
        }
        info
    }
}

impl std::fmt::Debug for InputDeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDeviceManager")
            .field("devices", &self.device_ids())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
