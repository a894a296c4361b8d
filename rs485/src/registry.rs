//! Device registry and frame dispatch

use std::time::Instant;

use tracing::trace;

use rs485_types::StateValue;

use crate::{
    device::{Device, DeviceDescriptor, DeviceId, StateListener},
    error::{Error, Result},
};

/// Result of offering one frame to every device
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dispatch {
    /// Devices whose patterns claimed the frame
    pub claimed: Vec<DeviceId>,

    /// State changes, in device registration order
    pub changes: Vec<(DeviceId, StateValue)>,
}

/// Devices of one bus, in registration order
#[derive(Debug, Default)]
pub struct Registry {
    devices: Vec<Device>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a device
    pub fn register(&mut self, descriptor: DeviceDescriptor) -> Result<DeviceId> {
        descriptor.validate()?;

        let id = DeviceId(self.devices.len());
        self.devices.push(Device::new(id, descriptor));
        Ok(id)
    }

    pub fn add_listener(&mut self, id: DeviceId, listener: Box<dyn StateListener>) -> Result<()> {
        self.get_mut(id)?.add_listener(listener);
        Ok(())
    }

    pub fn get(&self, id: DeviceId) -> Result<&Device> {
        self.devices.get(id.0).ok_or(Error::UnknownDevice(id))
    }

    fn get_mut(&mut self, id: DeviceId) -> Result<&mut Device> {
        self.devices.get_mut(id.0).ok_or(Error::UnknownDevice(id))
    }

    pub fn find(&self, name: &str) -> Option<DeviceId> {
        self.devices.iter().find(|d| d.name() == name).map(Device::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Offer `frame` to every device; overlapping devices all see it
    pub fn dispatch(&mut self, frame: &[u8]) -> Dispatch {
        let mut result = Dispatch::default();

        for device in &mut self.devices {
            if !device.claims(frame) {
                continue;
            }
            trace!(device = %device.name(), "Frame claimed");
            result.claimed.push(device.id());

            let id = device.id();
            result
                .changes
                .extend(device.observe(frame).into_iter().map(|value| (id, value)));
        }

        result
    }

    /// Devices whose state poll is due at `now`
    pub fn due_polls(&mut self, now: Instant) -> Vec<DeviceId> {
        self.devices
            .iter_mut()
            .filter_map(|device| device.poll_due(now).then(|| device.id()))
            .collect()
    }
}
