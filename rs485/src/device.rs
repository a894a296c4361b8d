//! Devices sharing the bus

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use rs485_core::{
    BytePattern, CommandInput, CommandTemplate, Error as CoreError, NumericDecoder,
    constants::DEFAULT_UPDATE_INTERVAL_SECS,
};
use rs485_types::StateValue;

/// Index of a device in its bus registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Request sent to a device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    On,
    Off,
    /// Ask the device to report its state
    State,
    /// One of the device's named commands
    Named { name: String, input: CommandInput },
}

impl DeviceCommand {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            input: CommandInput::default(),
        }
    }

    pub fn named_with(name: impl Into<String>, input: CommandInput) -> Self {
        Self::Named {
            name: name.into(),
            input,
        }
    }

    pub(crate) fn input(&self) -> CommandInput {
        match self {
            Self::Named { input, .. } => input.clone(),
            _ => CommandInput::default(),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::State => f.write_str("state"),
            Self::Named { name, .. } => f.write_str(name),
        }
    }
}

/// Receives state changes of one device
pub trait StateListener: Send {
    fn on_state_changed(&mut self, device: &str, value: &StateValue);
}

impl<F> StateListener for F
where
    F: FnMut(&str, &StateValue) + Send,
{
    fn on_state_changed(&mut self, device: &str, value: &StateValue) {
        self(device, value)
    }
}

/// Static description of a device: how to recognise it and how to drive it
///
/// # Examples
///
/// ```
/// use rs485::{BytePattern, Command, DeviceDescriptor, NumericSpec};
///
/// let light = DeviceDescriptor::new("light", BytePattern::exact(vec![0x0E, 0x1F]))
///     .with_state_on(BytePattern::new(2, vec![0x01]))
///     .with_state_off(BytePattern::new(2, vec![0x00]))
///     .with_command_on(Command::new(vec![0x0E, 0x1F, 0x01]).with_ack(vec![0x0E, 0x9F]))
///     .with_command_off(Command::new(vec![0x0E, 0x1F, 0x00]).with_ack(vec![0x0E, 0x9F]));
///
/// assert!(light.validate().is_ok());
///
/// let fan = DeviceDescriptor::new("fan", BytePattern::exact(vec![0x0E, 0x2B]))
///     .with_state("low", BytePattern::new(2, vec![0x01]))
///     .with_state("high", BytePattern::new(2, vec![0x03]))
///     .with_command("high", Command::new(vec![0x0E, 0x2B, 0x03]));
///
/// assert!(fan.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,

    /// Bytes identifying the device's frames
    pub device: BytePattern,

    /// Further narrowing for devices sharing an address
    pub sub_device: Option<BytePattern>,

    pub state_on: Option<BytePattern>,
    pub state_off: Option<BytePattern>,

    /// Named states (modes, speeds), first match wins
    pub states: Vec<(String, BytePattern)>,

    /// Named numeric fields, in registration order
    pub numeric: Vec<(String, NumericDecoder)>,

    pub command_on: Option<CommandTemplate>,
    pub command_off: Option<CommandTemplate>,

    /// Extra commands reachable by name
    pub commands: Vec<(String, CommandTemplate)>,

    /// Poll request sent every `update_interval`
    pub command_state: Option<CommandTemplate>,

    pub update_interval: Duration,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, device: BytePattern) -> Self {
        Self {
            name: name.into(),
            device,
            sub_device: None,
            state_on: None,
            state_off: None,
            states: Vec::new(),
            numeric: Vec::new(),
            command_on: None,
            command_off: None,
            commands: Vec::new(),
            command_state: None,
            update_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
        }
    }

    pub fn with_sub_device(mut self, pattern: BytePattern) -> Self {
        self.sub_device = Some(pattern);
        self
    }

    pub fn with_state_on(mut self, pattern: BytePattern) -> Self {
        self.state_on = Some(pattern);
        self
    }

    pub fn with_state_off(mut self, pattern: BytePattern) -> Self {
        self.state_off = Some(pattern);
        self
    }

    /// Add a named state, tested after the ones added before it
    pub fn with_state(mut self, name: impl Into<String>, pattern: BytePattern) -> Self {
        self.states.push((name.into(), pattern));
        self
    }

    pub fn with_numeric(mut self, name: impl Into<String>, decoder: impl Into<NumericDecoder>) -> Self {
        self.numeric.push((name.into(), decoder.into()));
        self
    }

    pub fn with_command_on(mut self, command: impl Into<CommandTemplate>) -> Self {
        self.command_on = Some(command.into());
        self
    }

    pub fn with_command_off(mut self, command: impl Into<CommandTemplate>) -> Self {
        self.command_off = Some(command.into());
        self
    }

    pub fn with_command(mut self, name: impl Into<String>, command: impl Into<CommandTemplate>) -> Self {
        self.commands.push((name.into(), command.into()));
        self
    }

    pub fn with_command_state(mut self, command: impl Into<CommandTemplate>) -> Self {
        self.command_state = Some(command.into());
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Check patterns, numeric fields and option conflicts
    pub fn validate(&self) -> rs485_core::Result<()> {
        self.device.validate()?;
        for pattern in [&self.sub_device, &self.state_on, &self.state_off]
            .into_iter()
            .flatten()
        {
            pattern.validate()?;
        }

        let mut states = HashSet::new();
        for (name, pattern) in &self.states {
            if !states.insert(name.as_str()) {
                return Err(CoreError::ConfigurationConflict(format!(
                    "device '{}' declares state '{}' twice",
                    self.name, name
                )));
            }
            pattern.validate()?;
        }

        let mut names = HashSet::new();
        for (name, decoder) in &self.numeric {
            if !names.insert(name.as_str()) {
                return Err(CoreError::ConfigurationConflict(format!(
                    "device '{}' declares numeric field '{}' twice",
                    self.name, name
                )));
            }
            if let NumericDecoder::Static(spec) = decoder {
                spec.validate()?;
            }
        }

        if self.state_on.is_none()
            && self.state_off.is_none()
            && self.states.is_empty()
            && self.numeric.is_empty()
        {
            return Err(CoreError::ConfigurationConflict(format!(
                "device '{}' has no state pattern or numeric field",
                self.name
            )));
        }

        if self.command_state.is_some() && self.update_interval.is_zero() {
            return Err(CoreError::ConfigurationConflict(format!(
                "device '{}' polls with a zero update interval",
                self.name
            )));
        }

        Ok(())
    }

    fn template(&self, command: &DeviceCommand) -> Option<&CommandTemplate> {
        match command {
            DeviceCommand::On => self.command_on.as_ref(),
            DeviceCommand::Off => self.command_off.as_ref(),
            DeviceCommand::State => self.command_state.as_ref(),
            DeviceCommand::Named { name, .. } => self
                .commands
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, template)| template),
        }
    }
}

/// Registered device with its observed state
pub struct Device {
    id: DeviceId,
    descriptor: DeviceDescriptor,
    binary: Option<bool>,
    mode: Option<usize>,
    numeric: Vec<Option<f64>>,
    listeners: Vec<Box<dyn StateListener>>,
    next_poll: Option<Instant>,
}

impl Device {
    pub(crate) fn new(id: DeviceId, descriptor: DeviceDescriptor) -> Self {
        let numeric = vec![None; descriptor.numeric.len()];
        Self {
            id,
            descriptor,
            binary: None,
            mode: None,
            numeric,
            listeners: Vec::new(),
            next_poll: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Last on/off state seen, if any
    pub fn binary_state(&self) -> Option<bool> {
        self.binary
    }

    /// Last named state seen, if any
    pub fn mode(&self) -> Option<&str> {
        self.mode.map(|idx| self.descriptor.states[idx].0.as_str())
    }

    /// Last value of a numeric field, if any
    pub fn numeric_value(&self, field: &str) -> Option<f64> {
        self.descriptor
            .numeric
            .iter()
            .position(|(name, _)| name == field)
            .and_then(|idx| self.numeric[idx])
    }

    pub(crate) fn add_listener(&mut self, listener: Box<dyn StateListener>) {
        self.listeners.push(listener);
    }

    /// Whether `frame` belongs to this device
    pub fn claims(&self, frame: &[u8]) -> bool {
        self.descriptor.device.matches(frame)
            && self
                .descriptor
                .sub_device
                .as_ref()
                .is_none_or(|sub| sub.matches(frame))
    }

    /// Update the observed state from a claimed frame, returning what changed
    pub(crate) fn observe(&mut self, frame: &[u8]) -> Vec<StateValue> {
        let mut changes = Vec::new();

        let on = self.descriptor.state_on.as_ref().is_some_and(|p| p.matches(frame));
        let off = !on && self.descriptor.state_off.as_ref().is_some_and(|p| p.matches(frame));
        if (on || off) && self.binary != Some(on) {
            debug!(device = %self.descriptor.name, on, "State changed");
            self.binary = Some(on);
            changes.push(StateValue::Binary(on));
        }

        // No named state matching leaves the last one in place
        let mode = self.descriptor.states.iter().position(|(_, p)| p.matches(frame));
        if mode.is_some() && mode != self.mode {
            self.mode = mode;
            if let Some(name) = self.mode() {
                debug!(device = %self.descriptor.name, state = %name, "Mode changed");
                changes.push(StateValue::Mode(name.to_string()));
            }
        }

        for (idx, (field, decoder)) in self.descriptor.numeric.iter().enumerate() {
            let Some(value) = decoder.decode(frame) else {
                trace!(device = %self.descriptor.name, field = %field, "No value in frame");
                continue;
            };
            if self.numeric[idx] != Some(value) {
                debug!(device = %self.descriptor.name, field = %field, value, "Value changed");
                self.numeric[idx] = Some(value);
                changes.push(StateValue::Numeric {
                    field: field.clone(),
                    value,
                });
            }
        }

        for change in &changes {
            for listener in &mut self.listeners {
                listener.on_state_changed(&self.descriptor.name, change);
            }
        }

        changes
    }

    pub(crate) fn template(&self, command: &DeviceCommand) -> Option<&CommandTemplate> {
        self.descriptor.template(command)
    }

    /// Whether a poll is due at `now`, scheduling the next one if so
    pub(crate) fn poll_due(&mut self, now: Instant) -> bool {
        if self.descriptor.command_state.is_none() {
            return false;
        }
        if self.next_poll.is_some_and(|at| now < at) {
            return false;
        }
        self.next_poll = Some(now + self.descriptor.update_interval);
        true
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("binary", &self.binary)
            .field("mode", &self.mode())
            .field("numeric", &self.numeric)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
