//! Outgoing commands and their templates

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Payload to transmit plus the ack expected back
///
/// An empty `ack` means the command completes as soon as it has been sent.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Command {
    pub data: Bytes,
    pub ack: Bytes,
}

impl Command {
    /// Create a command without ack
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ack: Bytes::new(),
        }
    }

    /// Expect `ack` after transmission
    pub fn with_ack(mut self, ack: impl Into<Bytes>) -> Self {
        self.ack = ack.into();
        self
    }

    pub fn has_ack(&self) -> bool {
        !self.ack.is_empty()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("data", &hex::encode_upper(&self.data))
            .field("ack", &hex::encode_upper(&self.ack))
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.data))?;
        if self.has_ack() {
            write!(f, " (ack {})", hex::encode_upper(&self.ack))?;
        }
        Ok(())
    }
}

/// Values a dynamic template is resolved with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandInput {
    /// Current measured or requested value (e.g. a target temperature)
    pub value: Option<f64>,

    /// Positional arguments of the triggering action
    pub args: Vec<f64>,
}

impl CommandInput {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            args: Vec::new(),
        }
    }

    pub fn args(args: impl Into<Vec<f64>>) -> Self {
        Self {
            value: None,
            args: args.into(),
        }
    }
}

/// User function producing a command
pub type CommandFn = Arc<dyn Fn(&CommandInput) -> Command + Send + Sync>;

/// Static command or a function building one on demand
#[derive(Clone)]
pub enum CommandTemplate {
    Static(Command),
    Dynamic(CommandFn),
}

impl CommandTemplate {
    /// Wrap a user function
    pub fn dynamic(f: impl Fn(&CommandInput) -> Command + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Produce the command to enqueue
    pub fn resolve(&self, input: &CommandInput) -> Command {
        match self {
            Self::Static(command) => command.clone(),
            Self::Dynamic(f) => f(input),
        }
    }
}

impl From<Command> for CommandTemplate {
    fn from(command: Command) -> Self {
        Self::Static(command)
    }
}

impl fmt::Debug for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(command) => f.debug_tuple("Static").field(command).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(command) => write!(f, "{}", command),
            Self::Dynamic(_) => f.write_str("<lambda>"),
        }
    }
}
