//! Async handle to a running bus

use tokio::sync::{broadcast, mpsc, oneshot};

use rs485_core::{Command, CommandInput, CommandTemplate, WriteId};

use crate::{
    bus::{BusEvent, BusStats},
    device::{DeviceCommand, DeviceId},
    error::{Error, Result},
};

pub(crate) enum Request {
    Write {
        template: CommandTemplate,
        input: CommandInput,
        reply: oneshot::Sender<WriteId>,
        outcome: Option<oneshot::Sender<Result<u32>>>,
    },
    Command {
        device: DeviceId,
        command: DeviceCommand,
        reply: oneshot::Sender<Result<WriteId>>,
    },
    Cancel {
        id: WriteId,
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<BusStats>,
    },
    Shutdown,
}

/// Cloneable front end of a bus started with [`Bus::start`](crate::Bus::start)
///
/// # Examples
///
/// ```no_run
/// use rs485::{Bus, BusConfig, Command, MemoryDriver};
///
/// #[tokio::main]
/// async fn main() -> rs485::Result<()> {
///     let bus = Bus::new(BusConfig::new(9600), MemoryDriver::new())?;
///     let (handle, task) = bus.start();
///
///     let attempts = handle
///         .send(Command::new(vec![0x0E, 0x1F, 0x01]).with_ack(vec![0x0E, 0x9F]))
///         .await?;
///     println!("acked after {} attempt(s)", attempts);
///
///     handle.shutdown().await?;
///     let _ = task.await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BusHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<BusEvent>,
}

impl BusHandle {
    pub(crate) fn new(requests: mpsc::Sender<Request>, events: broadcast::Sender<BusEvent>) -> Self {
        Self { requests, events }
    }

    /// Queue a command
    pub async fn write(&self, command: Command) -> Result<WriteId> {
        self.write_template(CommandTemplate::Static(command), CommandInput::default())
            .await
    }

    /// Queue a template, resolved by the bus on arrival
    pub async fn write_template(&self, template: CommandTemplate, input: CommandInput) -> Result<WriteId> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Write {
            template,
            input,
            reply,
            outcome: None,
        })
        .await?;
        rx.await.map_err(|_| Error::BusStopped)
    }

    /// Queue a command and wait until it is acked or fails
    ///
    /// Returns the number of attempts it took.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` when no ack arrived, `Cancelled` if the write was
    /// cancelled before being sent.
    pub async fn send(&self, command: Command) -> Result<u32> {
        let (reply, id_rx) = oneshot::channel();
        let (outcome, outcome_rx) = oneshot::channel();
        self.request(Request::Write {
            template: CommandTemplate::Static(command),
            input: CommandInput::default(),
            reply,
            outcome: Some(outcome),
        })
        .await?;

        id_rx.await.map_err(|_| Error::BusStopped)?;
        outcome_rx.await.map_err(|_| Error::BusStopped)?
    }

    /// Queue one of a device's commands
    pub async fn command(&self, device: DeviceId, command: DeviceCommand) -> Result<WriteId> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Command {
            device,
            command,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::BusStopped)?
    }

    /// Drop a write that has not started; `false` if it already has
    pub async fn cancel(&self, id: WriteId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Cancel { id, reply }).await?;
        rx.await.map_err(|_| Error::BusStopped)
    }

    pub async fn stats(&self) -> Result<BusStats> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Stats { reply }).await?;
        rx.await.map_err(|_| Error::BusStopped)
    }

    /// Receive every event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Stop the bus task; queued writes are abandoned
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Request::Shutdown).await
    }

    async fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::BusStopped)
    }
}
