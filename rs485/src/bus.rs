//! The bus: one line, its devices and its write queue
//!
//! [`Bus::tick`] is the whole protocol step: read what the driver buffered,
//! cut it into frames, feed each frame to the monitor, the pending ack and
//! the devices, queue due polls, then let the sequencer transmit. It takes
//! the current time as an argument and never blocks, so it can be driven by
//! hand in tests or by [`Bus::start`] on a tokio interval.

use std::collections::HashMap;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use rs485_core::{
    BytePattern, Command, CommandInput, CommandTemplate, FrameAssembler, FrameBuilder,
    PacketMonitor, Sequencer, SequencerEvent, WriteId,
};
use rs485_transport::Driver;
use rs485_types::{PacketRecord, StateValue};

use crate::{
    config::BusConfig,
    device::{DeviceCommand, DeviceDescriptor, DeviceId, StateListener},
    error::{Error, Result},
    handle::{BusHandle, Request},
    registry::Registry,
};

/// Capacity of the request channel
const REQUEST_QUEUE: usize = 64;

/// Capacity of the event channel before slow subscribers lag
const EVENT_QUEUE: usize = 256;

/// What happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A device's observed state changed
    StateChanged { device: DeviceId, value: StateValue },

    /// A frame passed the packet monitor
    Monitor(PacketRecord),

    /// A write went on the wire
    WriteSent { id: WriteId, attempt: u32 },

    /// No ack in time for an attempt
    AckTimeout { id: WriteId, attempt: u32 },

    /// A write completed
    WriteAcked { id: WriteId, attempts: u32 },

    /// A write was dropped after its last retry
    WriteFailed { id: WriteId, attempts: u32 },
}

impl From<SequencerEvent> for BusEvent {
    fn from(event: SequencerEvent) -> Self {
        match event {
            SequencerEvent::Sent { id, attempt } => Self::WriteSent { id, attempt },
            SequencerEvent::AckTimeout { id, attempt } => Self::AckTimeout { id, attempt },
            SequencerEvent::Acked { id, attempts } => Self::WriteAcked { id, attempts },
            SequencerEvent::Failed { id, attempts } => Self::WriteFailed { id, attempts },
        }
    }
}

/// Traffic counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub frames_received: u64,
    pub frames_dispatched: u64,
    pub monitor_hits: u64,
    pub noise_bytes: u64,
    pub checksum_failures: u64,
    pub transmissions: u64,
    pub ack_timeouts: u64,
    pub writes_acked: u64,
    pub writes_failed: u64,
    pub driver_errors: u64,
}

/// A shared line with its devices
pub struct Bus<D> {
    config: BusConfig,
    driver: D,
    frames: FrameBuilder,
    assembler: FrameAssembler,
    monitor: Option<PacketMonitor>,
    sequencer: Sequencer,
    registry: Registry,
    polls: HashMap<DeviceId, WriteId>,
    rx_buf: BytesMut,
    stats: BusStats,
}

impl<D: Driver> Bus<D> {
    /// Validate `config` and attach it to `driver`
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn new(config: BusConfig, driver: D) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            frames: config.frame_builder(),
            assembler: config.assembler(),
            monitor: config.monitor(),
            sequencer: Sequencer::new(config.sequencer()),
            registry: Registry::new(),
            polls: HashMap::new(),
            rx_buf: BytesMut::with_capacity(1024),
            stats: BusStats::default(),
            driver,
            config,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Writes queued or in flight
    pub fn pending_writes(&self) -> usize {
        self.sequencer.queued() + usize::from(self.sequencer.in_flight().is_some())
    }

    /// Add a device; frames are offered to devices in registration order
    pub fn register(&mut self, descriptor: DeviceDescriptor) -> Result<DeviceId> {
        let id = self.registry.register(descriptor)?;
        debug!(device = %id, "Device registered");
        Ok(id)
    }

    /// Subscribe `listener` to state changes of `device`
    pub fn register_listener(
        &mut self,
        device: DeviceId,
        listener: impl StateListener + 'static,
    ) -> Result<()> {
        self.registry.add_listener(device, Box::new(listener))
    }

    /// Add a packet monitor filter, enabling the monitor if needed
    pub fn add_monitor_filter(&mut self, pattern: BytePattern) -> Result<usize> {
        pattern.validate()?;
        Ok(self
            .monitor
            .get_or_insert_with(PacketMonitor::new)
            .add_filter(pattern))
    }

    /// Queue a raw command
    pub fn write(&mut self, command: Command) -> WriteId {
        let frame = self.frames.build(&command.data);
        let ack = command
            .has_ack()
            .then(|| BytePattern::new(self.frames.prefix().len(), command.ack.clone()));

        let id = self.sequencer.enqueue(frame, ack);
        debug!(%id, command = %command, "Write submitted");
        id
    }

    /// Resolve `template` now and queue the result
    pub fn write_template(&mut self, template: &CommandTemplate, input: &CommandInput) -> WriteId {
        self.write(template.resolve(input))
    }

    /// Queue one of a device's commands
    pub fn command(&mut self, device: DeviceId, command: DeviceCommand) -> Result<WriteId> {
        let target = self.registry.get(device)?;
        let resolved = target
            .template(&command)
            .map(|template| template.resolve(&command.input()))
            .ok_or_else(|| Error::UnsupportedCommand {
                device: target.name().to_string(),
                command: command.to_string(),
            })?;

        Ok(self.write(resolved))
    }

    /// Drop a write that has not started
    pub fn cancel(&mut self, id: WriteId) -> bool {
        self.sequencer.cancel(id)
    }

    /// Run one protocol step at `now`
    pub fn tick(&mut self, now: Instant) -> Vec<BusEvent> {
        let mut events = Vec::new();

        match self.driver.read_available(&mut self.rx_buf) {
            Ok(0) => {}
            Ok(n) => trace!(bytes = n, "RX"),
            Err(e) => {
                self.stats.driver_errors += 1;
                warn!(driver = %self.driver.name(), "Read failed: {}", e);
            }
        }

        let received = self.rx_buf.split();
        for frame in self.assembler.push(&received, now) {
            self.handle_frame(frame, &mut events);
        }
        self.stats.noise_bytes += self.assembler.take_discarded();

        for device in self.registry.due_polls(now) {
            // At most one poll per device in the queue
            if self
                .polls
                .get(&device)
                .is_some_and(|&id| self.sequencer.is_pending(id))
            {
                debug!(%device, "Previous poll still pending");
                continue;
            }
            match self.command(device, DeviceCommand::State) {
                Ok(id) => {
                    self.polls.insert(device, id);
                }
                Err(e) => warn!(%device, "Poll failed: {}", e),
            }
        }

        for event in self.sequencer.poll(now, &mut self.driver) {
            self.record(&event);
            events.push(event.into());
        }

        events
    }

    fn handle_frame(&mut self, frame: Bytes, events: &mut Vec<BusEvent>) {
        self.stats.frames_received += 1;
        trace!(frame = %hex::encode_upper(&frame), "Frame received");

        // The monitor also sees frames about to be dropped
        if let Some(filters) = self.monitor.as_ref().and_then(|m| m.inspect(&frame)) {
            self.stats.monitor_hits += 1;
            let record = PacketRecord::new(frame.to_vec(), filters);
            info!(target: "rs485::monitor", "{}", record);
            events.push(BusEvent::Monitor(record));
        }

        if self.config.rx_checksum && !self.frames.checksum().is_empty() && !self.frames.verify(&frame) {
            self.stats.checksum_failures += 1;
            warn!(frame = %hex::encode_upper(&frame), "Checksum mismatch, frame dropped");
            return;
        }

        if let Some(event) = self.sequencer.on_frame(&frame) {
            self.record(&event);
            events.push(event.into());
        }

        let dispatch = self.registry.dispatch(&frame);
        if !dispatch.claimed.is_empty() {
            self.stats.frames_dispatched += 1;
        }
        events.extend(
            dispatch
                .changes
                .into_iter()
                .map(|(device, value)| BusEvent::StateChanged { device, value }),
        );
    }

    fn record(&mut self, event: &SequencerEvent) {
        match event {
            SequencerEvent::Sent { .. } => self.stats.transmissions += 1,
            SequencerEvent::AckTimeout { .. } => self.stats.ack_timeouts += 1,
            SequencerEvent::Acked { .. } => self.stats.writes_acked += 1,
            SequencerEvent::Failed { .. } => self.stats.writes_failed += 1,
        }
    }

    /// Dump the configuration and devices at `info`
    pub fn log_config(&self) {
        let config = &self.config;
        info!("RS485 bus on {}", self.driver.name());
        info!("  Line: {}", config.serial);
        info!("  RX wait: {:?}", config.rx_wait);
        if let Some(tx_wait) = config.tx_wait {
            info!("  TX wait: {:?}", tx_wait);
        }
        if let Some(tx_interval) = config.tx_interval {
            info!("  TX interval: {:?}", tx_interval);
        }
        info!("  TX retries: {}", self.sequencer.config().retries);
        info!("  Direction control: {}", config.ctrl_pin);
        info!("  Frame gap: {:?}", self.assembler.gap());
        if !config.prefix.is_empty() {
            info!("  Prefix: {}", hex::encode_upper(&config.prefix));
        }
        if !config.suffix.is_empty() {
            info!("  Suffix: {}", hex::encode_upper(&config.suffix));
        }
        info!(
            "  Checksum: {} / {}",
            config.checksum.name(),
            config.checksum2.name()
        );
        if let Some(pattern) = &config.state_response {
            info!("  State response: {}", pattern);
        }
        if let Some(monitor) = &self.monitor {
            info!("  Packet monitor: {} filter(s)", monitor.filters().len());
            for (idx, filter) in monitor.filters().iter().enumerate() {
                info!("    [{}] {}", idx, filter);
            }
        }

        for device in self.registry.iter() {
            let desc = device.descriptor();
            info!("  Device '{}' ({}): {}", desc.name, device.id(), desc.device);
            if let Some(sub) = &desc.sub_device {
                info!("    Sub device: {}", sub);
            }
            if let Some(on) = &desc.state_on {
                info!("    State ON: {}", on);
            }
            if let Some(off) = &desc.state_off {
                info!("    State OFF: {}", off);
            }
            for (name, pattern) in &desc.states {
                info!("    State '{}': {}", name, pattern);
            }
            for (name, decoder) in &desc.numeric {
                info!("    Numeric '{}': {:?}", name, decoder);
            }
            if let Some(cmd) = &desc.command_on {
                info!("    Command ON: {}", cmd);
            }
            if let Some(cmd) = &desc.command_off {
                info!("    Command OFF: {}", cmd);
            }
            for (name, cmd) in &desc.commands {
                info!("    Command '{}': {}", name, cmd);
            }
            if let Some(cmd) = &desc.command_state {
                info!("    Command state: {} every {:?}", cmd, desc.update_interval);
            }
        }
    }
}

impl<D: Driver + 'static> Bus<D> {
    /// Move the bus onto a tokio task ticking every `tick_interval`
    ///
    /// Must be called from within a tokio runtime. Devices can no longer be
    /// registered once the bus runs.
    pub fn start(self) -> (BusHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let (event_tx, _) = broadcast::channel(EVENT_QUEUE);

        let handle = BusHandle::new(request_tx, event_tx.clone());
        let task = tokio::spawn(self.run(request_rx, event_tx));

        (handle, task)
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>, events: broadcast::Sender<BusEvent>) {
        self.log_config();

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut waiters: HashMap<WriteId, oneshot::Sender<Result<u32>>> = HashMap::new();

        info!("Bus started on {}", self.driver.name());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    for event in self.tick(now) {
                        match &event {
                            BusEvent::WriteAcked { id, attempts } => {
                                if let Some(waiter) = waiters.remove(id) {
                                    let _ = waiter.send(Ok(*attempts));
                                }
                            }
                            BusEvent::WriteFailed { id, attempts } => {
                                if let Some(waiter) = waiters.remove(id) {
                                    let _ = waiter.send(Err(rs485_core::Error::RetriesExhausted {
                                        id: id.0,
                                        attempts: *attempts,
                                    }
                                    .into()));
                                }
                            }
                            _ => {}
                        }
                        // No subscribers is fine
                        let _ = events.send(event);
                    }
                }

                request = requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request, &mut waiters),
                },
            }
        }

        info!("Bus stopped ({} write(s) abandoned)", waiters.len() + self.sequencer.queued());
    }

    fn handle_request(
        &mut self,
        request: Request,
        waiters: &mut HashMap<WriteId, oneshot::Sender<Result<u32>>>,
    ) {
        match request {
            Request::Write {
                template,
                input,
                reply,
                outcome,
            } => {
                let id = self.write_template(&template, &input);
                if let Some(outcome) = outcome {
                    waiters.insert(id, outcome);
                }
                let _ = reply.send(id);
            }
            Request::Command { device, command, reply } => {
                let _ = reply.send(self.command(device, command));
            }
            Request::Cancel { id, reply } => {
                let cancelled = self.cancel(id);
                if cancelled {
                    if let Some(waiter) = waiters.remove(&id) {
                        let _ = waiter.send(Err(Error::Cancelled(id)));
                    }
                }
                let _ = reply.send(cancelled);
            }
            Request::Stats { reply } => {
                let _ = reply.send(self.stats.clone());
            }
            Request::Shutdown => {}
        }
    }
}

impl<D> std::fmt::Debug for Bus<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("frames", &self.frames)
            .field("sequencer", &self.sequencer.state())
            .field("devices", &self.registry.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use mockall::{mock, predicate::eq};
    use pretty_assertions::assert_eq;
    use rs485_core::{Checksum, Direction, Line, NumericSpec};
    use rs485_transport::MemoryDriver;

    mock! {
        pub Port {}

        impl Line for Port {
            fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;
            fn set_direction(&mut self, direction: Direction) -> io::Result<()>;
        }

        impl Driver for Port {
            fn read_available(&mut self, buf: &mut BytesMut) -> rs485_transport::Result<usize>;
            fn name(&self) -> String;
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn light() -> DeviceDescriptor {
        DeviceDescriptor::new("light", BytePattern::exact(vec![0x0E, 0x1F]))
            .with_state_on(BytePattern::new(2, vec![0x01]))
            .with_state_off(BytePattern::new(2, vec![0x00]))
            .with_command_on(Command::new(vec![0x0E, 0x1F, 0x01]).with_ack(vec![0x0E, 0x9F]))
            .with_command_off(Command::new(vec![0x0E, 0x1F, 0x00]).with_ack(vec![0x0E, 0x9F]))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BusConfig::new(9600).with_tx_retry_count(0);
        assert!(Bus::new(config, MemoryDriver::new()).is_err());
    }

    #[test]
    fn test_write_builds_frame() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let config = BusConfig::new(9600)
            .with_prefix(vec![0xF7])
            .with_suffix(vec![0xEE])
            .with_checksum(Checksum::Xor);
        let mut bus = Bus::new(config, driver).unwrap();

        let id = bus.write(Command::new(vec![0x01, 0x02]));
        let events = bus.tick(t0);

        assert_eq!(peer.transmitted(), vec![vec![0xF7, 0x01, 0x02, 0xF7 ^ 0x01 ^ 0x02, 0xEE]]);
        assert_eq!(
            events,
            vec![
                BusEvent::WriteSent { id, attempt: 1 },
                BusEvent::WriteAcked { id, attempts: 1 },
            ]
        );
    }

    #[test]
    fn test_ack_after_prefix() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let config = BusConfig::new(9600).with_prefix(vec![0xF7]).with_suffix(vec![0xEE]);
        let mut bus = Bus::new(config, driver).unwrap();

        let id = bus.write(Command::new(vec![0x01]).with_ack(vec![0x81]));
        bus.tick(t0);

        // Same bytes at the wrong offset are not the ack
        peer.inject(&[0xF7, 0x00, 0x81, 0xEE]);
        let events = bus.tick(t0 + ms(1));
        assert!(!events.iter().any(|e| matches!(e, BusEvent::WriteAcked { .. })));

        peer.inject(&[0xF7, 0x81, 0xEE]);
        let events = bus.tick(t0 + ms(2));
        assert!(events.contains(&BusEvent::WriteAcked { id, attempts: 1 }));
        assert_eq!(peer.transmitted().len(), 1);
    }

    #[test]
    fn test_command_unknown_and_unsupported() {
        let mut bus = Bus::new(BusConfig::default(), MemoryDriver::new()).unwrap();
        let light = bus.register(light()).unwrap();

        assert!(matches!(
            bus.command(DeviceId(9), DeviceCommand::On),
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            bus.command(light, DeviceCommand::named("dim")),
            Err(Error::UnsupportedCommand { .. })
        ));
        assert!(bus.command(light, DeviceCommand::On).is_ok());
    }

    #[test]
    fn test_dynamic_named_command() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default(), driver).unwrap();

        let thermostat = bus
            .register(
                DeviceDescriptor::new("thermostat", BytePattern::exact(vec![0x0E, 0x20]))
                    .with_numeric("target", NumericSpec::new(2, 1, 0).unwrap())
                    .with_command(
                        "temperature",
                        CommandTemplate::dynamic(|input| {
                            Command::new(vec![0x0E, 0x20, input.value.unwrap_or(0.0) as u8])
                        }),
                    ),
            )
            .unwrap();

        bus.command(
            thermostat,
            DeviceCommand::named_with("temperature", CommandInput::value(23.0)),
        )
        .unwrap();
        bus.tick(t0);

        assert_eq!(peer.transmitted(), vec![vec![0x0E, 0x20, 23]]);
    }

    #[test]
    fn test_state_dispatch_and_listener() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default().with_frame_gap(ms(2)), driver).unwrap();
        let light = bus.register(light()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.register_listener(light, move |name: &str, value: &StateValue| {
            sink.lock().unwrap().push(format!("{} {}", name, value));
        })
        .unwrap();

        peer.inject(&[0x0E, 0x1F, 0x01]);
        bus.tick(t0);
        let events = bus.tick(t0 + ms(2));

        assert_eq!(
            events,
            vec![BusEvent::StateChanged {
                device: light,
                value: StateValue::Binary(true)
            }]
        );
        assert_eq!(*seen.lock().unwrap(), vec!["light ON".to_string()]);
        assert_eq!(bus.registry().get(light).unwrap().binary_state(), Some(true));
        assert_eq!(bus.stats().frames_dispatched, 1);
    }

    #[test]
    fn test_polling_on_first_tick() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default(), driver).unwrap();
        bus.register(
            light()
                .with_command_state(Command::new(vec![0x0E, 0x1F, 0xFF]))
                .with_update_interval(Duration::from_secs(30)),
        )
        .unwrap();

        bus.tick(t0);
        bus.tick(t0 + Duration::from_secs(10));
        assert_eq!(peer.transmitted(), vec![vec![0x0E, 0x1F, 0xFF]]);

        bus.tick(t0 + Duration::from_secs(30));
        assert_eq!(peer.transmitted().len(), 2);
    }

    #[test]
    fn test_rx_checksum_drops_bad_frames() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let config = BusConfig::default()
            .with_suffix(vec![0xEE])
            .with_checksum(Checksum::Add)
            .with_rx_checksum(true)
            .with_frame_gap(ms(2));
        let mut bus = Bus::new(config, driver).unwrap();
        bus.register(light()).unwrap();

        // A suffix after a bad checksum does not end the frame, the gap does
        peer.inject(&[0x0E, 0x1F, 0x01, 0x00, 0xEE]);
        assert!(bus.tick(t0).is_empty());
        assert_eq!(bus.stats().frames_received, 0);

        assert!(bus.tick(t0 + ms(2)).is_empty());
        assert_eq!(bus.stats().checksum_failures, 1);

        let sum = 0x0Eu8.wrapping_add(0x1F).wrapping_add(0x01);
        peer.inject(&[0x0E, 0x1F, 0x01, sum, 0xEE]);
        let events = bus.tick(t0 + ms(3));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_monitor_sees_bad_checksum_frames() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let config = BusConfig::default()
            .with_suffix(vec![0xEE])
            .with_checksum(Checksum::Xor)
            .with_rx_checksum(true)
            .with_packet_monitor([BytePattern::exact(vec![0x0E])])
            .with_frame_gap(ms(2));
        let mut bus = Bus::new(config, driver).unwrap();
        bus.register(light()).unwrap();

        peer.inject(&[0x0E, 0x1F, 0x01, 0x00, 0xEE]);
        bus.tick(t0);
        let events = bus.tick(t0 + ms(2));

        assert_eq!(events.len(), 1);
        match &events[0] {
            BusEvent::Monitor(record) => assert_eq!(record.data, vec![0x0E, 0x1F, 0x01, 0x00, 0xEE]),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(bus.stats().checksum_failures, 1);
        assert_eq!(bus.stats().monitor_hits, 1);
        assert_eq!(bus.registry().get(DeviceId(0)).unwrap().binary_state(), None);
    }

    #[test]
    fn test_poll_not_requeued_while_pending() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let config = BusConfig::default()
            .with_frame_gap(ms(2))
            .with_state_response(BytePattern::exact(vec![0x0E, 0x1F]));
        let mut bus = Bus::new(config, driver).unwrap();
        bus.register(
            light()
                .with_command_state(Command::new(vec![0x0E, 0x1F, 0xFF]))
                .with_update_interval(Duration::from_secs(10)),
        )
        .unwrap();

        // Silent bus: the slot never opens
        for step in 0..5 {
            bus.tick(t0 + Duration::from_secs(step * 10));
        }
        assert_eq!(bus.pending_writes(), 1);
        assert!(peer.transmitted().is_empty());

        let t1 = t0 + Duration::from_secs(45);
        peer.inject(&[0x0E, 0x1F, 0x01]);
        bus.tick(t1);
        bus.tick(t1 + ms(2));
        assert_eq!(peer.transmitted(), vec![vec![0x0E, 0x1F, 0xFF]]);
        assert_eq!(bus.pending_writes(), 0);

        bus.tick(t0 + Duration::from_secs(50));
        assert_eq!(bus.pending_writes(), 1);
    }

    #[test]
    fn test_named_state_event() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default().with_frame_gap(ms(2)), driver).unwrap();
        let fan = bus
            .register(
                DeviceDescriptor::new("fan", BytePattern::exact(vec![0x0E, 0x2B]))
                    .with_state("low", BytePattern::new(2, vec![0x01]))
                    .with_state("high", BytePattern::new(2, vec![0x03])),
            )
            .unwrap();

        peer.inject(&[0x0E, 0x2B, 0x03]);
        bus.tick(t0);
        let events = bus.tick(t0 + ms(2));

        assert_eq!(
            events,
            vec![BusEvent::StateChanged {
                device: fan,
                value: StateValue::Mode("high".into())
            }]
        );
        assert_eq!(bus.registry().get(fan).unwrap().mode(), Some("high"));
    }

    #[test]
    fn test_monitor_filter_added_at_runtime() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default().with_suffix(vec![0xEE]), driver).unwrap();

        assert_eq!(bus.add_monitor_filter(BytePattern::exact(vec![0x30])).unwrap(), 0);
        assert!(bus.add_monitor_filter(BytePattern::new(200, vec![0x30])).is_err());

        peer.inject(&[0x30, 0x01, 0xEE, 0x31, 0x01, 0xEE]);
        let events = bus.tick(t0);

        assert_eq!(events.len(), 1);
        match &events[0] {
            BusEvent::Monitor(record) => {
                assert_eq!(record.data, vec![0x30, 0x01, 0xEE]);
                assert_eq!(record.filters, vec![0]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(bus.stats().monitor_hits, 1);
    }

    #[test]
    fn test_driver_errors_keep_bus_running() {
        let t0 = Instant::now();
        let mut port = MockPort::new();
        port.expect_name().return_const("mock".to_string());
        let mut reads = 0;
        port.expect_read_available().returning(move |_| {
            reads += 1;
            if reads == 1 {
                Err(rs485_transport::Error::ConnectionClosed)
            } else {
                Ok(0)
            }
        });
        port.expect_transmit().times(1).returning(|frame| {
            assert_eq!(frame, &[0x01]);
            Ok(())
        });

        let mut bus = Bus::new(BusConfig::default(), port).unwrap();
        let id = bus.write(Command::new(vec![0x01]));

        let events = bus.tick(t0);
        assert_eq!(bus.stats().driver_errors, 1);
        assert!(events.contains(&BusEvent::WriteAcked { id, attempts: 1 }));

        assert!(bus.tick(t0 + ms(1)).is_empty());
    }

    #[test]
    fn test_transmit_error_retries() {
        let t0 = Instant::now();
        let mut port = MockPort::new();
        port.expect_name().return_const("mock".to_string());
        port.expect_read_available().returning(|_| Ok(0));
        let mut calls = 0;
        port.expect_transmit().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(io::Error::new(io::ErrorKind::TimedOut, "busy"))
            } else {
                Ok(())
            }
        });

        let mut bus = Bus::new(BusConfig::default(), port).unwrap();
        let id = bus.write(Command::new(vec![0x01]));

        let events = bus.tick(t0);
        assert!(events.contains(&BusEvent::WriteAcked { id, attempts: 2 }));
        assert_eq!(bus.stats().transmissions, 1);
    }

    #[test]
    fn test_direction_control() {
        let t0 = Instant::now();
        let mut port = MockPort::new();
        let mut seq = mockall::Sequence::new();
        port.expect_name().return_const("mock".to_string());
        port.expect_read_available().returning(|_| Ok(0));
        port.expect_set_direction()
            .with(eq(Direction::Transmit))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        port.expect_transmit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        port.expect_set_direction()
            .with(eq(Direction::Receive))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let config = BusConfig::default()
            .with_ctrl_pin(true)
            .with_tx_wait(ms(3));
        let mut bus = Bus::new(config, port).unwrap();
        bus.write(Command::new(vec![0x01]));

        bus.tick(t0);
        bus.tick(t0 + ms(3));
    }

    #[test]
    fn test_cancel_queued_write() {
        let t0 = Instant::now();
        let driver = MemoryDriver::new();
        let peer = driver.peer();
        let mut bus = Bus::new(BusConfig::default(), driver).unwrap();

        let first = bus.write(Command::new(vec![0x01]).with_ack(vec![0x81]));
        let second = bus.write(Command::new(vec![0x02]));
        bus.tick(t0);

        assert!(!bus.cancel(first));
        assert!(bus.cancel(second));

        for step in 1..100 {
            bus.tick(t0 + ms(step));
        }
        assert_eq!(peer.transmitted(), vec![vec![0x01]; 4]);
    }
}
