//! Command/ack sequencing on the shared line
//!
//! One write is in flight at a time. Each write goes through:
//!
//! ```text
//! IDLE ─▶ SENDING ─▶ AWAITING_ACK ─┬─▶ ACKED ─▶ IDLE
//!            ▲                     ├─▶ RETRY ─▶ SENDING
//!            └─────────────────────┘
//!                                  └─▶ FAILED ─▶ IDLE
//! ```
//!
//! Nothing here blocks: waits are deadlines checked by `poll`, which the bus
//! calls on every tick with the current time.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{
    constants::{DEFAULT_RX_WAIT_MS, DEFAULT_TX_RETRY_COUNT},
    line::{Direction, Line},
    pattern::BytePattern,
};

/// Identifier handed out for every enqueued write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(pub u64);

impl fmt::Display for WriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timing and retry settings
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// How long to wait for an ack
    pub rx_wait: Duration,

    /// Quiet time holding the line after each transmission
    pub tx_wait: Option<Duration>,

    /// Minimum spacing between the end of one transmission and the next
    pub tx_interval: Option<Duration>,

    /// Retransmissions after the first attempt
    pub retries: u8,

    /// Drive the transceiver direction around each transmission
    pub direction_control: bool,

    /// Frame that opens a transmit slot for the next write
    pub state_response: Option<BytePattern>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rx_wait: Duration::from_millis(DEFAULT_RX_WAIT_MS),
            tx_wait: None,
            tx_interval: None,
            retries: DEFAULT_TX_RETRY_COUNT,
            direction_control: false,
            state_response: None,
        }
    }
}

/// Externally visible sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Nothing in flight
    Idle,

    /// Frame written, line still held for the turnaround delay
    Sending,

    /// Waiting for the ack frame
    AwaitingAck,

    /// Ack timed out, waiting for the spacing before retransmitting
    Retry,
}

/// Outcome notifications produced by `poll` and `on_frame`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    Sent { id: WriteId, attempt: u32 },
    AckTimeout { id: WriteId, attempt: u32 },
    Acked { id: WriteId, attempts: u32 },
    Failed { id: WriteId, attempts: u32 },
}

#[derive(Debug)]
struct PendingWrite {
    id: WriteId,
    frame: Bytes,
    ack: Option<BytePattern>,
    retries_remaining: u8,
    attempts: u32,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Sending { write: PendingWrite, release_at: Instant },
    AwaitingAck { write: PendingWrite, deadline: Instant },
    Retry { write: PendingWrite },
}

/// Write queue and in-flight state machine for one line
#[derive(Debug)]
pub struct Sequencer {
    config: SequencerConfig,
    queue: VecDeque<PendingWrite>,
    phase: Phase,
    next_id: u64,
    last_release: Option<Instant>,
    slot_open: bool,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            phase: Phase::Idle,
            next_id: 1,
            last_release: None,
            slot_open: false,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Queue a framed write; `ack` is matched against received frames
    pub fn enqueue(&mut self, frame: Bytes, ack: Option<BytePattern>) -> WriteId {
        let id = WriteId(self.next_id);
        self.next_id += 1;

        trace!(%id, frame = %hex::encode_upper(&frame), "Write queued");

        self.queue.push_back(PendingWrite {
            id,
            frame,
            ack,
            retries_remaining: self.config.retries,
            attempts: 0,
        });
        id
    }

    /// Drop a write that has not started transmitting
    ///
    /// Returns `false` if the write is unknown, finished or already in flight.
    pub fn cancel(&mut self, id: WriteId) -> bool {
        match self.queue.iter().position(|w| w.id == id) {
            Some(pos) => {
                self.queue.remove(pos);
                debug!(%id, "Write cancelled");
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> SequencerState {
        match self.phase {
            Phase::Idle => SequencerState::Idle,
            Phase::Sending { .. } => SequencerState::Sending,
            Phase::AwaitingAck { .. } => SequencerState::AwaitingAck,
            Phase::Retry { .. } => SequencerState::Retry,
        }
    }

    /// Writes waiting behind the one in flight
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> Option<WriteId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Sending { write, .. }
            | Phase::AwaitingAck { write, .. }
            | Phase::Retry { write } => Some(write.id),
        }
    }

    /// Whether `id` is still queued or in flight
    pub fn is_pending(&self, id: WriteId) -> bool {
        self.in_flight() == Some(id) || self.queue.iter().any(|w| w.id == id)
    }

    /// No write in flight and none queued
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle) && self.queue.is_empty()
    }

    /// Offer a received frame: opens the response slot and resolves a pending ack
    pub fn on_frame(&mut self, frame: &[u8]) -> Option<SequencerEvent> {
        if let Some(pattern) = &self.config.state_response {
            if pattern.matches(frame) {
                trace!("State response seen, transmit slot open");
                self.slot_open = true;
            }
        }

        let acked = matches!(
            &self.phase,
            Phase::AwaitingAck { write, .. }
                if write.ack.as_ref().is_some_and(|ack| ack.matches(frame))
        );
        if !acked {
            return None;
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::AwaitingAck { write, .. } => {
                debug!(id = %write.id, attempts = write.attempts, "Write acked");
                Some(SequencerEvent::Acked {
                    id: write.id,
                    attempts: write.attempts,
                })
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// Advance the state machine to `now`, driving `line` as needed
    pub fn poll(&mut self, now: Instant, line: &mut dyn Line) -> Vec<SequencerEvent> {
        let mut events = Vec::new();

        loop {
            let phase = std::mem::replace(&mut self.phase, Phase::Idle);
            let (next, progressed) = match phase {
                Phase::Idle => {
                    if !self.spacing_elapsed(now) || !self.slot_ready() {
                        (Phase::Idle, false)
                    } else {
                        match self.queue.pop_front() {
                            Some(write) => {
                                self.slot_open = false;
                                (self.begin_attempt(write, now, line, &mut events), true)
                            }
                            None => (Phase::Idle, false),
                        }
                    }
                }

                Phase::Sending { write, release_at } => {
                    if now >= release_at {
                        (self.release(write, now, line, &mut events), true)
                    } else {
                        (Phase::Sending { write, release_at }, false)
                    }
                }

                Phase::AwaitingAck { write, deadline } => {
                    if now >= deadline {
                        debug!(id = %write.id, attempt = write.attempts, "Ack timeout");
                        events.push(SequencerEvent::AckTimeout {
                            id: write.id,
                            attempt: write.attempts,
                        });
                        (self.attempt_failed(write, &mut events), true)
                    } else {
                        (Phase::AwaitingAck { write, deadline }, false)
                    }
                }

                Phase::Retry { write } => {
                    if self.spacing_elapsed(now) {
                        (self.begin_attempt(write, now, line, &mut events), true)
                    } else {
                        (Phase::Retry { write }, false)
                    }
                }
            };

            self.phase = next;
            if !progressed {
                break;
            }
        }

        events
    }

    fn spacing_elapsed(&self, now: Instant) -> bool {
        match (self.config.tx_interval, self.last_release) {
            (Some(interval), Some(last)) => now >= last + interval,
            _ => true,
        }
    }

    fn slot_ready(&self) -> bool {
        self.config.state_response.is_none() || self.slot_open
    }

    fn begin_attempt(
        &mut self,
        mut write: PendingWrite,
        now: Instant,
        line: &mut dyn Line,
        events: &mut Vec<SequencerEvent>,
    ) -> Phase {
        write.attempts += 1;

        if self.config.direction_control {
            if let Err(e) = line.set_direction(Direction::Transmit) {
                warn!(id = %write.id, "Failed to assert direction: {}", e);
            }
        }

        if let Err(e) = line.transmit(&write.frame) {
            warn!(id = %write.id, attempt = write.attempts, "Transmit failed: {}", e);
            self.release_line(now, line);
            return self.attempt_failed(write, events);
        }

        trace!(
            id = %write.id,
            attempt = write.attempts,
            frame = %hex::encode_upper(&write.frame),
            "Frame sent"
        );
        events.push(SequencerEvent::Sent {
            id: write.id,
            attempt: write.attempts,
        });

        let release_at = now + self.config.tx_wait.unwrap_or(Duration::ZERO);
        Phase::Sending { write, release_at }
    }

    fn release(
        &mut self,
        write: PendingWrite,
        now: Instant,
        line: &mut dyn Line,
        events: &mut Vec<SequencerEvent>,
    ) -> Phase {
        self.release_line(now, line);

        if write.ack.is_none() {
            debug!(id = %write.id, "Write done (no ack expected)");
            events.push(SequencerEvent::Acked {
                id: write.id,
                attempts: write.attempts,
            });
            return Phase::Idle;
        }

        Phase::AwaitingAck {
            write,
            deadline: now + self.config.rx_wait,
        }
    }

    fn release_line(&mut self, now: Instant, line: &mut dyn Line) {
        if self.config.direction_control {
            if let Err(e) = line.set_direction(Direction::Receive) {
                warn!("Failed to release direction: {}", e);
            }
        }
        self.last_release = Some(now);
    }

    fn attempt_failed(&mut self, mut write: PendingWrite, events: &mut Vec<SequencerEvent>) -> Phase {
        if write.retries_remaining > 0 {
            write.retries_remaining -= 1;
            debug!(
                id = %write.id,
                retries_remaining = write.retries_remaining,
                "Retrying write"
            );
            return Phase::Retry { write };
        }

        warn!(
            id = %write.id,
            attempts = write.attempts,
            frame = %hex::encode_upper(&write.frame),
            "Write failed: retries exhausted"
        );
        events.push(SequencerEvent::Failed {
            id: write.id,
            attempts: write.attempts,
        });
        Phase::Idle
    }
}
