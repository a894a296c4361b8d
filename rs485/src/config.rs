//! Bus configuration

use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use rs485_core::{
    BytePattern, Checksum, Checksum2, ChecksumEngine, Error as CoreError, FrameAssembler,
    FrameBuilder, PacketMonitor, SequencerConfig,
    constants::{DEFAULT_RX_WAIT_MS, DEFAULT_TICK_INTERVAL_MS, DEFAULT_TX_RETRY_COUNT, limits},
    error::check_range,
    frame_gap,
};
use rs485_types::SerialSettings;

use crate::error::Result;

/// Settings of one shared bus
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rs485::{BusConfig, Checksum};
///
/// let config = BusConfig::new(9600)
///     .with_rx_wait(Duration::from_millis(50))
///     .with_tx_retry_count(5)
///     .with_prefix(vec![0xF7])
///     .with_checksum(Checksum::Xor);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Line settings
    pub serial: SerialSettings,

    /// Ack timeout
    pub rx_wait: Duration,

    /// Line hold time after each transmission
    pub tx_wait: Option<Duration>,

    /// Minimum spacing between transmissions
    pub tx_interval: Option<Duration>,

    /// Retransmissions after the first attempt (3 when unset)
    pub tx_retry_count: Option<u8>,

    /// Drive the transceiver direction around transmissions
    pub ctrl_pin: bool,

    /// Bytes opening every frame
    pub prefix: Bytes,

    /// Bytes closing every frame
    pub suffix: Bytes,

    pub checksum: Checksum,
    pub checksum2: Checksum2,

    /// Frame that must be seen before each new write
    pub state_response: Option<BytePattern>,

    /// Packet monitor filters; `None` disables the monitor
    pub packet_monitor: Option<Vec<BytePattern>>,

    /// Drop received frames whose checksum bytes do not verify
    pub rx_checksum: bool,

    /// Idle time closing a frame (3.5 characters at the baud rate when unset)
    pub frame_gap: Option<Duration>,

    /// Period of the runner's tick
    pub tick_interval: Duration,
}

impl BusConfig {
    /// 8N1 at `baud_rate` with default timing
    pub fn new(baud_rate: u32) -> Self {
        Self {
            serial: SerialSettings::new(baud_rate),
            rx_wait: Duration::from_millis(DEFAULT_RX_WAIT_MS),
            tx_wait: None,
            tx_interval: None,
            tx_retry_count: None,
            ctrl_pin: false,
            prefix: Bytes::new(),
            suffix: Bytes::new(),
            checksum: Checksum::None,
            checksum2: Checksum2::None,
            state_response: None,
            packet_monitor: None,
            rx_checksum: false,
            frame_gap: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }

    pub fn with_serial(mut self, serial: SerialSettings) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_rx_wait(mut self, rx_wait: Duration) -> Self {
        self.rx_wait = rx_wait;
        self
    }

    pub fn with_tx_wait(mut self, tx_wait: Duration) -> Self {
        self.tx_wait = Some(tx_wait);
        self
    }

    pub fn with_tx_interval(mut self, tx_interval: Duration) -> Self {
        self.tx_interval = Some(tx_interval);
        self
    }

    pub fn with_tx_retry_count(mut self, count: u8) -> Self {
        self.tx_retry_count = Some(count);
        self
    }

    pub fn with_ctrl_pin(mut self, enabled: bool) -> Self {
        self.ctrl_pin = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<Bytes>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_checksum2(mut self, checksum2: Checksum2) -> Self {
        self.checksum2 = checksum2;
        self
    }

    /// Install a custom primary checksum function
    #[deprecated(note = "use `with_checksum(Checksum::custom(..))`")]
    pub fn with_checksum_lambda(
        mut self,
        f: impl Fn(&[u8]) -> u8 + Send + Sync + 'static,
    ) -> Self {
        warn!("checksum_lambda is deprecated, use a custom checksum instead");
        self.checksum = Checksum::custom(f);
        self
    }

    pub fn with_state_response(mut self, pattern: BytePattern) -> Self {
        self.state_response = Some(pattern);
        self
    }

    /// Enable the packet monitor; no filters records every frame
    pub fn with_packet_monitor(mut self, filters: impl IntoIterator<Item = BytePattern>) -> Self {
        self.packet_monitor = Some(filters.into_iter().collect());
        self
    }

    pub fn with_rx_checksum(mut self, enabled: bool) -> Self {
        self.rx_checksum = enabled;
        self
    }

    pub fn with_frame_gap(mut self, gap: Duration) -> Self {
        self.frame_gap = Some(gap);
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Check ranges and conflicting options
    ///
    /// # Errors
    ///
    /// Returns the first value out of range or the first conflict found.
    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;

        check_range("rx_wait_ms", millis(self.rx_wait), limits::WAIT_MS)?;
        if let Some(tx_wait) = self.tx_wait {
            check_range("tx_wait_ms", millis(tx_wait), limits::WAIT_MS)?;
        }
        if let Some(tx_interval) = self.tx_interval {
            check_range("tx_interval_ms", millis(tx_interval), limits::WAIT_MS)?;
        }
        if let Some(count) = self.tx_retry_count {
            let (min, max) = limits::TX_RETRY_COUNT;
            check_range("tx_retry_count", count.into(), (min.into(), max.into()))?;
        }

        if self.checksum2.is_enabled() && !self.checksum.is_enabled() {
            return Err(CoreError::ConfigurationConflict(
                "checksum2 requires checksum".into(),
            )
            .into());
        }

        if let Some(pattern) = &self.state_response {
            pattern.validate()?;
        }
        if let Some(filters) = &self.packet_monitor {
            filters.iter().try_for_each(BytePattern::validate)?;
        }

        if self.tick_interval.is_zero() {
            return Err(CoreError::ConfigurationConflict("tick interval must be non-zero".into()).into());
        }

        Ok(())
    }

    pub(crate) fn frame_builder(&self) -> FrameBuilder {
        FrameBuilder::new()
            .with_prefix(self.prefix.clone())
            .with_suffix(self.suffix.clone())
            .with_checksum(self.checksum_engine())
    }

    fn checksum_engine(&self) -> ChecksumEngine {
        ChecksumEngine::new(self.checksum.clone(), self.checksum2.clone())
    }

    pub(crate) fn assembler(&self) -> FrameAssembler {
        let gap = self
            .frame_gap
            .unwrap_or_else(|| frame_gap(self.serial.baud_rate, self.serial.bits_per_char()));
        FrameAssembler::new(gap)
            .with_prefix(self.prefix.clone())
            .with_suffix(self.suffix.clone())
            .with_checksum(self.checksum_engine())
    }

    pub(crate) fn monitor(&self) -> Option<PacketMonitor> {
        self.packet_monitor
            .as_ref()
            .map(|filters| PacketMonitor::with_filters(filters.iter().cloned()))
    }

    pub(crate) fn sequencer(&self) -> SequencerConfig {
        SequencerConfig {
            rx_wait: self.rx_wait,
            tx_wait: self.tx_wait,
            tx_interval: self.tx_interval,
            retries: self.tx_retry_count.unwrap_or(DEFAULT_TX_RETRY_COUNT),
            direction_control: self.ctrl_pin,
            state_response: self.state_response.clone(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(9600)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());

        let seq = config.sequencer();
        assert_eq!(seq.rx_wait, Duration::from_millis(10));
        assert_eq!(seq.retries, 3);
        assert_eq!(seq.tx_wait, None);
        assert!(!seq.direction_control);
        assert!(config.monitor().is_none());
    }

    #[test]
    fn test_wait_ranges() {
        assert!(BusConfig::new(9600).with_rx_wait(Duration::ZERO).validate().is_err());
        assert!(
            BusConfig::new(9600)
                .with_rx_wait(Duration::from_millis(2000))
                .validate()
                .is_ok()
        );
        assert!(
            BusConfig::new(9600)
                .with_tx_interval(Duration::from_millis(2001))
                .validate()
                .is_err()
        );
        assert!(
            BusConfig::new(9600)
                .with_tx_wait(Duration::from_micros(500))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_retry_count_range() {
        assert!(BusConfig::new(9600).with_tx_retry_count(0).validate().is_err());
        assert!(BusConfig::new(9600).with_tx_retry_count(10).validate().is_ok());
        assert!(BusConfig::new(9600).with_tx_retry_count(11).validate().is_err());
    }

    #[test]
    fn test_baud_rate_range() {
        let err = BusConfig::new(230_400).validate().unwrap_err();
        assert!(matches!(err, Error::Types(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_checksum2_requires_checksum() {
        let err = BusConfig::new(9600)
            .with_checksum2(Checksum2::Add)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::ConfigurationConflict(_))));

        assert!(
            BusConfig::new(9600)
                .with_checksum(Checksum::Xor)
                .with_checksum2(Checksum2::Add)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_invalid_monitor_filter() {
        let config = BusConfig::new(9600).with_packet_monitor([BytePattern::new(129, vec![0x01])]);
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(deprecated)]
    fn test_checksum_lambda_fills_primary_slot() {
        let config = BusConfig::new(9600).with_checksum_lambda(|data| data.len() as u8);
        assert!(config.checksum.is_enabled());
        assert_eq!(config.frame_builder().build(&[0xAA, 0xBB]).as_ref(), &[0xAA, 0xBB, 0x02]);
    }

    #[test]
    fn test_frame_gap_override() {
        let config = BusConfig::new(1200).with_frame_gap(Duration::from_millis(4));
        assert_eq!(config.assembler().gap(), Duration::from_millis(4));
    }
}
