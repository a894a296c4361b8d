//! Protocol constants and configuration defaults

/// Largest frame the assembler will buffer before flushing
pub const MAX_FRAME_LEN: usize = 256;

/// Highest offset a state pattern or numeric field may start at
pub const MAX_STATE_OFFSET: usize = 128;

/// Default ack wait (ms)
pub const DEFAULT_RX_WAIT_MS: u64 = 10;

/// Retries after the first transmission when none are configured
pub const DEFAULT_TX_RETRY_COUNT: u8 = 3;

/// Default device polling interval (seconds)
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;

/// Default tick period of the bus loop (ms)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1;

/// Idle gap that ends a frame, in character times
pub const FRAME_GAP_CHARS: f64 = 3.5;

/// Lower bound for the idle gap (ms)
pub const MIN_FRAME_GAP_MS: u64 = 1;

/// Accepted ranges, inclusive
pub mod limits {
    pub const WAIT_MS: (u64, u64) = (1, 2000);
    pub const TX_RETRY_COUNT: (u8, u8) = (1, 10);
    pub const NUMERIC_LENGTH: (usize, usize) = (1, 4);
    pub const NUMERIC_PRECISION: (u8, u8) = (0, 5);
}
