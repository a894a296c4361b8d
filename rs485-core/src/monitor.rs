//! Packet monitor: independent filters tapping every received frame

use crate::{error::Result, pattern::BytePattern};

/// Ordered filter chain
///
/// Filters are evaluated in registration order and every match is reported.
/// A monitor without filters records all traffic.
#[derive(Debug, Clone, Default)]
pub struct PacketMonitor {
    filters: Vec<BytePattern>,
}

impl PacketMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor with filters already in place
    pub fn with_filters(filters: impl IntoIterator<Item = BytePattern>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
        }
    }

    /// Append a filter, returning its index
    pub fn add_filter(&mut self, pattern: BytePattern) -> usize {
        self.filters.push(pattern);
        self.filters.len() - 1
    }

    pub fn filters(&self) -> &[BytePattern] {
        &self.filters
    }

    pub fn validate(&self) -> Result<()> {
        self.filters.iter().try_for_each(BytePattern::validate)
    }

    /// Indices of the filters matching `frame`
    ///
    /// Returns `None` when the frame is not of interest, and `Some` (possibly
    /// empty, for a filterless monitor) when it should be recorded.
    pub fn inspect(&self, frame: &[u8]) -> Option<Vec<usize>> {
        if self.filters.is_empty() {
            return Some(Vec::new());
        }

        let matched: Vec<usize> = self
            .filters
            .iter()
            .enumerate()
            .filter(|(_, filter)| filter.matches(frame))
            .map(|(idx, _)| idx)
            .collect();

        if matched.is_empty() { None } else { Some(matched) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_monitor_records_everything() {
        let monitor = PacketMonitor::new();
        assert_eq!(monitor.inspect(&[0x01, 0x02]), Some(vec![]));
        assert_eq!(monitor.inspect(&[]), Some(vec![]));
    }

    #[test]
    fn test_reports_all_matches_in_order() {
        let mut monitor = PacketMonitor::new();
        assert_eq!(monitor.add_filter(BytePattern::exact(vec![0x03])), 0);
        assert_eq!(monitor.add_filter(BytePattern::new(1, vec![0x99])), 1);
        assert_eq!(monitor.add_filter(BytePattern::new(1, vec![0x10])), 2);

        assert_eq!(monitor.inspect(&[0x03, 0x10]), Some(vec![0, 2]));
        assert_eq!(monitor.inspect(&[0x04, 0x99]), Some(vec![1]));
        assert_eq!(monitor.inspect(&[0x04, 0x11]), None);
    }

    #[test]
    fn test_short_frames_match_nothing() {
        let monitor = PacketMonitor::with_filters([BytePattern::new(4, vec![0x01]).with_inverted(true)]);
        assert_eq!(monitor.inspect(&[0x00]), None);
        assert_eq!(monitor.inspect(&[0, 0, 0, 0, 0x02]), Some(vec![0]));
    }
}
