//! Per-server and aggregate byte counters driven by transport log entries
//! (spec §2, "Bandwidth tracker"). This crate owns no I/O: the controller
//! calls `record_sent`/`record_received` after every frame actually crosses
//! the wire, so the counters always reflect full on-wire byte counts
//! including framing overhead.

use std::collections::HashMap;

/// Direction of a logged transfer, for the aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Byte counters for one named endpoint (a peer id or a content-server base URL).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EndpointBandwidth {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Aggregate + per-endpoint byte accounting. Counters are monotonically
/// non-decreasing for the lifetime of the tracker; callers reset them only
/// by dropping and recreating the tracker (there is no `reset` op in the
/// spec's data model).
#[derive(Debug, Default)]
pub struct BandwidthTracker {
    per_endpoint: HashMap<String, EndpointBandwidth>,
    total_sent: u64,
    total_received: u64,
}

impl BandwidthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, endpoint: &str, direction: Direction, bytes: u64) {
        let entry = self.per_endpoint.entry(endpoint.to_owned()).or_default();
        match direction {
            Direction::Sent => {
                entry.bytes_sent += bytes;
                self.total_sent += bytes;
            }
            Direction::Received => {
                entry.bytes_received += bytes;
                self.total_received += bytes;
            }
        }
        tracing::debug!(endpoint, ?direction, bytes, "bandwidth recorded");
    }

    pub fn record_sent(&mut self, endpoint: &str, bytes: u64) {
        self.record(endpoint, Direction::Sent, bytes);
    }

    pub fn record_received(&mut self, endpoint: &str, bytes: u64) {
        self.record(endpoint, Direction::Received, bytes);
    }

    pub fn endpoint(&self, endpoint: &str) -> EndpointBandwidth {
        self.per_endpoint.get(endpoint).copied().unwrap_or_default()
    }

    pub fn total(&self) -> EndpointBandwidth {
        EndpointBandwidth {
            bytes_sent: self.total_sent,
            bytes_received: self.total_received,
        }
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (&str, &EndpointBandwidth)> {
        self.per_endpoint.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_endpoint_and_aggregate() {
        let mut t = BandwidthTracker::new();
        t.record_sent("peer-a", 100);
        t.record_sent("peer-a", 50);
        t.record_received("peer-b", 30);
        assert_eq!(t.endpoint("peer-a").bytes_sent, 150);
        assert_eq!(t.endpoint("peer-b").bytes_received, 30);
        assert_eq!(t.total().bytes_sent, 150);
        assert_eq!(t.total().bytes_received, 30);
    }

    #[test]
    fn unknown_endpoint_reports_zero() {
        let t = BandwidthTracker::new();
        assert_eq!(t.endpoint("nobody"), EndpointBandwidth::default());
    }
}
