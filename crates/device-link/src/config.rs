//! Configuration types for the device link.

use std::time::Duration;

/// Settings for the bundled TCP transport.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Network timeout settings.
    pub timeouts: TransportTimeouts,
    /// Log every chunk sent and received at `trace` level.
    pub trace_io: bool,
}

/// Timeout settings for printer connections.
///
/// Defaults are tuned for LAN-connected label printers:
/// - `connect`: 5s (generous for LAN, might be tight for VPN)
/// - `write`: 30s (labels with embedded ^GF graphics can be 500KB+)
/// - `read`: 500ms per read; silence past this yields an empty chunk
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct TransportTimeouts {
    /// Maximum time to wait for the connection to establish.
    pub connect: Duration,
    /// Maximum time to wait for a write to complete.
    pub write: Duration,
    /// Maximum time a single read waits for data before returning empty.
    pub read: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            write: Duration::from_secs(30),
            read: Duration::from_millis(500),
        }
    }
}

/// Settings for a per-device command channel.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Empty reads tolerated before a response starts.
    /// `None` uses [`Device::read_retries`](crate::Device::read_retries).
    pub read_retries: Option<i32>,
    /// Attempts made by `prefetch_configuration` before giving up.
    pub configuration_attempts: u32,
    /// Delay between failed configuration prefetch attempts.
    pub configuration_retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_retries: None,
            configuration_attempts: 5,
            configuration_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Settings for the [`StatusWatcher`](crate::StatusWatcher).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Period between status polls.
    pub poll_interval: Duration,
    /// Consecutive offline observations required before an offline change
    /// is reported. Individual watches may override it.
    pub offline_threshold: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            offline_threshold: 2,
        }
    }
}
