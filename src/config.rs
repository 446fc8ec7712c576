//! Tunables for scanning, connecting, and transmission.

use std::time::Duration;

/// Default length of a discovery session.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default budget for each transport attempt during connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time to wait for an unknown device to show up during connect.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default BLE chunk size in bytes.
///
/// Well below the usual negotiated ATT MTU so that cheap printer firmware
/// never sees a write larger than its receive buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// RFCOMM channel most serial-profile printers listen on.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Configuration for a [`PrinterManager`](crate::PrinterManager).
///
/// ```
/// use std::time::Duration;
/// use thermal_printer_ble::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .with_scan_timeout(Duration::from_secs(10))
///     .with_chunk_size(180);
/// assert_eq!(config.chunk_size, 180);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagerConfig {
    /// How long a scan runs before it stops on its own.
    pub scan_timeout: Duration,
    /// Budget for each transport attempt (Classic, then BLE).
    pub connect_timeout: Duration,
    /// How long `connect` waits for an unknown identifier to be discovered.
    pub lookup_timeout: Duration,
    /// Maximum bytes per BLE write.
    pub chunk_size: usize,
    /// RFCOMM channel for serial-profile connections.
    pub rfcomm_channel: u8,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rfcomm_channel: DEFAULT_RFCOMM_CHANNEL,
            event_capacity: 64,
        }
    }
}

impl ManagerConfig {
    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the per-transport connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the device lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Set the BLE chunk size. Zero is clamped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the RFCOMM channel.
    pub fn with_rfcomm_channel(mut self, channel: u8) -> Self {
        self.rfcomm_channel = channel;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.scan_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.lookup_timeout, Duration::from_secs(10));
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.rfcomm_channel, 1);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let config = ManagerConfig::default().with_chunk_size(0);
        assert_eq!(config.chunk_size, 1);
    }
}
