//! Error types for the thermal-printer-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// I/O error from a serial-profile socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller has not been granted Bluetooth permissions.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// The Bluetooth radio is switched off or no adapter is present.
    #[error("Bluetooth is disabled")]
    BluetoothDisabled,

    /// The radio refused to start or continue a scan.
    #[error("Scan failed with code {code}")]
    ScanFailed {
        /// Platform-specific failure code.
        code: i32,
    },

    /// The requested printer was not seen within the lookup window.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Both transports were tried and the last one timed out.
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Failed to establish a connection to the printer.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection dropped while a job was in flight.
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation requires a ready connection with a write endpoint.
    #[error("Printer not connected")]
    NotConnected,

    /// Another transmission or connection attempt is already in flight.
    #[error("Printer busy: {operation} already in progress")]
    Busy {
        /// The operation that is holding the printer.
        operation: &'static str,
    },

    /// Mid-transmission I/O failure. The job is aborted.
    #[error("Write failed: {reason}")]
    WriteError {
        /// Description of the underlying failure.
        reason: String,
    },

    /// The image payload could not be decoded.
    #[error("Invalid image: {reason}")]
    InvalidImage {
        /// Why the image was rejected.
        reason: String,
    },

    /// The QR code could not be generated from the given content.
    #[error("QR code generation failed: {reason}")]
    QrGeneration {
        /// Why generation failed.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller can reasonably retry the same operation.
    ///
    /// Permission and radio errors stay terminal until the user acts, and
    /// malformed input never succeeds on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. }
                | Self::ConnectionTimeout
                | Self::ConnectionFailed { .. }
                | Self::ConnectionLost
                | Self::Busy { .. }
                | Self::WriteError { .. }
                | Self::ScanFailed { .. }
                | Self::Bluetooth(_)
                | Self::Io(_)
        )
    }

    pub(crate) fn write_error(reason: impl std::fmt::Display) -> Self {
        Self::WriteError {
            reason: reason.to_string(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_taxonomy() {
        assert!(!Error::PermissionDenied.is_retryable());
        assert!(!Error::BluetoothDisabled.is_retryable());
        assert!(!Error::NotConnected.is_retryable());
        assert!(!Error::InvalidImage {
            reason: "bad".into()
        }
        .is_retryable());

        assert!(Error::ConnectionTimeout.is_retryable());
        assert!(Error::DeviceNotFound {
            identifier: "AA:BB".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::ScanFailed { code: 2 };
        assert_eq!(err.to_string(), "Scan failed with code 2");

        let err = Error::Busy {
            operation: "transmission",
        };
        assert_eq!(
            err.to_string(),
            "Printer busy: transmission already in progress"
        );
    }
}
