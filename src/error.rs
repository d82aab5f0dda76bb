// Error types for picomotor communication

use std::time::Duration;

/// Errors raised by the transport layer (USB transfers and device setup)
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("USB transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("USB configuration error: {0}")]
    Configuration(String),

    #[error("USB read timed out after {0:?}")]
    Timeout(Duration),
}

/// Error types for the picomotor controller
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed command {input:?}: expected [channel]<mnemonic>[parameter]")]
    MalformedCommand { input: String },

    #[error("Controller has no {direction} endpoint on interface 0")]
    EndpointBinding { direction: &'static str },

    #[error("No controller found for VID={vendor_id:#06x} PID={product_ids:04x?}")]
    DeviceNotFound { vendor_id: u16, product_ids: Vec<u16> },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Motion did not complete within {timeout:?} (waited {elapsed:?})")]
    MotionTimeout { elapsed: Duration, timeout: Duration },

    #[error("No USB backend available: {0}")]
    NoUsbBackend(String),

    #[error("Invalid reply to {command}: {reply:?}")]
    InvalidReply { command: String, reply: String },

    #[error("Channel {0} is out of range (expected 1-4)")]
    InvalidChannel(u8),

    #[error("Config error in {path}: {reason}")]
    Config { path: String, reason: String },

    /// Terminal or console stream failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_lists_ids_in_hex() {
        let err = Error::DeviceNotFound {
            vendor_id: 0x104D,
            product_ids: vec![0x4000],
        };
        assert_eq!(
            err.to_string(),
            "No controller found for VID=0x104d PID=[4000]"
        );
    }

    #[test]
    fn test_transport_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: Error = TransportError::from(io).into();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
    }
}
