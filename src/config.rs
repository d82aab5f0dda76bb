// Device identifiers, timing constants and the JSON controller config
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

// USB identifiers (Newport Corporation, 8742 open-loop controller)
pub const NEWPORT_VENDOR_ID: u16 = 0x104D;
pub const KNOWN_PRODUCT_IDS: [u16; 1] = [0x4000];

// The controller drives a fixed set of four channels
pub const CHANNELS: [u8; 4] = [1, 2, 3, 4];

// Motion defaults applied to every channel at connect time
pub const DEFAULT_VELOCITY: u32 = 1000; // steps/s
pub const DEFAULT_ACCELERATION: u32 = 1000; // steps/s^2

// Motion-completion polling
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Pause after starting a continuous move before polling for completion
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

// Replies are never longer than this; a shorter read is a complete reply
pub const REPLY_MAX_LEN: usize = 100;

// An IN transfer that has not completed by then is abandoned
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Parse a USB id given as hex (`0x104D`) or decimal (`4173`)
pub fn parse_usb_id(value: &str) -> std::result::Result<u16, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid USB id {value:?}: {e}"))
}

/// Convert a wait timeout in seconds, rejecting values that are not positive
/// or do not fit in a `Duration`
pub fn timeout_from_secs(seconds: f64) -> std::result::Result<Duration, String> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(format!(
            "timeout must be a positive number of seconds, got {seconds}"
        ));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("timeout {seconds} is out of range: {e}"))
}

/// Label entry for a channel: either a bare string or an object with label/role
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelLabel {
    Name(String),
    Detailed {
        label: Option<String>,
        role: Option<String>,
    },
}

/// Connection and motion settings, usually loaded from a JSON file
///
/// Every field is optional in the file; missing fields take the defaults above.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    #[serde(deserialize_with = "usb_id")]
    pub vendor_id: u16,
    #[serde(deserialize_with = "optional_usb_id")]
    pub product_id: Option<u16>,
    pub velocity: u32,
    pub acceleration: u32,
    /// Seconds
    pub wait_timeout: f64,
    pub channels: BTreeMap<String, ChannelLabel>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            vendor_id: NEWPORT_VENDOR_ID,
            product_id: None,
            velocity: DEFAULT_VELOCITY,
            acceleration: DEFAULT_ACCELERATION,
            wait_timeout: DEFAULT_WAIT_TIMEOUT.as_secs_f64(),
            channels: BTreeMap::new(),
        }
    }
}

impl ControllerConfig {
    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_error = |reason: String| Error::Config {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?;

        timeout_from_secs(config.wait_timeout)
            .map_err(|reason| config_error(format!("wait_timeout: {reason}")))?;
        Ok(config)
    }

    /// Motion wait timeout as a duration
    ///
    /// A value that is not a valid timeout falls back to `DEFAULT_WAIT_TIMEOUT`.
    pub fn wait_timeout(&self) -> Duration {
        timeout_from_secs(self.wait_timeout).unwrap_or(DEFAULT_WAIT_TIMEOUT)
    }

    /// Product ids to scan: the configured one, or every known id
    pub fn product_ids(&self) -> Vec<u16> {
        match self.product_id {
            Some(id) => vec![id],
            None => KNOWN_PRODUCT_IDS.to_vec(),
        }
    }

    /// Display label for a channel, falling back to "Motor N"
    pub fn channel_label(&self, channel: u8) -> String {
        let fallback = || format!("Motor {channel}");
        match self.channels.get(&channel.to_string()) {
            Some(ChannelLabel::Name(name)) => name.clone(),
            Some(ChannelLabel::Detailed { label, role }) => label
                .clone()
                .or_else(|| role.clone())
                .unwrap_or_else(fallback),
            None => fallback(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUsbId {
    Number(u16),
    Text(String),
}

impl RawUsbId {
    fn resolve<E: serde::de::Error>(self) -> std::result::Result<u16, E> {
        match self {
            RawUsbId::Number(id) => Ok(id),
            RawUsbId::Text(text) => parse_usb_id(&text).map_err(E::custom),
        }
    }
}

fn usb_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    RawUsbId::deserialize(deserializer)?.resolve()
}

fn optional_usb_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u16>, D::Error> {
    Option::<RawUsbId>::deserialize(deserializer)?
        .map(RawUsbId::resolve)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("0x104D"), Ok(0x104D));
        assert_eq!(parse_usb_id("0X4000"), Ok(0x4000));
        assert_eq!(parse_usb_id("16384"), Ok(0x4000));
        assert!(parse_usb_id("0xZZ").is_err());
        assert!(parse_usb_id("70000").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.vendor_id, NEWPORT_VENDOR_ID);
        assert_eq!(config.product_ids(), vec![0x4000]);
        assert_eq!(config.velocity, 1000);
        assert_eq!(config.acceleration, 1000);
        assert_eq!(config.wait_timeout(), Duration::from_secs(60));
        assert_eq!(config.channel_label(3), "Motor 3");
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"{
                "vendor_id": "0x104D",
                "product_id": 16384,
                "velocity": 500,
                "wait_timeout": 12.5,
                "channels": {
                    "1": "Mirror X",
                    "2": { "role": "Mirror Y" },
                    "3": { "label": "Lens", "role": "focus" }
                }
            }"#,
        );
        let config = ControllerConfig::load(file.path()).unwrap();

        assert_eq!(config.product_id, Some(0x4000));
        assert_eq!(config.velocity, 500);
        assert_eq!(config.acceleration, DEFAULT_ACCELERATION);
        assert_eq!(config.wait_timeout(), Duration::from_millis(12_500));
        assert_eq!(config.channel_label(1), "Mirror X");
        assert_eq!(config.channel_label(2), "Mirror Y");
        assert_eq!(config.channel_label(3), "Lens");
        assert_eq!(config.channel_label(4), "Motor 4");
    }

    #[test]
    fn test_load_rejects_bad_id_and_timeout() {
        let file = write_config(r#"{ "product_id": "0xnope" }"#);
        assert!(matches!(
            ControllerConfig::load(file.path()),
            Err(Error::Config { .. })
        ));

        let file = write_config(r#"{ "wait_timeout": 0 }"#);
        assert!(matches!(
            ControllerConfig::load(file.path()),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_load_rejects_timeout_too_large_for_duration() {
        let file = write_config(r#"{ "wait_timeout": 1e20 }"#);
        let err = ControllerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("wait_timeout"));
    }

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(timeout_from_secs(2.5), Ok(Duration::from_millis(2500)));
        assert!(timeout_from_secs(0.0).is_err());
        assert!(timeout_from_secs(-1.0).is_err());
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
        assert!(timeout_from_secs(1e20).is_err());

        let config = ControllerConfig {
            wait_timeout: 1e20,
            ..ControllerConfig::default()
        };
        assert_eq!(config.wait_timeout(), DEFAULT_WAIT_TIMEOUT);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ControllerConfig::load("/nonexistent/picomotor.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/picomotor.json"));
    }
}
