// New Focus ASCII command protocol
//
// Commands are entered as `[channel]<MNEMONIC>[parameter]`, e.g. `1PR-50`.
// On the wire each field is separated by a single space and the frame is
// terminated by a carriage return: "1 PR -50\r". Only commands whose
// parameter is `?` produce a reply.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Command grammar: optional channel digit, 2+ letter mnemonic, optional
/// signed value or query marker.
static COMMAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]?)([A-Za-z]{2,})([0-9+\-]*|\?)$").expect("Invalid command regex")
});

/// Trailing signed integer of a reply (replies may echo the command first)
static REPLY_INT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]?[0-9]+$").expect("Invalid reply regex"));

/// Query marker used as parameter
pub const QUERY: &str = "?";

/// Mnemonics used by the driver
pub mod mnemonic {
    pub const ACCELERATION: &str = "AC";
    pub const HOME: &str = "DH";
    pub const MOTOR_CHECK: &str = "MC";
    pub const MOTION_DONE: &str = "MD";
    pub const MOVE_INDEFINITELY: &str = "MV";
    pub const TARGET_ABSOLUTE: &str = "PA";
    pub const TARGET_RELATIVE: &str = "PR";
    pub const MOTOR_TYPE: &str = "QM";
    pub const STOP: &str = "ST";
    pub const POSITION: &str = "TP";
    pub const VELOCITY: &str = "VA";
    pub const VERSION: &str = "VE";
    pub const PURGE: &str = "XX";
}

/// Mnemonics that start (or may interfere with) motion. The device behaviour
/// is undefined if one of these arrives while a motion is still running, so
/// the executor waits for all channels to settle before sending them.
pub const SYNC_MNEMONICS: [&str; 6] = [
    mnemonic::HOME,
    mnemonic::MOTOR_CHECK,
    mnemonic::MOVE_INDEFINITELY,
    mnemonic::TARGET_ABSOLUTE,
    mnemonic::TARGET_RELATIVE,
    mnemonic::PURGE,
];

/// A parsed controller command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub channel: Option<u8>,
    pub mnemonic: String,
    pub parameter: Option<String>,
}

impl Command {
    /// Build a command from parts; the mnemonic is normalized to upper case
    pub fn new(channel: Option<u8>, mnemonic: &str, parameter: Option<String>) -> Self {
        Self {
            channel,
            mnemonic: mnemonic.to_ascii_uppercase(),
            parameter,
        }
    }

    /// `<channel><MNEMONIC>?`
    pub fn query(channel: u8, mnemonic: &str) -> Self {
        Self::new(Some(channel), mnemonic, Some(QUERY.to_string()))
    }

    /// `<channel><MNEMONIC><value>`
    pub fn set(channel: u8, mnemonic: &str, value: impl fmt::Display) -> Self {
        Self::new(Some(channel), mnemonic, Some(value.to_string()))
    }

    /// Parse a user-entered command such as `1PR-50`, `2VA?` or `ST`
    pub fn parse(input: &str) -> Result<Self> {
        let caps = COMMAND_REGEX
            .captures(input)
            .ok_or_else(|| Error::MalformedCommand {
                input: input.to_string(),
            })?;

        // Group 1 is at most one ASCII digit
        let channel = caps
            .get(1)
            .and_then(|m| m.as_str().bytes().next())
            .map(|digit| digit - b'0');
        let mnemonic = &caps[2];
        let parameter = caps
            .get(3)
            .map(|m| m.as_str())
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self::new(channel, mnemonic, parameter))
    }

    /// True if the command asks the controller for a reply
    pub fn is_query(&self) -> bool {
        self.parameter.as_deref() == Some(QUERY)
    }

    /// True if prior motion must complete before this command is sent
    ///
    /// Queries never wait, so `PA?` answers while a channel is still moving.
    pub fn is_synchronizing(&self) -> bool {
        !self.is_query() && SYNC_MNEMONICS.contains(&self.mnemonic.as_str())
    }

    /// Encode to the wire frame: `"<channel> <MNEMONIC> <parameter>\r"`
    ///
    /// Empty optional fields leave their slot empty but both separators stay.
    pub fn encode(&self) -> String {
        let channel = self.channel.map(|c| c.to_string()).unwrap_or_default();
        let parameter = self.parameter.as_deref().unwrap_or_default();
        format!("{} {} {}\r", channel, self.mnemonic, parameter).to_uppercase()
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = self.channel {
            write!(f, "{channel}")?;
        }
        write!(f, "{}", self.mnemonic)?;
        if let Some(parameter) = &self.parameter {
            write!(f, "{parameter}")?;
        }
        Ok(())
    }
}

/// Decode raw reply bytes: each byte is one Latin-1 character, trailing
/// whitespace and control characters are dropped
pub fn decode_reply(bytes: &[u8]) -> String {
    let text: String = bytes.iter().map(|&b| b as char).collect();
    text.trim_end_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}

/// Extract the integer value of a reply: `"1000"` and `"2VA1000"` both give 1000
pub fn parse_reply_int(reply: &str) -> Option<i64> {
    REPLY_INT_REGEX
        .find(reply.trim())
        .and_then(|m| m.as_str().parse().ok())
}

/// Motor type reported by `QM?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorType {
    NoMotor = 0,
    Unknown = 1,
    Tiny = 2,
    Standard = 3,
}

impl MotorType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoMotor),
            1 => Some(Self::Unknown),
            2 => Some(Self::Tiny),
            3 => Some(Self::Standard),
            _ => None,
        }
    }

    /// False when nothing is plugged into the channel
    pub fn is_connected(&self) -> bool {
        *self != Self::NoMotor
    }
}

impl fmt::Display for MotorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoMotor => "No motor connected",
            Self::Unknown => "Motor Unknown",
            Self::Tiny => "'Tiny' Motor",
            Self::Standard => "'Standard' Motor",
        };
        f.write_str(text)
    }
}

/// Direction of a continuous move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn as_sign(&self) -> &'static str {
        match self {
            Self::Positive => "+",
            Self::Negative => "-",
        }
    }
}

/// Identity string returned by `VE?`, e.g. "8742 Version 2.2 08/01/13"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub model: String,
    pub firmware: String,
}

impl ControllerInfo {
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim();
        let (model, firmware) = reply.split_once(' ').unwrap_or((reply, ""));
        Self {
            model: model.to_string(),
            firmware: firmware.trim().to_string(),
        }
    }
}
