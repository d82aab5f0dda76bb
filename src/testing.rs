// Test doubles: a simulated 8742 behind the Transport trait and a virtual clock

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::READ_TIMEOUT;
use crate::error::TransportError;
use crate::motor::transport::Transport;
use crate::motor::waiter::Clock;

/// Clock whose time only advances when something sleeps
pub(crate) struct FakeClock {
    base: Instant,
    offset: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

const ENDLESS: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct SimChannel {
    position: i64,
    target: i64,
    relative: i64,
    velocity: i64,
    acceleration: i64,
    home: i64,
    direction: i64,
    motor_type: i64,
    // MD? polls left before the channel reports done
    busy_polls: u32,
}

impl Default for SimChannel {
    fn default() -> Self {
        Self {
            position: 0,
            target: 0,
            relative: 0,
            velocity: 1000,
            acceleration: 1000,
            home: 0,
            direction: 0,
            motor_type: 3,
            busy_polls: 0,
        }
    }
}

/// In-memory 8742: records every frame and answers queries
pub(crate) struct SimulatedDevice {
    frames: Rc<RefCell<Vec<String>>>,
    channels: [SimChannel; 4],
    motion_polls: u32,
    overrides: HashMap<String, String>,
    pending: Option<String>,
    unplugged: Rc<Cell<bool>>,
    silent_times_out: bool,
}

impl SimulatedDevice {
    pub(crate) fn new() -> Self {
        Self {
            frames: Rc::new(RefCell::new(Vec::new())),
            channels: Default::default(),
            motion_polls: 0,
            overrides: HashMap::new(),
            pending: None,
            unplugged: Rc::new(Cell::new(false)),
            silent_times_out: false,
        }
    }

    /// Moves stay busy for `polls` MD? queries on the moving channel
    pub(crate) fn with_motion_polls(mut self, polls: u32) -> Self {
        self.motion_polls = polls;
        self
    }

    /// Fixed reply for every query of `mnemonic`
    pub(crate) fn with_reply(mut self, mnemonic: &str, reply: &str) -> Self {
        self.overrides.insert(mnemonic.to_string(), reply.to_string());
        self
    }

    pub(crate) fn with_motor_types(mut self, codes: [i64; 4]) -> Self {
        for (channel, code) in self.channels.iter_mut().zip(codes) {
            channel.motor_type = code;
        }
        self
    }

    pub(crate) fn with_position(mut self, channel: u8, position: i64) -> Self {
        self.channels[usize::from(channel - 1)].position = position;
        self
    }

    /// Every write fails with a broken pipe
    pub(crate) fn failing(self) -> Self {
        self.unplugged.set(true);
        self
    }

    /// Reads with no reply pending time out, as the hardware does for unknown queries
    pub(crate) fn timing_out_when_silent(mut self) -> Self {
        self.silent_times_out = true;
        self
    }

    /// Switch that makes writes fail from the moment it is set
    pub(crate) fn unplugged(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.unplugged)
    }

    /// Shared handle on the frame log; stays valid after the device is moved
    pub(crate) fn frames(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.frames)
    }

    fn channel_mut(&mut self, channel: Option<u8>) -> Option<&mut SimChannel> {
        let index = usize::from(channel?).checked_sub(1)?;
        self.channels.get_mut(index)
    }

    fn handle(&mut self, frame: &str) -> Option<String> {
        let body = frame.strip_suffix('\r')?;
        let mut fields = body.splitn(3, ' ');
        let channel = fields.next()?.parse::<u8>().ok();
        let mnemonic = fields.next()?.to_string();
        let parameter = fields.next().unwrap_or_default();

        if parameter == "?" {
            return self.answer(channel, &mnemonic);
        }

        let value = parameter.parse::<i64>().ok();
        let motion_polls = self.motion_polls;
        match mnemonic.as_str() {
            "ST" => match self.channel_mut(channel) {
                Some(ch) => ch.busy_polls = 0,
                None => self.channels.iter_mut().for_each(|ch| ch.busy_polls = 0),
            },
            _ => {
                let ch = self.channel_mut(channel)?;
                match mnemonic.as_str() {
                    "VA" => ch.velocity = value?,
                    "AC" => ch.acceleration = value?,
                    "DH" => {
                        ch.home = value.unwrap_or(0);
                        ch.position = ch.home;
                    }
                    "PR" => {
                        ch.relative = value?;
                        ch.target = ch.position + ch.relative;
                        ch.position = ch.target;
                        ch.busy_polls = motion_polls;
                    }
                    "PA" => {
                        ch.target = value?;
                        ch.position = ch.target;
                        ch.busy_polls = motion_polls;
                    }
                    "MV" => {
                        ch.direction = if parameter == "-" { -1 } else { 1 };
                        ch.busy_polls = ENDLESS;
                    }
                    _ => {}
                }
            }
        }
        None
    }

    fn answer(&mut self, channel: Option<u8>, mnemonic: &str) -> Option<String> {
        if let Some(reply) = self.overrides.get(mnemonic) {
            return Some(reply.clone());
        }
        if mnemonic == "VE" {
            return Some("8742 Version 2.2 08/01/13".to_string());
        }

        let ch = self.channel_mut(channel)?;
        let value = match mnemonic {
            "TP" => ch.position,
            "PA" => ch.target,
            "PR" => ch.relative,
            "VA" => ch.velocity,
            "AC" => ch.acceleration,
            "DH" => ch.home,
            "MV" => ch.direction,
            "QM" => ch.motor_type,
            "MD" => {
                if ch.busy_polls == 0 {
                    1
                } else {
                    if ch.busy_polls != ENDLESS {
                        ch.busy_polls -= 1;
                    }
                    0
                }
            }
            _ => return None,
        };
        Some(value.to_string())
    }
}

impl Transport for SimulatedDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.unplugged.get() {
            let error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device unplugged");
            return Err(error.into());
        }
        let frame: String = bytes.iter().map(|&b| b as char).collect();
        self.frames.borrow_mut().push(frame.clone());
        self.pending = self.handle(&frame);
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reply = match self.pending.take() {
            Some(r) => format!("{r}\r\n").into_bytes(),
            None if self.silent_times_out => return Err(TransportError::Timeout(READ_TIMEOUT)),
            None => Vec::new(),
        };
        reply.truncate(max_len);
        Ok(reply)
    }
}
