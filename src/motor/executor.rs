// Synchronous command executor
//
// Wraps codec + transport. Motion-synchronizing commands first wait for all
// channels to finish their current motion, then go out on the wire; queries
// read back one reply.

use std::time::Duration;

use tracing::{debug, trace};

use super::protocol::{self, mnemonic, Command};
use super::transport::Transport;
use super::waiter::{Clock, MotionWaiter, SystemClock, WaitOutcome};
use crate::config::{DEFAULT_WAIT_TIMEOUT, REPLY_MAX_LEN};
use crate::error::{Error, Result};

pub struct CommandExecutor<T: Transport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    waiter: MotionWaiter,
}

impl<T: Transport> CommandExecutor<T> {
    /// Executor on the system clock with the default 60 s wait timeout
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock, DEFAULT_WAIT_TIMEOUT)
    }
}

impl<T: Transport, C: Clock> CommandExecutor<T, C> {
    pub fn with_clock(transport: T, clock: C, wait_timeout: Duration) -> Self {
        Self {
            transport,
            clock,
            waiter: MotionWaiter::new(wait_timeout),
        }
    }

    /// Parse and execute a raw command string such as `1PR100` or `2TP?`
    ///
    /// A malformed command is rejected before anything is written.
    pub fn execute(&mut self, line: &str) -> Result<Option<String>> {
        let command = Command::parse(line)?;
        self.execute_command(&command)
    }

    /// Execute a command, waiting for prior motion first if it is synchronizing
    ///
    /// May block for up to the wait timeout before the command is even sent.
    pub fn execute_command(&mut self, command: &Command) -> Result<Option<String>> {
        if command.is_synchronizing() {
            debug!("{} waits for prior motion", command);
            self.wait(None)?;
        }
        self.send(command)
    }

    /// Execute a query that must produce a reply
    pub fn query(&mut self, command: &Command) -> Result<String> {
        self.execute_command(command)?
            .ok_or_else(|| Error::InvalidReply {
                command: command.to_string(),
                reply: String::new(),
            })
    }

    /// Execute a query and parse its integer value
    pub fn query_int(&mut self, command: &Command) -> Result<i64> {
        let reply = self.query(command)?;
        protocol::parse_reply_int(&reply).ok_or_else(|| Error::InvalidReply {
            command: command.to_string(),
            reply,
        })
    }

    /// Block until every channel reports motion done
    ///
    /// `None` uses the configured timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let mut waiter = self.waiter;
        if let Some(timeout) = timeout {
            waiter.timeout = timeout;
        }

        let Self {
            transport, clock, ..
        } = self;
        waiter.run(&*clock, |channel| {
            let command = Command::query(channel, mnemonic::MOTION_DONE);
            let reply = send_frame(transport, &command)?.unwrap_or_default();
            protocol::parse_reply_int(&reply)
                .map(|flag| flag != 0)
                .ok_or_else(|| Error::InvalidReply {
                    command: command.to_string(),
                    reply,
                })
        })
    }

    /// Configured motion timeout
    pub fn wait_timeout(&self) -> Duration {
        self.waiter.timeout
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode, write and read back the reply without any synchronization
    fn send(&mut self, command: &Command) -> Result<Option<String>> {
        send_frame(&mut self.transport, command)
    }
}

fn send_frame<T: Transport>(transport: &mut T, command: &Command) -> Result<Option<String>> {
    let frame = command.encode();
    trace!("-> {:?}", frame);
    transport.write(frame.as_bytes())?;

    if !frame.contains(protocol::QUERY) {
        return Ok(None);
    }

    let bytes = transport.read(REPLY_MAX_LEN)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let reply = protocol::decode_reply(&bytes);
    debug!("{} -> {:?}", command, reply);
    Ok(Some(reply))
}
