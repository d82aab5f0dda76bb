// Motion-completion waiter
//
// The controller acknowledges motion commands immediately; the motion itself
// finishes later. The waiter polls the motion-done flag of all four channels
// until every channel reports done in the same cycle, or the timeout expires.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::{CHANNELS, DEFAULT_WAIT_TIMEOUT, POLL_INTERVAL};
use crate::error::{Error, Result};

/// Time source and sleep used by every blocking step of the driver
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock with real thread sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Polling,
    Done,
    TimedOut,
}

/// Transition taken after one polling cycle
///
/// Completion wins over the timeout: a cycle that finds every channel done
/// succeeds even if it finished exactly at the deadline.
pub fn next_state(all_done: bool, elapsed: Duration, timeout: Duration) -> WaitState {
    if all_done {
        WaitState::Done
    } else if elapsed >= timeout {
        WaitState::TimedOut
    } else {
        WaitState::Polling
    }
}

/// Result of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Number of polling cycles, including the final one
    pub cycles: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct MotionWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for MotionWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT)
    }
}

impl MotionWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Poll until all channels are done or the timeout expires
    ///
    /// `motion_done(channel)` is called once for each of channels 1-4 per
    /// cycle. Transport errors from the poll abort the wait immediately.
    pub fn run<C, F>(&self, clock: &C, mut motion_done: F) -> Result<WaitOutcome>
    where
        C: Clock,
        F: FnMut(u8) -> Result<bool>,
    {
        let start = clock.now();
        let mut cycles = 0;

        loop {
            cycles += 1;

            let mut all_done = true;
            for channel in CHANNELS {
                if !motion_done(channel)? {
                    trace!("Channel {} still moving", channel);
                    all_done = false;
                }
            }

            let elapsed = clock.now().saturating_duration_since(start);
            match next_state(all_done, elapsed, self.timeout) {
                WaitState::Done => {
                    debug!("Motion done after {} cycles ({:?})", cycles, elapsed);
                    return Ok(WaitOutcome { cycles, elapsed });
                }
                WaitState::TimedOut => {
                    return Err(Error::MotionTimeout {
                        elapsed,
                        timeout: self.timeout,
                    });
                }
                WaitState::Polling => {
                    // Never sleep past the deadline
                    let remaining = self.timeout - elapsed;
                    clock.sleep(self.poll_interval.min(remaining));
                }
            }
        }
    }
}
