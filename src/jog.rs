// Keyboard jog: 1-4 select channel, ←/→ (a/d) jog, ↑/↓ step size, h home,
// space/s stop, q/Esc quit
use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::{info, warn};

use crate::config::{ControllerConfig, CHANNELS};
use crate::error::{Error, Result, TransportError};
use crate::motor::driver::Controller;
use crate::motor::protocol::Direction;
use crate::motor::transport::Transport;
use crate::motor::waiter::Clock;

pub const DEFAULT_JOG_STEP: u32 = 100;
const MIN_STEP: u32 = 1;
const MAX_STEP: u32 = 100_000;
const STEP_FACTOR: u32 = 10;
const KEY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogAction {
    Select(u8),
    Jog(Direction),
    StepUp,
    StepDown,
    SetHome,
    Stop,
    Quit,
}

/// Key binding table
pub fn action_for(code: KeyCode) -> Option<JogAction> {
    let action = match code {
        KeyCode::Char(c @ '1'..='4') => JogAction::Select(c as u8 - b'0'),
        KeyCode::Left | KeyCode::Char('a') => JogAction::Jog(Direction::Negative),
        KeyCode::Right | KeyCode::Char('d') => JogAction::Jog(Direction::Positive),
        KeyCode::Up => JogAction::StepUp,
        KeyCode::Down => JogAction::StepDown,
        KeyCode::Char('h') => JogAction::SetHome,
        KeyCode::Char(' ') | KeyCode::Char('s') => JogAction::Stop,
        KeyCode::Char('q') | KeyCode::Esc => JogAction::Quit,
        _ => return None,
    };
    Some(action)
}

/// Selected channel and step size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JogState {
    pub channel: u8,
    pub step: u32,
}

impl JogState {
    pub fn new(step: u32) -> Self {
        Self {
            channel: CHANNELS[0],
            step: step.clamp(MIN_STEP, MAX_STEP),
        }
    }

    pub fn select(&mut self, channel: u8) {
        if CHANNELS.contains(&channel) {
            self.channel = channel;
        }
    }

    pub fn step_up(&mut self) {
        self.step = self.step.saturating_mul(STEP_FACTOR).min(MAX_STEP);
    }

    pub fn step_down(&mut self) {
        self.step = (self.step / STEP_FACTOR).max(MIN_STEP);
    }

    /// Signed step count for one jog in `direction`
    pub fn steps(&self, direction: Direction) -> i64 {
        match direction {
            Direction::Positive => i64::from(self.step),
            Direction::Negative => -i64::from(self.step),
        }
    }
}

/// Run the jog loop in raw terminal mode until `q`/`Esc`
///
/// The terminal is restored and all motors are stopped on every exit path.
pub fn run<T: Transport, C: Clock>(
    controller: &mut Controller<T, C>,
    config: &ControllerConfig,
    step: u32,
) -> Result<()> {
    info!("Controls: 1-4=channel, ←/→ or a/d=jog, ↑/↓=step, h=home, space/s=stop, q=quit");

    enable_raw_mode()?;
    let result = run_jog(controller, config, JogState::new(step));
    let restored = disable_raw_mode().map_err(Error::from);

    let stopped = controller.stop_motion(None);
    result.and(restored).and(stopped)
}

fn run_jog<T: Transport, C: Clock>(
    controller: &mut Controller<T, C>,
    config: &ControllerConfig,
    mut state: JogState,
) -> Result<()> {
    let mut out = io::stdout();
    print_state(&mut out, config, &state)?;

    loop {
        if !event::poll(KEY_POLL)? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }
        let Some(action) = action_for(code) else {
            continue;
        };

        let outcome = match action {
            JogAction::Select(channel) => {
                state.select(channel);
                print_state(&mut out, config, &state)?;
                Ok(())
            }
            JogAction::StepUp => {
                state.step_up();
                print_state(&mut out, config, &state)?;
                Ok(())
            }
            JogAction::StepDown => {
                state.step_down();
                print_state(&mut out, config, &state)?;
                Ok(())
            }
            JogAction::Jog(direction) => jog(controller, &mut out, &state, direction),
            JogAction::SetHome => set_home(controller, &mut out, &state),
            JogAction::Stop => controller.stop_motion(Some(state.channel)),
            JogAction::Quit => break,
        };

        match outcome {
            Ok(()) => {}
            Err(
                e @ (Error::MotionTimeout { .. }
                | Error::InvalidReply { .. }
                | Error::Transport(TransportError::Timeout(_))),
            ) => {
                warn!("Jog failed: {}", e);
                write!(out, "  error: {e}\r\n")?;
            }
            Err(e) => return Err(e),
        }
        out.flush()?;
    }

    Ok(())
}

fn jog<T: Transport, C: Clock, W: Write>(
    controller: &mut Controller<T, C>,
    out: &mut W,
    state: &JogState,
    direction: Direction,
) -> Result<()> {
    controller.move_relative(state.channel, state.steps(direction))?;
    let position = controller.get_position(state.channel)?;
    write!(out, "  position: {position}\r\n")?;
    Ok(())
}

fn set_home<T: Transport, C: Clock, W: Write>(
    controller: &mut Controller<T, C>,
    out: &mut W,
    state: &JogState,
) -> Result<()> {
    controller.set_home_position(state.channel)?;
    write!(out, "  home set on channel {}\r\n", state.channel)?;
    Ok(())
}

fn print_state<W: Write>(out: &mut W, config: &ControllerConfig, state: &JogState) -> Result<()> {
    // Raw mode needs an explicit carriage return
    write!(
        out,
        "channel {} ({}), step {}\r\n",
        state.channel,
        config.channel_label(state.channel),
        state.step
    )?;
    out.flush()?;
    Ok(())
}
