// High-level driver for the 8742 picomotor controller
//
// Composes the command executor and the motion waiter into blocking motion
// operations on the four fixed channels.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::executor::CommandExecutor;
use super::protocol::{mnemonic, Command, ControllerInfo, Direction, MotorType, QUERY};
use super::transport::{Transport, UsbTransport};
use super::waiter::{Clock, SystemClock, WaitOutcome};
use crate::config::{ControllerConfig, CHANNELS, SETTLE_DELAY};
use crate::discovery::{self, NusbBackend};
use crate::error::{Error, Result};

/// Velocity and acceleration applied to every channel at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSettings {
    pub velocity: u32,
    pub acceleration: u32,
}

impl From<&ControllerConfig> for MotionSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            velocity: config.velocity,
            acceleration: config.acceleration,
        }
    }
}

/// Blocking controller API over one exclusively owned executor
pub struct Controller<T: Transport, C: Clock = SystemClock> {
    executor: CommandExecutor<T, C>,
}

impl Controller<UsbTransport> {
    /// Discover (if needed), open and initialize a USB controller
    pub fn connect(config: &ControllerConfig) -> Result<Self> {
        let product_id = match config.product_id {
            Some(id) => id,
            None => {
                let backend = NusbBackend;
                let device =
                    discovery::find_first(&backend, config.vendor_id, &config.product_ids())?
                        .ok_or_else(|| Error::DeviceNotFound {
                            vendor_id: config.vendor_id,
                            product_ids: config.product_ids(),
                        })?;
                info!(
                    "Auto-discovered controller VID={:#06x} PID={:#06x}",
                    device.vendor_id, device.product_id
                );
                device.product_id
            }
        };

        let transport = UsbTransport::open(config.vendor_id, product_id)?;
        let executor =
            CommandExecutor::with_clock(transport, SystemClock, config.wait_timeout());
        Self::open(executor, MotionSettings::from(config))
    }
}

impl<T: Transport, C: Clock> Controller<T, C> {
    /// Wrap an executor and apply velocity/acceleration to all channels
    pub fn new(executor: CommandExecutor<T, C>, settings: MotionSettings) -> Result<Self> {
        let mut controller = Self { executor };
        controller.initialize(settings.velocity, settings.acceleration)?;
        Ok(controller)
    }

    /// Confirm the controller answers, then apply velocity/acceleration
    ///
    /// Nothing is written to the channels unless `VE?` and every `QM?` reply
    /// is valid.
    pub fn open(executor: CommandExecutor<T, C>, settings: MotionSettings) -> Result<Self> {
        let mut controller = Self { executor };
        controller.confirm_connection()?;
        controller.initialize(settings.velocity, settings.acceleration)?;
        Ok(controller)
    }

    /// Set velocity then acceleration on channels 1-4
    pub fn initialize(&mut self, velocity: u32, acceleration: u32) -> Result<()> {
        info!(
            "Initializing channels {:?}: velocity={} acceleration={}",
            CHANNELS, velocity, acceleration
        );
        for channel in CHANNELS {
            self.set_velocity(channel, velocity)?;
            self.set_acceleration(channel, acceleration)?;
        }
        Ok(())
    }

    /// Log controller identity and the motor type of each channel
    pub fn confirm_connection(&mut self) -> Result<(ControllerInfo, [MotorType; 4])> {
        let details = self.controller_info()?;
        info!(
            "Connected to motor controller model {}, firmware {}",
            details.model, details.firmware
        );

        let mut motor_types = [MotorType::NoMotor; 4];
        for (slot, channel) in motor_types.iter_mut().zip(CHANNELS) {
            *slot = self.get_motor_type(channel)?;
            if slot.is_connected() {
                info!("Motor #{}: {}", channel, slot);
            } else {
                warn!("Motor #{}: {}", channel, slot);
            }
        }
        Ok((details, motor_types))
    }

    /// Forward a raw command string (console pass-through)
    pub fn execute(&mut self, line: &str) -> Result<Option<String>> {
        self.executor.execute(line)
    }

    pub fn executor(&self) -> &CommandExecutor<T, C> {
        &self.executor
    }

    // === Queries ===

    pub fn controller_info(&mut self) -> Result<ControllerInfo> {
        let command = Command::new(None, mnemonic::VERSION, Some(QUERY.to_string()));
        let reply = self.executor.query(&command)?;
        Ok(ControllerInfo::parse(&reply))
    }

    pub fn get_position(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::POSITION)
    }

    pub fn get_velocity(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::VELOCITY)
    }

    pub fn get_acceleration(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::ACCELERATION)
    }

    /// Absolute target position
    pub fn get_target(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::TARGET_ABSOLUTE)
    }

    /// Last relative move target
    pub fn get_target_relative(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::TARGET_RELATIVE)
    }

    pub fn get_home_position(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::HOME)
    }

    pub fn get_motion_direction(&mut self, channel: u8) -> Result<i64> {
        self.query_int(channel, mnemonic::MOVE_INDEFINITELY)
    }

    pub fn get_motion_done(&mut self, channel: u8) -> Result<bool> {
        Ok(self.query_int(channel, mnemonic::MOTION_DONE)? != 0)
    }

    pub fn get_motor_type(&mut self, channel: u8) -> Result<MotorType> {
        let code = self.query_int(channel, mnemonic::MOTOR_TYPE)?;
        MotorType::from_code(code).ok_or_else(|| Error::InvalidReply {
            command: Command::query(channel, mnemonic::MOTOR_TYPE).to_string(),
            reply: code.to_string(),
        })
    }

    // === Configuration ===

    pub fn set_velocity(&mut self, channel: u8, velocity: u32) -> Result<()> {
        self.send(Command::set(channel, mnemonic::VELOCITY, velocity))
    }

    pub fn set_acceleration(&mut self, channel: u8, acceleration: u32) -> Result<()> {
        self.send(Command::set(channel, mnemonic::ACCELERATION, acceleration))
    }

    /// Define the current position as home (zero)
    pub fn set_home_position(&mut self, channel: u8) -> Result<()> {
        self.send(Command::new(Some(channel), mnemonic::HOME, None))
    }

    // === Motion ===

    /// Move `steps` relative to the current position and block until done
    pub fn move_relative(&mut self, channel: u8, steps: i64) -> Result<WaitOutcome> {
        info!("Moving channel {} by {} steps", channel, steps);
        self.send(Command::set(channel, mnemonic::TARGET_RELATIVE, steps))?;

        let velocity = self.get_velocity(channel)?;
        self.estimated_delay(steps.unsigned_abs(), velocity);
        self.wait(None)
    }

    /// Move to an absolute target and block until done
    pub fn move_to_target(&mut self, channel: u8, target: i64) -> Result<WaitOutcome> {
        info!("Moving channel {} to {}", channel, target);
        self.send(Command::set(channel, mnemonic::TARGET_ABSOLUTE, target))?;

        let position = self.get_position(channel)?;
        let velocity = self.get_velocity(channel)?;
        self.estimated_delay(target.abs_diff(position), velocity);
        self.wait(None)
    }

    /// Start a continuous move and block until it is stopped elsewhere
    ///
    /// The motion never ends on its own; without an external `ST` this
    /// returns `MotionTimeout`.
    pub fn move_indefinitely(
        &mut self,
        channel: u8,
        direction: Direction,
    ) -> Result<WaitOutcome> {
        info!(
            "Moving channel {} indefinitely ({})",
            channel,
            direction.as_sign()
        );
        self.send(Command::set(
            channel,
            mnemonic::MOVE_INDEFINITELY,
            direction.as_sign(),
        ))?;
        self.executor.clock().sleep(SETTLE_DELAY);
        self.wait(None)
    }

    /// Stop one channel (if given) and then all channels
    ///
    /// `None` or channel 0 only sends the global stop.
    pub fn stop_motion(&mut self, channel: Option<u8>) -> Result<()> {
        match channel {
            None | Some(0) => {}
            Some(channel) => {
                info!("Stopping channel {}", channel);
                self.send(Command::new(Some(channel), mnemonic::STOP, None))?;
            }
        }
        info!("Stopping all motors");
        self.executor
            .execute_command(&Command::new(None, mnemonic::STOP, None))?;
        Ok(())
    }

    /// Block until every channel reports motion done
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        self.executor.wait(timeout)
    }

    // === Helpers ===

    fn send(&mut self, command: Command) -> Result<()> {
        if let Some(channel) = command.channel {
            check_channel(channel)?;
        }
        self.executor.execute_command(&command)?;
        Ok(())
    }

    fn query_int(&mut self, channel: u8, mnemonic: &str) -> Result<i64> {
        let channel = check_channel(channel)?;
        self.executor.query_int(&Command::query(channel, mnemonic))
    }

    /// Sleep for the expected travel time so the waiter does not poll a
    /// motion that is known to still be running. Capped at the wait timeout.
    fn estimated_delay(&self, steps: u64, velocity: i64) {
        if velocity <= 0 || steps == 0 {
            return;
        }
        let cap = self.executor.wait_timeout();
        let delay = Duration::try_from_secs_f64(steps as f64 / velocity as f64)
            .map_or(cap, |estimate| estimate.min(cap));
        debug!("Expected travel time {:?}", delay);
        self.executor.clock().sleep(delay);
    }
}

impl<T: Transport, C: Clock> Drop for Controller<T, C> {
    fn drop(&mut self) {
        // Try to stop motors when the controller goes away (safety measure)
        if let Err(e) = self
            .executor
            .execute_command(&Command::new(None, mnemonic::STOP, None))
        {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

fn check_channel(channel: u8) -> Result<u8> {
    if CHANNELS.contains(&channel) {
        Ok(channel)
    } else {
        Err(Error::InvalidChannel(channel))
    }
}
