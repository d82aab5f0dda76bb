// USB driver for Newport/New Focus 8742 open-loop picomotor controllers

pub mod cli;
pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod jog;
pub mod motor;

#[cfg(test)]
mod testing;

pub use config::ControllerConfig;
pub use error::{Error, Result};
pub use motor::{Controller, Direction};
