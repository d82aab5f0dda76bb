// Motor control module for the 8742 picomotor controller
//
// Provides:
// - ASCII command codec and reply decoding
// - USB transport behind the Transport trait
// - Synchronous command executor and motion-completion waiter
// - High-level controller API

pub mod driver;
pub mod executor;
pub mod protocol;
pub mod transport;
pub mod waiter;

pub use driver::{Controller, MotionSettings};
pub use executor::CommandExecutor;
pub use protocol::{Command, ControllerInfo, Direction, MotorType};
pub use transport::{Transport, UsbTransport};
pub use waiter::{Clock, MotionWaiter, SystemClock, WaitOutcome};
