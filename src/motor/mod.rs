// Motor and sensor backends for swerve modules
//
// Provides:
// - Capability traits the module control code is written against
// - Feetech STS serial protocol implementation
// - Feetech and simulated hardware backends

mod driver;
pub mod feetech;
pub mod hal;
pub mod sim;

pub use driver::{FeetechEncoder, FeetechHardware, FeetechMotor};
pub use feetech::{FeetechBus, FeetechError};
pub use hal::{AbsoluteSensor, Hardware, HardwareFault, IncrementalEncoder, MotorController};
pub use sim::SimHardware;
