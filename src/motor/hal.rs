// Capability traits for the devices a swerve module is built from
//
// Every call that touches a device returns a HardwareFault on failure so the
// control code never depends on a particular driver's error type.

use std::time::Duration;

use super::feetech::FeetechError;

/// Failure to bind or talk to a device
#[derive(Debug, thiserror::Error)]
pub enum HardwareFault {
    #[error("Motor bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Channel {channel} is already bound")]
    ChannelInUse { channel: u8 },

    #[error("Device on channel {channel} is not responding")]
    NotResponding { channel: u8 },

    #[error("Device on channel {channel} rejected the request")]
    Rejected { channel: u8 },
}

/// Actuator taking a normalized power command in [-1, 1]
pub trait MotorController {
    fn set(&mut self, power: f64) -> Result<(), HardwareFault>;
}

/// Onboard absolute position sensor, raw ticks (0..4095 per rotation)
pub trait AbsoluteSensor {
    fn selected_sensor_position(&mut self) -> Result<f64, HardwareFault>;
}

/// Incremental position/velocity sensor
pub trait IncrementalEncoder {
    fn set_distance_per_pulse(&mut self, distance_per_pulse: f64);

    /// Accumulated distance since the last reset
    fn distance(&mut self) -> Result<f64, HardwareFault>;

    /// Instantaneous rate in distance units per second
    fn rate(&mut self) -> Result<f64, HardwareFault>;

    fn reset(&mut self) -> Result<(), HardwareFault>;
}

/// A hardware backend able to bind devices from wiring numbers
pub trait Hardware {
    type DriveMotor: MotorController;
    type TurningMotor: MotorController + AbsoluteSensor;
    type Encoder: IncrementalEncoder;

    fn drive_motor(&mut self, channel: u8) -> Result<Self::DriveMotor, HardwareFault>;

    fn turning_motor(&mut self, channel: u8) -> Result<Self::TurningMotor, HardwareFault>;

    fn encoder(&mut self, ports: [u8; 2], reversed: bool) -> Result<Self::Encoder, HardwareFault>;

    /// Called once per control period after outputs are written.
    /// Real hardware moves on its own, so the default does nothing.
    fn advance(&mut self, _dt: Duration) {}
}
