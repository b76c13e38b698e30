// Simulated hardware backend
//
// Every channel is a shaft with a position (ticks) and a velocity
// (ticks/s). Motors drive their shaft, the absolute sensor reads it mounted
// inverted, and encoders bound with ports[0] == channel follow it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use super::hal::{AbsoluteSensor, Hardware, HardwareFault, IncrementalEncoder, MotorController};
use crate::config::TICKS_PER_ROTATION;

/// Shaft speed at full power: two revolutions per second
pub const SIM_FREE_SPEED_TICKS_PER_SEC: f64 = 2.0 * TICKS_PER_ROTATION;

#[derive(Debug, Default)]
struct Shaft {
    bound: bool,
    output: f64,
    position: f64,
    velocity: f64,
    faulted: bool,
}

type SharedShaft = Rc<RefCell<Shaft>>;

#[derive(Default)]
pub struct SimHardware {
    shafts: BTreeMap<u8, SharedShaft>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    fn shaft(&mut self, channel: u8) -> SharedShaft {
        Rc::clone(self.shafts.entry(channel).or_default())
    }

    fn bind(&mut self, channel: u8) -> Result<SimMotor, HardwareFault> {
        let shaft = self.shaft(channel);
        {
            let mut state = shaft.borrow_mut();
            if state.bound {
                return Err(HardwareFault::ChannelInUse { channel });
            }
            state.bound = true;
        }
        Ok(SimMotor { channel, shaft })
    }

    /// Place a shaft so its absolute sensor reads `ticks`
    pub fn set_absolute_position(&mut self, channel: u8, ticks: f64) {
        self.shaft(channel).borrow_mut().position = -ticks;
    }

    /// Spin a shaft at a fixed rate without any motor power
    pub fn set_velocity(&mut self, channel: u8, ticks_per_sec: f64) {
        self.shaft(channel).borrow_mut().velocity = ticks_per_sec;
    }

    /// Last power written to a channel
    pub fn output(&self, channel: u8) -> Option<f64> {
        self.shafts.get(&channel).map(|s| s.borrow().output)
    }

    /// Make every access to a channel fail until cleared
    pub fn set_fault(&mut self, channel: u8, faulted: bool) {
        self.shaft(channel).borrow_mut().faulted = faulted;
    }
}

impl Hardware for SimHardware {
    type DriveMotor = SimMotor;
    type TurningMotor = SimMotor;
    type Encoder = SimEncoder;

    fn drive_motor(&mut self, channel: u8) -> Result<SimMotor, HardwareFault> {
        self.bind(channel)
    }

    fn turning_motor(&mut self, channel: u8) -> Result<SimMotor, HardwareFault> {
        self.bind(channel)
    }

    fn encoder(&mut self, ports: [u8; 2], reversed: bool) -> Result<SimEncoder, HardwareFault> {
        let shaft = self.shaft(ports[0]);
        let zero = shaft.borrow().position;
        Ok(SimEncoder {
            channel: ports[0],
            shaft,
            reversed,
            distance_per_pulse: 1.0,
            zero,
        })
    }

    fn advance(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        for (channel, shaft) in &self.shafts {
            let mut s = shaft.borrow_mut();
            if s.bound {
                let output = s.output;
                s.velocity = output * SIM_FREE_SPEED_TICKS_PER_SEC;
            }
            let velocity = s.velocity;
            s.position += velocity * dt;
            trace!(channel, position = s.position, velocity = s.velocity, "sim step");
        }
    }
}

pub struct SimMotor {
    channel: u8,
    shaft: SharedShaft,
}

impl SimMotor {
    fn check(&self) -> Result<(), HardwareFault> {
        if self.shaft.borrow().faulted {
            return Err(HardwareFault::Rejected {
                channel: self.channel,
            });
        }
        Ok(())
    }
}

impl MotorController for SimMotor {
    fn set(&mut self, power: f64) -> Result<(), HardwareFault> {
        self.check()?;
        self.shaft.borrow_mut().output = power.clamp(-1.0, 1.0);
        Ok(())
    }
}

impl AbsoluteSensor for SimMotor {
    fn selected_sensor_position(&mut self) -> Result<f64, HardwareFault> {
        self.check()?;
        let position = self.shaft.borrow().position;
        Ok((-position).rem_euclid(TICKS_PER_ROTATION))
    }
}

pub struct SimEncoder {
    channel: u8,
    shaft: SharedShaft,
    reversed: bool,
    distance_per_pulse: f64,
    zero: f64,
}

impl SimEncoder {
    fn scale(&self) -> Result<f64, HardwareFault> {
        if self.shaft.borrow().faulted {
            return Err(HardwareFault::Rejected {
                channel: self.channel,
            });
        }
        let direction = if self.reversed { -1.0 } else { 1.0 };
        Ok(self.distance_per_pulse * direction)
    }
}

impl IncrementalEncoder for SimEncoder {
    fn set_distance_per_pulse(&mut self, distance_per_pulse: f64) {
        self.distance_per_pulse = distance_per_pulse;
    }

    fn distance(&mut self) -> Result<f64, HardwareFault> {
        let scale = self.scale()?;
        Ok((self.shaft.borrow().position - self.zero) * scale)
    }

    fn rate(&mut self) -> Result<f64, HardwareFault> {
        let scale = self.scale()?;
        Ok(self.shaft.borrow().velocity * scale)
    }

    fn reset(&mut self) -> Result<(), HardwareFault> {
        self.scale()?;
        self.zero = self.shaft.borrow().position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_binds_once() {
        let mut hw = SimHardware::new();
        assert!(hw.drive_motor(1).is_ok());
        assert!(matches!(
            hw.turning_motor(1),
            Err(HardwareFault::ChannelInUse { channel: 1 })
        ));
    }

    #[test]
    fn test_absolute_sensor_wraps_to_one_rotation() {
        let mut hw = SimHardware::new();
        let mut motor = hw.turning_motor(2).unwrap();

        hw.set_absolute_position(2, 1024.0);
        assert_eq!(motor.selected_sensor_position().unwrap(), 1024.0);

        hw.set_absolute_position(2, 4096.0 + 10.0);
        assert_eq!(motor.selected_sensor_position().unwrap(), 10.0);
    }

    #[test]
    fn test_positive_power_lowers_absolute_reading() {
        let mut hw = SimHardware::new();
        let mut motor = hw.turning_motor(2).unwrap();
        hw.set_absolute_position(2, 2048.0);

        motor.set(0.5).unwrap();
        hw.advance(Duration::from_millis(100));

        // 0.5 * 8192 ticks/s * 0.1 s = 409.6 ticks
        let reading = motor.selected_sensor_position().unwrap();
        assert!((reading - (2048.0 - 409.6)).abs() < 1e-9, "reading {}", reading);
    }

    #[test]
    fn test_encoder_follows_shaft() {
        let mut hw = SimHardware::new();
        let mut motor = hw.drive_motor(1).unwrap();
        let mut encoder = hw.encoder([1, 0], false).unwrap();
        let mut reversed = hw.encoder([1, 0], true).unwrap();
        encoder.set_distance_per_pulse(0.5);
        reversed.set_distance_per_pulse(0.5);

        motor.set(1.0).unwrap();
        hw.advance(Duration::from_millis(500));

        assert_eq!(encoder.rate().unwrap(), SIM_FREE_SPEED_TICKS_PER_SEC * 0.5);
        assert_eq!(reversed.rate().unwrap(), -SIM_FREE_SPEED_TICKS_PER_SEC * 0.5);
        assert_eq!(encoder.distance().unwrap(), SIM_FREE_SPEED_TICKS_PER_SEC * 0.5 * 0.5);

        encoder.reset().unwrap();
        assert_eq!(encoder.distance().unwrap(), 0.0);
    }

    #[test]
    fn test_fault_rejects_access() {
        let mut hw = SimHardware::new();
        let mut motor = hw.drive_motor(3).unwrap();
        hw.set_fault(3, true);
        assert!(matches!(
            motor.set(0.2),
            Err(HardwareFault::Rejected { channel: 3 })
        ));

        hw.set_fault(3, false);
        assert!(motor.set(0.2).is_ok());
        assert_eq!(hw.output(3), Some(0.2));
    }
}
