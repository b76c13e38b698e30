// Feetech hardware backend for swerve modules
//
// Binds drive and turning motors (by servo ID) and shaft-following encoders on
// one shared serial bus.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::feetech::{power_to_duty, FeetechBus, OperatingMode};
use super::hal::{AbsoluteSensor, Hardware, HardwareFault, IncrementalEncoder, MotorController};

/// Half a revolution in position ticks; larger jumps between polls are wraps
const HALF_TURN_TICKS: i32 = 2048;

type SharedBus = Rc<RefCell<FeetechBus>>;

/// Hardware backend owning the servo bus
pub struct FeetechHardware {
    bus: SharedBus,
    bound: BTreeSet<u8>,
}

impl FeetechHardware {
    /// Open the servo bus on the specified serial port
    pub fn open(port: &str) -> Result<Self, HardwareFault> {
        info!("Opening motor bus on {}", port);
        let bus = FeetechBus::open(port)?;
        Ok(Self {
            bus: Rc::new(RefCell::new(bus)),
            bound: BTreeSet::new(),
        })
    }

    /// Claim a servo and put it in open-loop PWM mode
    ///
    /// Disables torque, switches the operating mode, and re-enables torque.
    fn bind_motor(&mut self, id: u8) -> Result<FeetechMotor, HardwareFault> {
        if self.bound.contains(&id) {
            return Err(HardwareFault::ChannelInUse { channel: id });
        }

        let mut bus = self.bus.borrow_mut();
        match bus.ping(id) {
            Ok(true) => debug!("Motor {} responding", id),
            Ok(false) => {
                warn!("Motor {} not responding to ping", id);
                return Err(HardwareFault::NotResponding { channel: id });
            }
            Err(e) => return Err(e.into()),
        }

        bus.disable_torque(id)?;
        bus.set_operating_mode(id, OperatingMode::Pwm)?;
        bus.enable_torque(id)?;
        drop(bus);

        self.bound.insert(id);
        info!("Motor {} bound in PWM mode", id);
        Ok(FeetechMotor {
            bus: Rc::clone(&self.bus),
            id,
        })
    }
}

impl Hardware for FeetechHardware {
    type DriveMotor = FeetechMotor;
    type TurningMotor = FeetechMotor;
    type Encoder = FeetechEncoder;

    fn drive_motor(&mut self, channel: u8) -> Result<FeetechMotor, HardwareFault> {
        self.bind_motor(channel)
    }

    fn turning_motor(&mut self, channel: u8) -> Result<FeetechMotor, HardwareFault> {
        self.bind_motor(channel)
    }

    fn encoder(&mut self, ports: [u8; 2], reversed: bool) -> Result<FeetechEncoder, HardwareFault> {
        let id = ports[0];
        let position = self.bus.borrow_mut().get_position(id)?;
        debug!("Encoder on motor {} starts at {} ticks", id, position);
        Ok(FeetechEncoder {
            bus: Rc::clone(&self.bus),
            id,
            reversed,
            distance_per_pulse: 1.0,
            ticks: TickCounter::new(position),
        })
    }
}

/// One servo on the bus, driven open-loop
pub struct FeetechMotor {
    bus: SharedBus,
    id: u8,
}

impl MotorController for FeetechMotor {
    fn set(&mut self, power: f64) -> Result<(), HardwareFault> {
        let duty = power_to_duty(power);
        self.bus.borrow_mut().set_pwm(self.id, duty)?;
        Ok(())
    }
}

impl AbsoluteSensor for FeetechMotor {
    fn selected_sensor_position(&mut self) -> Result<f64, HardwareFault> {
        let ticks = self.bus.borrow_mut().get_position(self.id)?;
        Ok(ticks as f64)
    }
}

impl Drop for FeetechMotor {
    fn drop(&mut self) {
        // Try to stop the motor when its owner goes away (safety measure)
        if let Err(e) = self.set(0.0) {
            warn!("Failed to stop motor {} on drop: {}", self.id, e);
        }
    }
}

/// Multi-turn tick count built from 0..4095 shaft readings
#[derive(Debug, Clone, Copy, PartialEq)]
struct TickCounter {
    last_position: u16,
    count: i64,
}

impl TickCounter {
    fn new(position: u16) -> Self {
        Self {
            last_position: position,
            count: 0,
        }
    }

    /// Fold in a new reading; the shaft must have moved less than half a turn
    fn update(&mut self, position: u16) -> i64 {
        self.count += unwrap_delta(self.last_position, position) as i64;
        self.last_position = position;
        self.count
    }

    fn reset(&mut self, position: u16) {
        *self = Self::new(position);
    }
}

/// Incremental encoder following a servo shaft
///
/// Every `distance` and `rate` call polls the shaft position. The drive
/// encoder's rate is read each control cycle, which keeps its count valid.
/// Anything else must be polled at least twice per revolution.
pub struct FeetechEncoder {
    bus: SharedBus,
    id: u8,
    reversed: bool,
    distance_per_pulse: f64,
    ticks: TickCounter,
}

impl FeetechEncoder {
    fn direction(&self) -> f64 {
        if self.reversed { -1.0 } else { 1.0 }
    }

    fn poll(&mut self) -> Result<i64, HardwareFault> {
        let position = self.bus.borrow_mut().get_position(self.id)?;
        Ok(self.ticks.update(position))
    }
}

impl IncrementalEncoder for FeetechEncoder {
    fn set_distance_per_pulse(&mut self, distance_per_pulse: f64) {
        self.distance_per_pulse = distance_per_pulse;
    }

    fn distance(&mut self) -> Result<f64, HardwareFault> {
        let count = self.poll()?;
        Ok(count as f64 * self.distance_per_pulse * self.direction())
    }

    fn rate(&mut self) -> Result<f64, HardwareFault> {
        self.poll()?;
        let ticks_per_sec = self.bus.borrow_mut().get_velocity(self.id)?;
        Ok(ticks_per_sec as f64 * self.distance_per_pulse * self.direction())
    }

    fn reset(&mut self) -> Result<(), HardwareFault> {
        let position = self.bus.borrow_mut().get_position(self.id)?;
        self.ticks.reset(position);
        Ok(())
    }
}

/// Signed tick change between two 0..4095 readings, taking the short way round
fn unwrap_delta(previous: u16, current: u16) -> i32 {
    let full_turn = 2 * HALF_TURN_TICKS;
    let delta = current as i32 - previous as i32;
    (delta + HALF_TURN_TICKS).rem_euclid(full_turn) - HALF_TURN_TICKS
}
