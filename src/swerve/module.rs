// One swerve wheel: drive speed loop, steering angle loop, zero offset
//
// Called once per control period by a single owner. The only state kept
// between cycles is the steering offset and the PID histories.

use std::f64::consts::PI;

use tracing::{info, trace, warn};

use super::pid::PidController;
use super::state::{Rotation2d, SwerveModuleState};
use crate::config::{ModuleConfig, ModuleConstants};
use crate::motor::{AbsoluteSensor, Hardware, HardwareFault, IncrementalEncoder, MotorController};
use crate::preferences::{PreferenceStore, PreferencesError};
use crate::telemetry::Telemetry;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),
}

/// Where the in-memory steering offset came from at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSource {
    Persisted,
    /// Nothing stored for this module; the offset is the store default (0.0)
    Defaulted,
}

/// What one control step applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleOutput {
    /// Target after optimization
    pub state: SwerveModuleState,
    pub drive_power: f64,
    pub turn_power: f64,
}

/// Steering angle in radians from a raw absolute reading
///
/// The sensor counts up as the logical angle goes down.
pub fn steering_angle(raw_ticks: f64, offset: f64, ticks_per_rotation: f64) -> f64 {
    (raw_ticks - offset) / -ticks_per_rotation * 2.0 * PI
}

pub struct SwerveModule<H: Hardware> {
    name: String,
    drive_motor: H::DriveMotor,
    turning_motor: H::TurningMotor,
    drive_encoder: H::Encoder,
    turning_encoder: H::Encoder,
    drive_pid: PidController,
    turning_pid: PidController,
    ticks_per_rotation: f64,
    offset: f64,
}

impl<H: Hardware> SwerveModule<H> {
    /// Bind the module's devices and configure encoders and controllers
    pub fn new(
        hardware: &mut H,
        config: &ModuleConfig,
        constants: &ModuleConstants,
    ) -> Result<Self, HardwareFault> {
        let drive_motor = hardware.drive_motor(config.drive_channel)?;
        let turning_motor = hardware.turning_motor(config.turning_channel)?;

        let mut drive_encoder =
            hardware.encoder(config.drive_encoder_ports, config.drive_encoder_reversed)?;
        drive_encoder.set_distance_per_pulse(constants.drive_encoder_distance_per_pulse);

        let mut turning_encoder =
            hardware.encoder(config.turning_encoder_ports, config.turning_encoder_reversed)?;
        turning_encoder.set_distance_per_pulse(constants.turning_encoder_distance_per_pulse);

        let drive_pid = PidController::new(constants.drive_gains, constants.period);
        let turning_pid = PidController::new(constants.turning_gains, constants.period)
            .with_continuous_input(0.0, 2.0 * PI);

        info!(
            "Module {} bound: drive={}, turning={}",
            config.name, config.drive_channel, config.turning_channel
        );

        Ok(Self {
            name: config.name.to_string(),
            drive_motor,
            turning_motor,
            drive_encoder,
            turning_encoder,
            drive_pid,
            turning_pid,
            ticks_per_rotation: constants.ticks_per_rotation,
            offset: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw absolute reading that corresponds to zero steering angle
    pub fn offset(&self) -> f64 {
        self.offset
    }

    fn current_angle(&mut self) -> Result<f64, HardwareFault> {
        let raw = self.turning_motor.selected_sensor_position()?;
        Ok(steering_angle(raw, self.offset, self.ticks_per_rotation))
    }

    /// Current wheel speed and steering angle
    pub fn get_state(&mut self) -> Result<SwerveModuleState, HardwareFault> {
        let speed = self.drive_encoder.rate()?;
        let angle = self.current_angle()?;
        Ok(SwerveModuleState::new(speed, Rotation2d::from_radians(angle)))
    }

    /// Run one control step toward `desired` and write both motors
    pub fn set_desired_state(
        &mut self,
        desired: SwerveModuleState,
        telemetry: &mut impl Telemetry,
    ) -> Result<ModuleOutput, HardwareFault> {
        let angle = self.current_angle()?;
        let state = desired.optimize(Rotation2d::from_radians(angle));

        let velocity = self.drive_encoder.rate()?;
        let drive_power = self.drive_pid.calculate(velocity, state.speed);
        let turn_power = self.turning_pid.calculate(angle, state.angle.radians());

        self.drive_motor.set(drive_power)?;
        self.turning_motor.set(turn_power)?;

        trace!(
            "{}: angle={:.3} target={:.3} speed={:.3} drive={:.3} turn={:.3}",
            self.name,
            angle,
            state.angle.radians(),
            state.speed,
            drive_power,
            turn_power
        );

        let measured = Rotation2d::from_radians(angle).radians();
        telemetry.put_number(&format!("{} Angle", self.name), measured);
        telemetry.put_number(&format!("{} Drive Power", self.name), drive_power);
        telemetry.put_number(&format!("{} Turn Power", self.name), turn_power);

        Ok(ModuleOutput {
            state,
            drive_power,
            turn_power,
        })
    }

    /// Zero both incremental encoders
    pub fn reset_encoders(&mut self) -> Result<(), HardwareFault> {
        self.drive_encoder.reset()?;
        self.turning_encoder.reset()
    }

    /// Accumulated drive distance (m) and turning encoder angle (rad)
    pub fn encoder_distances(&mut self) -> Result<(f64, f64), HardwareFault> {
        Ok((self.drive_encoder.distance()?, self.turning_encoder.distance()?))
    }

    /// Take the current steering position as zero and persist it
    ///
    /// The wheel must be held at its physical zero orientation.
    pub fn set_wheel_offset(&mut self, store: &mut impl PreferenceStore) -> Result<f64, ModuleError> {
        let position = self.turning_motor.selected_sensor_position()?;
        store.set_double(&self.name, position)?;
        self.offset = position;
        info!("Module {} offset set to {} ticks", self.name, position);
        Ok(position)
    }

    /// Restore the steering offset persisted for this module
    pub fn load_wheel_offset(&mut self, store: &impl PreferenceStore) -> OffsetSource {
        match store.get_double(&self.name) {
            Some(position) => {
                self.offset = position;
                info!("Module {} offset loaded: {} ticks", self.name, position);
                OffsetSource::Persisted
            }
            None => {
                self.offset = 0.0;
                warn!(
                    "Module {} has no stored offset, steering angles are uncalibrated",
                    self.name
                );
                OffsetSource::Defaulted
            }
        }
    }
}
