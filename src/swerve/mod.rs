// Swerve module control
//
// Provides:
// - Wheel state and shortest-path steering optimization
// - PID controller with wrapping input
// - The per-wheel control step and steering offset calibration

mod module;
pub mod pid;
pub mod state;

pub use module::{steering_angle, ModuleError, ModuleOutput, OffsetSource, SwerveModule};
pub use pid::PidController;
pub use state::{Rotation2d, SwerveModuleState};
