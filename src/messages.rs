// Define message types for the runtime

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::swerve::{Rotation2d, SwerveModuleState};

/// Target for one wheel, addressed by module name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSetpoint {
    pub name: String,
    pub speed_mps: f64,
    pub angle_rad: f64,
}

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub modules: Vec<ModuleSetpoint>,
}

impl DriveCommand {
    /// Setpoint addressed to `name`, if any
    pub fn setpoint(&self, name: &str) -> Option<&ModuleSetpoint> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl From<&ModuleSetpoint> for SwerveModuleState {
    fn from(setpoint: &ModuleSetpoint) -> Self {
        SwerveModuleState::new(setpoint.speed_mps, Rotation2d::from_radians(setpoint.angle_rad))
    }
}

/// Capture the current steering position as zero
/// No module name means every module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrateCommand {
    #[serde(default)]
    pub module: Option<String>,
}

/// Dashboard values from one control cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub values: BTreeMap<String, f64>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    HardwareFault,
}
