// Timeouts, topics, module layout and control constants
use std::f64::consts::PI;
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MODULES: &str = "swerve/cmd/modules"; // per-module setpoints
pub const TOPIC_CMD_CALIBRATE: &str = "swerve/cmd/calibrate"; // zero offset capture
pub const TOPIC_TELEMETRY: &str = "swerve/state/telemetry"; // dashboard numbers
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for the Feetech servo bus
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Enable hardware motor control (set to false to run against the simulated backend)
pub const MOTOR_ENABLED: bool = true;

// Where steering offsets survive power cycles
pub const PREFERENCES_PATH: &str = "swerve_preferences.json";

/// Absolute sensor full scale: one mechanical rotation
pub const TICKS_PER_ROTATION: f64 = 4096.0;

/// Incremental encoder counts per revolution
pub const ENCODER_CPR: f64 = 4096.0;

pub const WHEEL_DIAMETER_M: f64 = 0.1;

/// Linear distance travelled per drive encoder pulse (m)
pub const DRIVE_ENCODER_DISTANCE_PER_PULSE: f64 = (WHEEL_DIAMETER_M * PI) / ENCODER_CPR;

/// Steering angle per turning encoder pulse (rad)
pub const TURNING_ENCODER_DISTANCE_PER_PULSE: f64 = (2.0 * PI) / ENCODER_CPR;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Read-only constants shared by every module instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleConstants {
    pub ticks_per_rotation: f64,
    pub drive_encoder_distance_per_pulse: f64,
    pub turning_encoder_distance_per_pulse: f64,
    pub drive_gains: PidGains,
    pub turning_gains: PidGains,
    /// Control period in seconds (PID integral and derivative step)
    pub period: f64,
}

impl ModuleConstants {
    pub const DEFAULT: Self = Self {
        ticks_per_rotation: TICKS_PER_ROTATION,
        drive_encoder_distance_per_pulse: DRIVE_ENCODER_DISTANCE_PER_PULSE,
        turning_encoder_distance_per_pulse: TURNING_ENCODER_DISTANCE_PER_PULSE,
        drive_gains: PidGains {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        },
        turning_gains: PidGains {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        },
        period: 1.0 / LOOP_HZ as f64,
    };
}

impl Default for ModuleConstants {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Wiring of one swerve module
///
/// On the Feetech bus channels are servo IDs and the first encoder port is
/// the servo whose shaft the encoder follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleConfig {
    pub name: &'static str,
    pub drive_channel: u8,
    pub turning_channel: u8,
    pub drive_encoder_ports: [u8; 2],
    pub turning_encoder_ports: [u8; 2],
    pub drive_encoder_reversed: bool,
    pub turning_encoder_reversed: bool,
}

pub const FRONT_LEFT: ModuleConfig = ModuleConfig {
    name: "FrontLeft",
    drive_channel: 1,
    turning_channel: 2,
    drive_encoder_ports: [1, 0],
    turning_encoder_ports: [2, 0],
    drive_encoder_reversed: false,
    turning_encoder_reversed: false,
};

pub const FRONT_RIGHT: ModuleConfig = ModuleConfig {
    name: "FrontRight",
    drive_channel: 3,
    turning_channel: 4,
    drive_encoder_ports: [3, 0],
    turning_encoder_ports: [4, 0],
    drive_encoder_reversed: false,
    turning_encoder_reversed: false,
};

pub const REAR_LEFT: ModuleConfig = ModuleConfig {
    name: "RearLeft",
    drive_channel: 5,
    turning_channel: 6,
    drive_encoder_ports: [5, 0],
    turning_encoder_ports: [6, 0],
    drive_encoder_reversed: false,
    turning_encoder_reversed: false,
};

pub const REAR_RIGHT: ModuleConfig = ModuleConfig {
    name: "RearRight",
    drive_channel: 7,
    turning_channel: 8,
    drive_encoder_ports: [7, 0],
    turning_encoder_ports: [8, 0],
    drive_encoder_reversed: false,
    turning_encoder_reversed: false,
};

/// All modules on the robot
pub const MODULES: [ModuleConfig; 4] = [FRONT_LEFT, FRONT_RIGHT, REAR_LEFT, REAR_RIGHT];
