// 50 Hz loop driving every swerve module, with command watchdog
// Note: if the command source stops publishing, every wheel holds its current
// heading at zero speed until fresh setpoints arrive

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    ModuleConfig, ModuleConstants, CMD_TIMEOUT, LOOP_HZ, MODULES, TOPIC_CMD_CALIBRATE,
    TOPIC_CMD_MODULES, TOPIC_HEALTH, TOPIC_TELEMETRY,
};
use crate::messages::{CalibrateCommand, DriveCommand, ModuleSetpoint, RuntimeHealth, TelemetryFrame};
use crate::motor::{FeetechHardware, Hardware, HardwareFault, SimHardware};
use crate::preferences::{JsonPreferences, MemoryPreferences, PreferenceStore};
use crate::swerve::{ModuleError, ModuleOutput, OffsetSource, SwerveModule, SwerveModuleState};
use crate::telemetry::TelemetryBuffer;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where the runtime finds its hardware and stored offsets
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub port: String,
    pub preferences: PathBuf,
    /// Use the simulated backend; offsets then live in memory only
    pub simulate: bool,
}

pub struct Runtime<H: Hardware, P: PreferenceStore> {
    hardware: H,
    modules: Vec<SwerveModule<H>>,
    preferences: P,
    telemetry: TelemetryBuffer,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl<H: Hardware, P: PreferenceStore> Runtime<H, P> {
    /// Bind every module and restore its steering offset
    pub fn new(
        mut hardware: H,
        preferences: P,
        configs: &[ModuleConfig],
        constants: &ModuleConstants,
    ) -> Result<Self, ModuleError> {
        let mut modules = Vec::with_capacity(configs.len());
        for config in configs {
            let mut module = SwerveModule::new(&mut hardware, config, constants)?;
            if module.load_wheel_offset(&preferences) == OffsetSource::Defaulted {
                warn!("Run calibration for {} before driving", config.name);
            }
            modules.push(module);
        }

        Ok(Self {
            hardware,
            modules,
            preferences,
            telemetry: TelemetryBuffer::new(),
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn modules(&self) -> &[SwerveModule<H>] {
        &self.modules
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Capture zero offsets for one module, or all when `name` is None
    ///
    /// Returns the stored (module, ticks) pairs.
    pub fn calibrate(&mut self, name: Option<&str>) -> Result<Vec<(String, f64)>, ModuleError> {
        let mut captured = Vec::new();
        for module in self
            .modules
            .iter_mut()
            .filter(|m| name.is_none_or(|n| n == m.name()))
        {
            let offset = module.set_wheel_offset(&mut self.preferences)?;
            captured.push((module.name().to_string(), offset));
        }

        if captured.is_empty() {
            warn!("Calibration requested for unknown module {:?}", name);
        }
        Ok(captured)
    }

    /// Run one control cycle and return the telemetry it produced
    pub fn step(&mut self, dt: Duration) -> TelemetryFrame {
        let cmd_age = self.cmd_received_at.elapsed();
        let fresh = self.latest_cmd.is_some() && cmd_age <= CMD_TIMEOUT;

        if !fresh && self.latest_cmd.is_some() && self.health == RuntimeHealth::Ok {
            // Watchdog triggered - hold all wheels
            warn!("Command stale ({:?} old), holding wheels", cmd_age);
        }

        let cmd = if fresh { self.latest_cmd.as_ref() } else { None };
        let mut faulted = false;

        for module in &mut self.modules {
            let setpoint = cmd.and_then(|c| c.setpoint(module.name()));
            if let Err(e) = apply(module, setpoint, &mut self.telemetry) {
                if self.health != RuntimeHealth::HardwareFault {
                    warn!("Module {} fault: {}", module.name(), e);
                } else {
                    debug!("Module {} fault: {}", module.name(), e);
                }
                faulted = true;
            }
        }

        self.health = if faulted {
            RuntimeHealth::HardwareFault
        } else if fresh {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::CmdStale
        };

        self.hardware.advance(dt);
        self.telemetry.take_frame()
    }
}

/// Drive one module toward its setpoint, or hold heading at zero speed
fn apply<H: Hardware>(
    module: &mut SwerveModule<H>,
    setpoint: Option<&ModuleSetpoint>,
    telemetry: &mut TelemetryBuffer,
) -> Result<ModuleOutput, HardwareFault> {
    let desired = match setpoint {
        Some(setpoint) => SwerveModuleState::from(setpoint),
        None => SwerveModuleState::new(0.0, module.get_state()?.angle),
    };
    module.set_desired_state(desired, telemetry)
}

pub async fn run(options: &RunOptions) -> Result<(), BoxError> {
    if options.simulate {
        info!("Using simulated hardware");
        let runtime = Runtime::new(
            SimHardware::new(),
            MemoryPreferences::new(),
            &MODULES,
            &ModuleConstants::DEFAULT,
        )?;
        serve(runtime).await
    } else {
        let hardware = FeetechHardware::open(&options.port)?;
        let preferences = JsonPreferences::open(&options.preferences)?;
        let runtime = Runtime::new(hardware, preferences, &MODULES, &ModuleConstants::DEFAULT)?;
        serve(runtime).await
    }
}

/// Capture zero offsets without starting the control loop
pub fn calibrate(options: &RunOptions, module: Option<&str>) -> Result<Vec<(String, f64)>, BoxError> {
    let captured = if options.simulate {
        Runtime::new(
            SimHardware::new(),
            MemoryPreferences::new(),
            &MODULES,
            &ModuleConstants::DEFAULT,
        )?
        .calibrate(module)?
    } else {
        let hardware = FeetechHardware::open(&options.port)?;
        let preferences = JsonPreferences::open(&options.preferences)?;
        Runtime::new(hardware, preferences, &MODULES, &ModuleConstants::DEFAULT)?.calibrate(module)?
    };
    Ok(captured)
}

/// Offsets a run with these options would start from, per module
///
/// Simulated runs keep offsets in memory, so nothing stored on disk applies.
pub fn offsets(options: &RunOptions) -> Result<Vec<(&'static str, Option<f64>)>, BoxError> {
    if options.simulate {
        info!("Simulated runs never store offsets");
        Ok(stored_offsets(&MemoryPreferences::new(), &MODULES))
    } else {
        let preferences = JsonPreferences::open(&options.preferences)?;
        Ok(stored_offsets(&preferences, &MODULES))
    }
}

/// Stored offset for each module, None when never calibrated
pub fn stored_offsets(
    preferences: &impl PreferenceStore,
    configs: &[ModuleConfig],
) -> Vec<(&'static str, Option<f64>)> {
    configs
        .iter()
        .map(|config| (config.name, preferences.get_double(config.name)))
        .collect()
}

async fn serve<H: Hardware, P: PreferenceStore>(mut runtime: Runtime<H, P>) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let cmd_subscriber = session.declare_subscriber(TOPIC_CMD_MODULES).await?;
    let calibrate_subscriber = session.declare_subscriber(TOPIC_CMD_CALIBRATE).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {} modules, {}Hz loop, {}ms watchdog timeout",
        runtime.modules().len(),
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_MODULES, TOPIC_CMD_CALIBRATE);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = cmd_subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Calibration requests run between cycles
        while let Ok(Some(sample)) = calibrate_subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<CalibrateCommand>(&payload) {
                Ok(cmd) => match runtime.calibrate(cmd.module.as_deref()) {
                    Ok(captured) => info!("Calibrated {:?}", captured),
                    Err(e) => warn!("Calibration failed: {}", e),
                },
                Err(e) => warn!("Failed to parse calibrate command: {}", e),
            }
        }

        // 3. Control step (includes watchdog logic)
        let frame = runtime.step(period);

        // 4. Publish telemetry
        let frame_json = serde_json::to_string(&frame)?;
        pub_telemetry.put(frame_json).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DRIVE_ENCODER_DISTANCE_PER_PULSE, FRONT_LEFT, FRONT_RIGHT};
    use crate::motor::sim::SIM_FREE_SPEED_TICKS_PER_SEC;
    use std::f64::consts::FRAC_PI_2;

    const PERIOD: Duration = Duration::from_millis(20);

    fn runtime(prefs: MemoryPreferences) -> Runtime<SimHardware, MemoryPreferences> {
        Runtime::new(
            SimHardware::new(),
            prefs,
            &[FRONT_LEFT, FRONT_RIGHT],
            &ModuleConstants::DEFAULT,
        )
        .unwrap()
    }

    fn setpoint(name: &str, speed_mps: f64, angle_rad: f64) -> ModuleSetpoint {
        ModuleSetpoint {
            name: name.to_string(),
            speed_mps,
            angle_rad,
        }
    }

    #[test]
    fn test_offsets_loaded_at_startup() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_double("FrontRight", 812.0).unwrap();

        let rt = runtime(prefs);
        assert_eq!(rt.modules()[0].offset(), 0.0);
        assert_eq!(rt.modules()[1].offset(), 812.0);
    }

    #[test]
    fn test_no_command_holds_wheels() {
        let mut rt = runtime(MemoryPreferences::new());
        rt.hardware_mut()
            .set_absolute_position(FRONT_LEFT.turning_channel, 1024.0);

        let frame = rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(frame.values["FrontLeft Drive Power"], 0.0);
        assert!(frame.values["FrontLeft Turn Power"].abs() < 1e-9);
        assert!((frame.values["FrontLeft Angle"] + FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_command_drives_named_module() {
        let mut rt = runtime(MemoryPreferences::new());
        rt.on_command(DriveCommand {
            modules: vec![setpoint("FrontLeft", 0.4, 0.0)],
        });

        let frame = rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert!((frame.values["FrontLeft Drive Power"] - 0.4).abs() < 1e-9);
        // no setpoint for this one, so it holds
        assert_eq!(frame.values["FrontRight Drive Power"], 0.0);
    }

    #[test]
    fn test_stale_command_stops_wheels_and_holds_heading() {
        let mut rt = runtime(MemoryPreferences::new());
        rt.on_command(DriveCommand {
            modules: vec![setpoint("FrontLeft", 0.4, 0.0)],
        });

        rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        std::thread::sleep(CMD_TIMEOUT + Duration::from_millis(50));
        let frame = rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);

        // the wheel is still spinning from the last command, so a zero speed
        // target brakes against the measured rate
        let spinning = 0.4 * SIM_FREE_SPEED_TICKS_PER_SEC * DRIVE_ENCODER_DISTANCE_PER_PULSE;
        assert!((frame.values["FrontLeft Drive Power"] + spinning).abs() < 1e-9);
        assert!(frame.values["FrontLeft Turn Power"].abs() < 1e-9);
        assert!(frame.values["FrontLeft Angle"].abs() < 1e-9);

        rt.on_command(DriveCommand {
            modules: vec![setpoint("FrontLeft", 0.4, 0.0)],
        });
        rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_stored_offsets_lists_every_module() {
        let mut prefs = MemoryPreferences::new();
        prefs.set_double("FrontRight", 812.0).unwrap();

        let listed = stored_offsets(&prefs, &[FRONT_LEFT, FRONT_RIGHT]);
        assert_eq!(listed, vec![("FrontLeft", None), ("FrontRight", Some(812.0))]);
    }

    #[test]
    fn test_simulated_offsets_ignore_preferences_file() {
        let dir = std::env::temp_dir().join(format!("swerve-offsets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prefs.json");
        JsonPreferences::open(&path)
            .unwrap()
            .set_double("FrontLeft", 300.0)
            .unwrap();

        let mut options = RunOptions {
            port: String::new(),
            preferences: path,
            simulate: false,
        };
        let on_disk = offsets(&options).unwrap();
        assert_eq!(on_disk[0], ("FrontLeft", Some(300.0)));

        options.simulate = true;
        let simulated = offsets(&options).unwrap();
        assert_eq!(simulated.len(), MODULES.len());
        assert!(simulated.iter().all(|(_, offset)| offset.is_none()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_hardware_fault_is_reported_and_recovers() {
        let mut rt = runtime(MemoryPreferences::new());
        rt.hardware_mut().set_fault(FRONT_RIGHT.drive_channel, true);

        let frame = rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::HardwareFault);
        // the healthy module still ran
        assert!(frame.values.contains_key("FrontLeft Turn Power"));
        assert!(!frame.values.contains_key("FrontRight Turn Power"));

        rt.hardware_mut().set_fault(FRONT_RIGHT.drive_channel, false);
        rt.step(PERIOD);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_calibrate_one_and_all() {
        let mut rt = runtime(MemoryPreferences::new());
        rt.hardware_mut()
            .set_absolute_position(FRONT_LEFT.turning_channel, 100.0);
        rt.hardware_mut()
            .set_absolute_position(FRONT_RIGHT.turning_channel, 200.0);

        let one = rt.calibrate(Some("FrontRight")).unwrap();
        assert_eq!(one, vec![("FrontRight".to_string(), 200.0)]);
        assert_eq!(rt.modules()[0].offset(), 0.0);

        let all = rt.calibrate(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(rt.modules()[0].offset(), 100.0);

        assert!(rt.calibrate(Some("Middle")).unwrap().is_empty());
    }
}
