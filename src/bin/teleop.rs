// Keyboard teleop: WASD pick wheel heading, R/F speed, C calibrate, Q quit
//
// Every module gets the same setpoint, so the robot crabs in the chosen
// direction without rotating.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::f64::consts::{FRAC_PI_2, PI};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{MODULES, TOPIC_CMD_CALIBRATE, TOPIC_CMD_MODULES};
use swerve_zenoh_runtime::messages::{CalibrateCommand, DriveCommand, ModuleSetpoint};

const SPEEDS: [f64; 3] = [0.1, 0.3, 0.6]; // m/s
const INPUT_TIMEOUT_MS: u64 = 100; // Stop the wheels after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_MODULES).await?;
    let pub_calibrate = session.declare_publisher(TOPIC_CMD_CALIBRATE).await?;

    info!("Controls: WASD=heading, R/F=speed, C=calibrate all, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_drive, &pub_calibrate).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_drive: &zenoh::pubsub::Publisher<'_>,
    pub_calibrate: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Heading persists between key presses; speed does not
    let mut angle = 0.0;
    let mut speed = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                let heading = match code {
                    KeyCode::Char('w') if pressed => Some(0.0),
                    KeyCode::Char('a') if pressed => Some(FRAC_PI_2),
                    KeyCode::Char('s') if pressed => Some(PI),
                    KeyCode::Char('d') if pressed => Some(-FRAC_PI_2),
                    _ => None,
                };
                if let Some(heading) = heading {
                    angle = heading;
                    speed = SPEEDS[speed_idx];
                    last_movement_input = Instant::now();
                }

                match code {
                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('c') if pressed => {
                        info!("Requesting calibration of all modules");
                        let cmd = serde_json::to_string(&CalibrateCommand::default())?;
                        pub_calibrate.put(cmd).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = DriveCommand {
            modules: MODULES
                .iter()
                .map(|m| ModuleSetpoint {
                    name: m.name.to_string(),
                    speed_mps: speed,
                    angle_rad: angle,
                })
                .collect(),
        };
        pub_drive.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
