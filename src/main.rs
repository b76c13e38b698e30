use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::{MOTOR_ENABLED, MOTOR_PORT, PREFERENCES_PATH};
use swerve_zenoh_runtime::runtime::{self, BoxError, RunOptions};

#[derive(Parser)]
#[command(about = "Swerve module control runtime")]
struct Cli {
    /// Serial port of the servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// File holding persisted steering offsets
    #[arg(long, default_value = PREFERENCES_PATH)]
    preferences: PathBuf,

    /// Run against simulated hardware
    #[arg(long, default_value_t = !MOTOR_ENABLED)]
    sim: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop (default)
    Run,
    /// Store the current steering positions as zero; hold wheels straight first
    Calibrate {
        /// Only this module (default: all)
        #[arg(long)]
        module: Option<String>,
    },
    /// Print the steering offsets a run would start from (none with --sim)
    Offsets,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    let options = RunOptions {
        port: cli.port,
        preferences: cli.preferences,
        simulate: cli.sim,
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => runtime::run(&options).await,
        Command::Calibrate { module } => calibrate(&options, module.as_deref()),
        Command::Offsets => print_offsets(&options),
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

fn calibrate(options: &RunOptions, module: Option<&str>) -> Result<(), BoxError> {
    let captured = runtime::calibrate(options, module)?;
    if captured.is_empty() {
        return Err(format!("no module named {:?}", module.unwrap_or_default()).into());
    }
    for (name, offset) in captured {
        info!("{}: offset {} ticks", name, offset);
    }
    Ok(())
}

fn print_offsets(options: &RunOptions) -> Result<(), BoxError> {
    if options.simulate {
        println!("Offsets (simulated, in memory)");
    } else {
        println!("Offsets in {}", options.preferences.display());
    }
    for (name, offset) in runtime::offsets(options)? {
        match offset {
            Some(offset) => println!("  {:<12} {:>8} ticks", name, offset),
            None => println!("  {:<12} not calibrated", name),
        }
    }
    Ok(())
}
