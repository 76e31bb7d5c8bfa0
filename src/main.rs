// src/main.rs
// Entry point for camcar: load the configuration, set up logging, hand the
// simulated car and the terminal console to the supervisor and run until 'q'.

use camcar::{CamcarConfig, SimulatedRobot, Supervisor, TerminalConsole};
use log::{info, warn};
use std::error::Error;
use std::fs::File;
use std::path::Path;

/// Main function to initialize and run camcar.
fn main() -> Result<(), Box<dyn Error>> {
    let config = CamcarConfig::discover()?;
    init_logging(&config)?;

    let mut args = std::env::args();
    let program = args
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "camcar".to_string());
    if args.next().is_some() {
        warn!("{} takes no arguments; ignoring them", program);
    }
    info!("Starting {}...", program);

    let robot = SimulatedRobot::new(config.simulation.clone());
    let camera = robot.camera();
    let console = TerminalConsole::new()?;

    // the console restores the terminal when the supervisor drops it
    let report = Supervisor::new(config, &program, robot.clone(), robot, console).run(camera)?;
    info!(
        "{} finished after {} cycles ({:?} detections, {} sensor faults)",
        program, report.cycles, report.detections, report.sensor_faults
    );
    Ok(())
}

/// Logs go to `log_file` when configured, so they do not overwrite the
/// status rows; otherwise only errors reach stderr unless RUST_LOG says so.
fn init_logging(config: &CamcarConfig) -> Result<(), Box<dyn Error>> {
    let default_filter = if config.log_file.is_some() { "info" } else { "error" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(path) = &config.log_file {
        let file = File::create(path)
            .map_err(|e| format!("cannot create log file {}: {}", path.display(), e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
