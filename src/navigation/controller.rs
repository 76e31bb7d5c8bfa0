// src/navigation/controller.rs
// Turns a MotionCommand into calls on the motor driver. A turn pulse is one
// command: spin, wait out the pulse, stop.

use log::{debug, warn};

use super::{MotionCommand, Turn};
use crate::hardware::{Actuator, HardwareError, Speed};

/// Sends motion commands to an actuator and remembers the last one.
#[derive(Debug, Default)]
pub struct Controller {
    last: Option<MotionCommand>,
    issued: u64,
}

impl Controller {
    /// Creates a new controller instance.
    pub fn new() -> Self {
        Controller::default()
    }

    /// Executes a motion command. `Hold` leaves the motors alone.
    pub fn execute<A: Actuator + ?Sized>(
        &mut self,
        cmd: &MotionCommand,
        actuator: &mut A,
    ) -> Result<(), HardwareError> {
        match *cmd {
            MotionCommand::Hold => return Ok(()),
            MotionCommand::Stop => actuator.stop()?,
            MotionCommand::Forward(speed) => actuator.drive_forward(speed)?,
            MotionCommand::Reverse(speed) => actuator.drive_reverse(speed)?,
            MotionCommand::Spin(turn, speed) => spin(actuator, turn, speed)?,
            MotionCommand::Pulse {
                turn,
                speed,
                duration_ms,
            } => {
                if let Err(e) = spin(actuator, turn, speed) {
                    // never leave a half-issued turn running
                    if let Err(stop_err) = actuator.stop() {
                        warn!("Stop after failed turn also failed: {}", stop_err);
                    }
                    return Err(e);
                }
                actuator.sleep_ms(duration_ms);
                actuator.stop()?;
            }
        }

        if self.last.as_ref() != Some(cmd) {
            debug!("Executing command: {:?}", cmd);
        }
        self.last = Some(*cmd);
        self.issued += 1;
        Ok(())
    }

    /// Last command that reached the motors
    pub fn last(&self) -> Option<&MotionCommand> {
        self.last.as_ref()
    }

    /// Number of commands that reached the motors
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

fn spin<A: Actuator + ?Sized>(
    actuator: &mut A,
    turn: Turn,
    speed: Speed,
) -> Result<(), HardwareError> {
    match turn {
        Turn::Left => actuator.spin_left(speed),
        Turn::Right => actuator.spin_right(speed),
    }
}
