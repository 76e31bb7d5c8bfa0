// Shared fakes for the integration tests.
#![allow(dead_code)]

use camcar::hardware::{Actuator, HardwareError, Speed};
use camcar::OperatorConsole;
use std::io;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// What reached the motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    Forward(u8),
    Reverse(u8),
    SpinLeft(u8),
    SpinRight(u8),
    Sleep(u64),
    Released,
}

impl MotorEvent {
    /// A call that starts the motors (or stops them, as forward 0)
    pub fn is_drive(&self) -> bool {
        !matches!(self, MotorEvent::Sleep(_) | MotorEvent::Released)
    }
}

/// Actuator that records calls and never sleeps
#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub events: Vec<MotorEvent>,
}

impl RecordingActuator {
    pub fn take(&mut self) -> Vec<MotorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Actuator for RecordingActuator {
    fn drive_forward(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.events.push(MotorEvent::Forward(speed.value()));
        Ok(())
    }
    fn drive_reverse(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.events.push(MotorEvent::Reverse(speed.value()));
        Ok(())
    }
    fn spin_left(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.events.push(MotorEvent::SpinLeft(speed.value()));
        Ok(())
    }
    fn spin_right(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.events.push(MotorEvent::SpinRight(speed.value()));
        Ok(())
    }
    fn sleep_ms(&mut self, ms: u64) {
        self.events.push(MotorEvent::Sleep(ms));
    }
    fn release(&mut self) -> Result<(), HardwareError> {
        self.events.push(MotorEvent::Released);
        Ok(())
    }
}

/// Console that presses 'q' on the n-th poll and keeps everything it was shown
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    pub quit_on_poll: u64,
    pub polls: u64,
    pub banner: Option<String>,
    pub statuses: Vec<(String, String)>,
    pub keys: Vec<char>,
    pub ready: Option<Receiver<()>>,
}

impl ScriptedConsole {
    pub fn quitting_after(polls: u64) -> Self {
        ScriptedConsole {
            quit_on_poll: polls,
            ..ScriptedConsole::default()
        }
    }

    /// Hold the quit key back until something is sent on `ready`
    pub fn waiting_for(mut self, ready: Receiver<()>) -> Self {
        self.ready = Some(ready);
        self
    }
}

impl OperatorConsole for ScriptedConsole {
    fn poll_key(&mut self) -> io::Result<Option<char>> {
        self.polls += 1;
        if self.polls >= self.quit_on_poll {
            if let Some(ready) = &self.ready {
                let _ = ready.recv_timeout(Duration::from_secs(5));
            }
            Ok(Some('q'))
        } else {
            Ok(None)
        }
    }

    fn render_status(&mut self, label: &str, details: &str) -> io::Result<()> {
        self.statuses.push((label.to_string(), details.to_string()));
        Ok(())
    }

    fn render_banner(&mut self, program: &str) -> io::Result<()> {
        self.banner = Some(program.to_string());
        Ok(())
    }

    fn render_key(&mut self, key: char) -> io::Result<()> {
        self.keys.push(key);
        Ok(())
    }
}
