//! Hardware boundary for camcar
//!
//! The motor driver, the range/infrared sensors and the camera blob detector
//! are external collaborators. This module defines the traits the controller
//! consumes and the small value types that cross them.

pub mod sim;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum motor speed accepted by the drive board.
pub const MAX_SPEED: u8 = 100;

/// Bounded motor speed in `0..=MAX_SPEED`, where 0 means stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Speed(u8);

impl Speed {
    /// Zero speed
    pub const STOP: Speed = Speed(0);

    /// Build a speed, rejecting values above [`MAX_SPEED`].
    pub fn new(value: u8) -> Result<Self, HardwareError> {
        if value > MAX_SPEED {
            return Err(HardwareError::InvalidSpeed(value));
        }
        Ok(Speed(value))
    }

    /// Build a speed, saturating at [`MAX_SPEED`].
    pub const fn saturating(value: u8) -> Self {
        if value > MAX_SPEED {
            Speed(MAX_SPEED)
        } else {
            Speed(value)
        }
    }

    /// Raw speed value
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether this speed means "stopped"
    pub fn is_stop(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for Speed {
    type Error = HardwareError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Speed::new(value)
    }
}

impl From<Speed> for u8 {
    fn from(speed: Speed) -> u8 {
        speed.0
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RGB color the blob detector searches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColor(pub [u8; 3]);

impl Default for TargetColor {
    fn default() -> Self {
        // red sign
        TargetColor([255, 0, 0])
    }
}

/// Raw result of one detector call, before it gets a sequence number
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlobDetection {
    /// Blob size in pixels, 0 when nothing was found
    pub size: u32,
    /// Horizontal offset of the blob centre in `[-1, 1]`, positive to the left
    pub h_align: f32,
}

impl BlobDetection {
    /// "Nothing found"
    pub const NONE: BlobDetection = BlobDetection { size: 0, h_align: 0.0 };
}

/// Motor side of the hardware abstraction layer.
#[cfg_attr(test, mockall::automock)]
pub trait Actuator {
    /// Drive both wheels forward
    fn drive_forward(&mut self, speed: Speed) -> Result<(), HardwareError>;
    /// Drive both wheels backwards
    fn drive_reverse(&mut self, speed: Speed) -> Result<(), HardwareError>;
    /// Turn on the spot, counter-clockwise
    fn spin_left(&mut self, speed: Speed) -> Result<(), HardwareError>;
    /// Turn on the spot, clockwise
    fn spin_right(&mut self, speed: Speed) -> Result<(), HardwareError>;

    /// Stop both motors.
    fn stop(&mut self) -> Result<(), HardwareError> {
        self.drive_forward(Speed::STOP)
    }

    /// Block the control thread for `ms` milliseconds; used to time turn pulses.
    fn sleep_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    /// Put the drive board back into a safe state before exit.
    fn release(&mut self) -> Result<(), HardwareError> {
        self.stop()
    }
}

/// Sensor side of the hardware abstraction layer.
#[cfg_attr(test, mockall::automock)]
pub trait Sensors {
    /// Ultrasonic range in centimetres
    fn ultrasonic_distance_cm(&mut self) -> Result<f32, HardwareError>;
    /// Left infrared obstacle detector, true when something is close
    fn infrared_left(&mut self) -> Result<bool, HardwareError>;
    /// Right infrared obstacle detector
    fn infrared_right(&mut self) -> Result<bool, HardwareError>;
    /// Left line sensor, true on white and false on black
    fn line_left(&mut self) -> Result<bool, HardwareError>;
    /// Right line sensor
    fn line_right(&mut self) -> Result<bool, HardwareError>;
}

/// Camera blob detector. Slow (hundreds of ms), so it runs off the control thread.
#[cfg_attr(test, mockall::automock)]
pub trait BlobDetector: Send {
    /// Grab a frame and look for the largest blob of `color`.
    fn search_blob(&mut self, color: TargetColor) -> Result<BlobDetection, HardwareError>;
}

impl<T: Actuator + ?Sized> Actuator for &mut T {
    fn drive_forward(&mut self, speed: Speed) -> Result<(), HardwareError> {
        (**self).drive_forward(speed)
    }
    fn drive_reverse(&mut self, speed: Speed) -> Result<(), HardwareError> {
        (**self).drive_reverse(speed)
    }
    fn spin_left(&mut self, speed: Speed) -> Result<(), HardwareError> {
        (**self).spin_left(speed)
    }
    fn spin_right(&mut self, speed: Speed) -> Result<(), HardwareError> {
        (**self).spin_right(speed)
    }
    fn stop(&mut self) -> Result<(), HardwareError> {
        (**self).stop()
    }
    fn sleep_ms(&mut self, ms: u64) {
        (**self).sleep_ms(ms)
    }
    fn release(&mut self) -> Result<(), HardwareError> {
        (**self).release()
    }
}

impl<T: Sensors + ?Sized> Sensors for &mut T {
    fn ultrasonic_distance_cm(&mut self) -> Result<f32, HardwareError> {
        (**self).ultrasonic_distance_cm()
    }
    fn infrared_left(&mut self) -> Result<bool, HardwareError> {
        (**self).infrared_left()
    }
    fn infrared_right(&mut self) -> Result<bool, HardwareError> {
        (**self).infrared_right()
    }
    fn line_left(&mut self) -> Result<bool, HardwareError> {
        (**self).line_left()
    }
    fn line_right(&mut self) -> Result<bool, HardwareError> {
        (**self).line_right()
    }
}

/// Hardware error types
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// Sensor did not answer in time
    Timeout(String),
    /// Sensor answered with something unusable
    InvalidReading(String),
    /// Motor driver rejected a command
    Motor(String),
    /// Camera or detector failure
    Camera(String),
    /// Speed outside the accepted range
    InvalidSpeed(u8),
}

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HardwareError::Timeout(msg) => write!(f, "Sensor timeout: {}", msg),
            HardwareError::InvalidReading(msg) => write!(f, "Invalid reading: {}", msg),
            HardwareError::Motor(msg) => write!(f, "Motor error: {}", msg),
            HardwareError::Camera(msg) => write!(f, "Camera error: {}", msg),
            HardwareError::InvalidSpeed(value) => {
                write!(f, "Speed {} out of range 0..={}", value, MAX_SPEED)
            }
        }
    }
}

impl std::error::Error for HardwareError {}
