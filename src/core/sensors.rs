// core/sensors.rs

// Synchronous sensor polling for the control thread. Every read goes straight
// to the hardware; a failed read never stops the loop but falls back to the
// last good value (or a safe default when there is none yet).

use log::{debug, warn};

use crate::hardware::{HardwareError, Sensors};

/// Sensor readings for one control cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Ultrasonic range; `None` until the first good reading
    pub distance_cm: Option<f32>,
    /// Left infrared obstacle detector
    pub obstacle_left: bool,
    /// Right infrared obstacle detector
    pub obstacle_right: bool,
}

impl SensorSample {
    /// Sample with a known range and no obstacles
    pub fn clear(distance_cm: f32) -> Self {
        SensorSample {
            distance_cm: Some(distance_cm),
            obstacle_left: false,
            obstacle_right: false,
        }
    }
}

/// Line sensor pair, `true` meaning the sensor sees white
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReading {
    /// Left line sensor
    pub left_white: bool,
    /// Right line sensor
    pub right_white: bool,
}

/// Wraps the raw sensors with last-known-good fallback
pub struct SensorGateway<S: Sensors> {
    sensors: S,
    last_distance: Option<f32>,
    last_left: Option<bool>,
    last_right: Option<bool>,
    faults: u64,
}

impl<S: Sensors> SensorGateway<S> {
    /// Wrap a sensor implementation
    pub fn new(sensors: S) -> Self {
        SensorGateway {
            sensors,
            last_distance: None,
            last_left: None,
            last_right: None,
            faults: 0,
        }
    }

    /// Ultrasonic range in cm, or the last good one if this read failed.
    pub fn read_distance(&mut self) -> Option<f32> {
        let reading = self.sensors.ultrasonic_distance_cm().and_then(|cm| {
            if cm.is_finite() && cm >= 0.0 {
                Ok(cm)
            } else {
                Err(HardwareError::InvalidReading(format!("ultrasonic returned {}", cm)))
            }
        });
        match reading {
            Ok(cm) => {
                self.last_distance = Some(cm);
                Some(cm)
            }
            Err(e) => {
                self.fault("ultrasonic", &e);
                self.last_distance
            }
        }
    }

    /// Left/right obstacle flags. A side that has never been read successfully
    /// reports an obstacle.
    pub fn read_obstacles(&mut self) -> (bool, bool) {
        let left = match self.sensors.infrared_left() {
            Ok(hit) => {
                self.last_left = Some(hit);
                hit
            }
            Err(e) => {
                self.fault("infrared left", &e);
                self.last_left.unwrap_or(true)
            }
        };
        let right = match self.sensors.infrared_right() {
            Ok(hit) => {
                self.last_right = Some(hit);
                hit
            }
            Err(e) => {
                self.fault("infrared right", &e);
                self.last_right.unwrap_or(true)
            }
        };
        (left, right)
    }

    /// Line sensors; a failed read counts as white so the follower backs off.
    pub fn read_line(&mut self) -> LineReading {
        let left_white = self.sensors.line_left().unwrap_or_else(|e| {
            self.fault("line left", &e);
            true
        });
        let right_white = self.sensors.line_right().unwrap_or_else(|e| {
            self.fault("line right", &e);
            true
        });
        LineReading {
            left_white,
            right_white,
        }
    }

    /// Poll everything the blob controller needs.
    pub fn sample(&mut self) -> SensorSample {
        let distance_cm = self.read_distance();
        let (obstacle_left, obstacle_right) = self.read_obstacles();
        SensorSample {
            distance_cm,
            obstacle_left,
            obstacle_right,
        }
    }

    /// Number of failed reads so far
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Give the sensors back, e.g. to release them
    pub fn into_inner(self) -> S {
        self.sensors
    }

    fn fault(&mut self, sensor: &str, error: &HardwareError) {
        self.faults += 1;
        if self.faults == 1 || self.faults % 100 == 0 {
            warn!("{} read failed ({} faults so far): {}", sensor, self.faults, error);
        } else {
            debug!("{} read failed: {}", sensor, error);
        }
    }
}
