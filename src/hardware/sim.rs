// src/hardware/sim.rs
// Software stand-in for the robot car: a flat world with one colored target.
// The control thread drives it through `SimulatedRobot` (Actuator + Sensors)
// while the vision thread looks at it through `SimulatedCamera`. Both handles
// share the same world behind a mutex; motion is integrated over wall-clock
// time whenever either handle touches the world.

use log::{debug, trace};
use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Actuator, BlobDetection, BlobDetector, HardwareError, Sensors, Speed, TargetColor};

/// Simulator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Initial range from robot to target
    pub start_distance_cm: f32,
    /// Initial bearing of the target, positive to the left
    pub start_bearing_deg: f32,
    /// Ultrasonic reading when the target is outside the beam
    pub wall_distance_cm: f32,
    /// Half opening angle of the ultrasonic beam
    pub beam_half_angle_deg: f32,
    /// Half horizontal field of view of the camera
    pub camera_half_fov_deg: f32,
    /// Blob size reported with the target 100cm away
    pub blob_size_at_1m: f32,
    /// Infrared detectors trigger below this range
    pub infrared_range_cm: f32,
    /// Linear velocity in cm/s per unit of motor speed
    pub linear_gain: f32,
    /// Turn rate in deg/s per unit of motor speed
    pub angular_gain: f32,
    /// Time one detector call takes
    pub detection_latency_ms: u64,
    /// Color of the target; other colors are never found
    pub target_color: TargetColor,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            start_distance_cm: 120.0,
            start_bearing_deg: -35.0,
            wall_distance_cm: 250.0,
            beam_half_angle_deg: 15.0,
            camera_half_fov_deg: 30.0,
            blob_size_at_1m: 80.0,
            infrared_range_cm: 4.0,
            linear_gain: 0.5,
            angular_gain: 1.5,
            detection_latency_ms: 250,
            target_color: TargetColor::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Stopped,
    Forward(f32),
    Reverse(f32),
    SpinLeft(f32),
    SpinRight(f32),
}

#[derive(Debug)]
struct World {
    config: SimConfig,
    position: Point2<f32>,
    heading: f32,
    target: Point2<f32>,
    motion: Motion,
    last_update: Instant,
}

impl World {
    fn new(config: SimConfig) -> Self {
        let bearing = config.start_bearing_deg.to_radians();
        let target = Point2::origin()
            + Rotation2::new(bearing) * Vector2::x() * config.start_distance_cm;
        World {
            config,
            position: Point2::origin(),
            heading: 0.0,
            target,
            motion: Motion::Stopped,
            last_update: Instant::now(),
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        let forward = Rotation2::new(self.heading) * Vector2::x();
        match self.motion {
            Motion::Stopped => {}
            Motion::Forward(v) => self.position += forward * v * dt,
            Motion::Reverse(v) => self.position -= forward * v * dt,
            Motion::SpinLeft(w) => self.heading += w * dt,
            Motion::SpinRight(w) => self.heading -= w * dt,
        }
    }

    fn set_motion(&mut self, motion: Motion) {
        self.advance();
        if self.motion != motion {
            trace!("sim motion {:?} -> {:?}", self.motion, motion);
        }
        self.motion = motion;
    }

    fn range(&self) -> f32 {
        (self.target - self.position).norm()
    }

    /// Signed angle from the heading to the target, positive counter-clockwise.
    fn bearing(&self) -> f32 {
        let forward = Rotation2::new(self.heading) * Vector2::x();
        let to_target = self.target - self.position;
        if to_target.norm() <= f32::EPSILON {
            return 0.0;
        }
        Rotation2::rotation_between(&forward, &to_target).angle()
    }

    fn linear(&self, speed: Speed) -> f32 {
        speed.value() as f32 * self.config.linear_gain
    }

    fn angular(&self, speed: Speed) -> f32 {
        (speed.value() as f32 * self.config.angular_gain).to_radians()
    }
}

fn lock(world: &Mutex<World>) -> MutexGuard<'_, World> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observable state of the simulated world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSnapshot {
    /// Range from robot to target
    pub range_cm: f32,
    /// Bearing of the target, positive to the left
    pub bearing_deg: f32,
    /// Whether any motor is currently running
    pub moving: bool,
}

/// Motor and sensor handle of the simulator, owned by the control thread
#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    world: Arc<Mutex<World>>,
}

/// Camera handle of the simulator, moved into the vision worker
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    world: Arc<Mutex<World>>,
    latency: Duration,
}

impl SimulatedRobot {
    /// Create a world with the robot at the origin facing +x.
    pub fn new(config: SimConfig) -> Self {
        debug!(
            "Simulated world: target at {:.0}cm, bearing {:.0}deg",
            config.start_distance_cm, config.start_bearing_deg
        );
        SimulatedRobot {
            world: Arc::new(Mutex::new(World::new(config))),
        }
    }

    /// Camera looking at the same world
    pub fn camera(&self) -> SimulatedCamera {
        let latency = Duration::from_millis(lock(&self.world).config.detection_latency_ms);
        SimulatedCamera {
            world: Arc::clone(&self.world),
            latency,
        }
    }

    /// Current world state
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut world = lock(&self.world);
        world.advance();
        WorldSnapshot {
            range_cm: world.range(),
            bearing_deg: world.bearing().to_degrees(),
            moving: world.motion != Motion::Stopped,
        }
    }

    fn command(&mut self, motion: impl FnOnce(&World) -> Motion) -> Result<(), HardwareError> {
        let mut world = lock(&self.world);
        let motion = motion(&world);
        world.set_motion(motion);
        Ok(())
    }
}

impl Actuator for SimulatedRobot {
    fn drive_forward(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.command(|w| {
            if speed.is_stop() {
                Motion::Stopped
            } else {
                Motion::Forward(w.linear(speed))
            }
        })
    }

    fn drive_reverse(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.command(|w| {
            if speed.is_stop() {
                Motion::Stopped
            } else {
                Motion::Reverse(w.linear(speed))
            }
        })
    }

    fn spin_left(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.command(|w| Motion::SpinLeft(w.angular(speed)))
    }

    fn spin_right(&mut self, speed: Speed) -> Result<(), HardwareError> {
        self.command(|w| Motion::SpinRight(w.angular(speed)))
    }
}

impl Sensors for SimulatedRobot {
    fn ultrasonic_distance_cm(&mut self) -> Result<f32, HardwareError> {
        let mut world = lock(&self.world);
        world.advance();
        if world.bearing().abs() <= world.config.beam_half_angle_deg.to_radians() {
            Ok(world.range())
        } else {
            Ok(world.config.wall_distance_cm)
        }
    }

    fn infrared_left(&mut self) -> Result<bool, HardwareError> {
        let mut world = lock(&self.world);
        world.advance();
        Ok(world.range() < world.config.infrared_range_cm && world.bearing() >= 0.0)
    }

    fn infrared_right(&mut self) -> Result<bool, HardwareError> {
        let mut world = lock(&self.world);
        world.advance();
        Ok(world.range() < world.config.infrared_range_cm && world.bearing() <= 0.0)
    }

    // The floor has no line: both sensors see black.
    fn line_left(&mut self) -> Result<bool, HardwareError> {
        Ok(false)
    }

    fn line_right(&mut self) -> Result<bool, HardwareError> {
        Ok(false)
    }
}

impl BlobDetector for SimulatedCamera {
    fn search_blob(&mut self, color: TargetColor) -> Result<BlobDetection, HardwareError> {
        // frame capture and processing time, outside the world lock
        std::thread::sleep(self.latency);

        let mut world = lock(&self.world);
        world.advance();
        if color != world.config.target_color {
            return Ok(BlobDetection::NONE);
        }
        let half_fov = world.config.camera_half_fov_deg.to_radians();
        let bearing = world.bearing();
        if bearing.abs() > half_fov {
            return Ok(BlobDetection::NONE);
        }
        let range = world.range().max(1.0);
        Ok(BlobDetection {
            size: (world.config.blob_size_at_1m * 100.0 / range).round() as u32,
            h_align: (bearing / half_fov).clamp(-1.0, 1.0),
        })
    }
}
