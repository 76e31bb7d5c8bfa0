//! Motion control for camcar
//!
//! The blob follower is a hierarchical state machine. Each cycle the guarded
//! layers are tried outermost first and the first one whose guard holds
//! decides the single command for that cycle:
//!
//! 1. obstacle avoidance: stop
//! 2. search blob: one spin-right pulse per fresh detection
//! 3. align blob: one turn pulse towards the blob per fresh detection
//! 4. maintain distance: reverse / stop / forward around a dead band
//!
//! Turn pulses are only issued for a detection the controller has not reacted
//! to yet. Without that rule a single stale detection would trigger a pulse
//! every cycle and the car would spin past the target.

pub mod controller;
pub mod line_follow;

pub use controller::Controller;
pub use line_follow::{LineConfig, LineDecision, LineFollower, LineNode};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{
    BlobDescriptor, ControllerState, DistanceBand, FsmNode, SensorGateway, SensorSample,
    SharedBlobState,
};
use crate::hardware::{Actuator, HardwareError, Sensors, Speed};
use crate::CamcarError;

/// Tunable thresholds and speeds of the blob follower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Ultrasonic range below which the car stops
    pub obstacle_distance_cm: f32,
    /// Blobs of this size or smaller are not trusted yet
    pub blob_size_threshold: u32,
    /// Alignment inside `[-tol, tol]` counts as centred
    pub align_tolerance: f32,
    /// Lower edge of the distance dead band
    pub too_close_cm: f32,
    /// Upper edge of the distance dead band
    pub too_far_cm: f32,
    /// Speed for turn pulses
    pub spin_speed: Speed,
    /// Speed for approaching and backing off
    pub approach_speed: Speed,
    /// Length of a search pulse
    pub search_pulse_ms: u64,
    /// Length of an alignment pulse
    pub align_pulse_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            obstacle_distance_cm: 5.0,
            blob_size_threshold: 60,
            align_tolerance: 0.3,
            too_close_cm: 40.0,
            too_far_cm: 50.0,
            spin_speed: Speed::saturating(70),
            approach_speed: Speed::saturating(30),
            search_pulse_ms: 400,
            align_pulse_ms: 400,
        }
    }
}

impl ControllerConfig {
    /// Reject threshold combinations the state machine cannot work with.
    pub fn validate(&self) -> Result<(), CamcarError> {
        if !(0.0..=1.0).contains(&self.align_tolerance) {
            return Err(CamcarError::Config(format!(
                "align_tolerance {} outside [0, 1]",
                self.align_tolerance
            )));
        }
        if !(self.too_close_cm <= self.too_far_cm) {
            return Err(CamcarError::Config(format!(
                "too_close_cm {} above too_far_cm {}",
                self.too_close_cm, self.too_far_cm
            )));
        }
        if !(self.obstacle_distance_cm >= 0.0) {
            return Err(CamcarError::Config(format!(
                "obstacle_distance_cm {} is negative",
                self.obstacle_distance_cm
            )));
        }
        if self.search_pulse_ms == 0 || self.align_pulse_ms == 0 {
            return Err(CamcarError::Config("turn pulses need a non-zero duration".into()));
        }
        if self.spin_speed.is_stop() {
            return Err(CamcarError::Config("spin_speed must not be 0".into()));
        }
        Ok(())
    }
}

/// Turn direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Counter-clockwise
    Left,
    /// Clockwise
    Right,
}

/// The one thing the car is told to do in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    /// Both motors off
    Stop,
    /// Drive forward
    Forward(Speed),
    /// Drive backwards
    Reverse(Speed),
    /// Keep turning until told otherwise
    Spin(Turn, Speed),
    /// Turn for a fixed time, then stop
    Pulse {
        /// Direction
        turn: Turn,
        /// Turn speed
        speed: Speed,
        /// How long to turn
        duration_ms: u64,
    },
    /// No new command; the motors keep their last state
    Hold,
}

impl MotionCommand {
    /// Whether this command actually reaches the motors
    pub fn is_actuating(&self) -> bool {
        !matches!(self, MotionCommand::Hold)
    }

    /// Whether this command turns the car
    pub fn is_turn(&self) -> bool {
        matches!(self, MotionCommand::Spin(..) | MotionCommand::Pulse { .. })
    }
}

/// Status text for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// State label, e.g. `State SB (search blob)`
    pub label: String,
    /// Readings behind the decision
    pub details: String,
}

/// A control strategy the supervisor can run one cycle at a time.
pub trait Pilot {
    /// Read sensors, decide, command the motors.
    fn cycle<S: Sensors, A: Actuator>(
        &mut self,
        sensors: &mut SensorGateway<S>,
        actuator: &mut A,
    ) -> Result<StatusLine, HardwareError>;
}

/// What the blob follower decided in one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Node that handled the cycle
    pub node: FsmNode,
    /// Command for the motors
    pub command: MotionCommand,
    /// Sensor input of the cycle
    pub sample: SensorSample,
    /// Blob input of the cycle
    pub blob: BlobDescriptor,
}

impl Decision {
    /// Status row text: a state label and the readings behind it
    pub fn status(&self) -> StatusLine {
        let dist = match self.sample.distance_cm {
            Some(cm) => format!("{:.0}", cm),
            None => "--".to_string(),
        };
        let (label, details) = match self.node {
            FsmNode::ObstacleAvoidance => (
                "State OA (stop to avoid obstacle)".to_string(),
                format!(
                    "o-left={}, o-right={}, dist={}",
                    self.sample.obstacle_left as u8, self.sample.obstacle_right as u8, dist
                ),
            ),
            FsmNode::SearchBlob => (
                "State SB (search blob)".to_string(),
                format!("blob.size={} (seq: {})", self.blob.size, self.blob.sequence_id),
            ),
            FsmNode::AlignBlob => {
                let side = if self.blob.h_align <= 0.0 { "right" } else { "left" };
                (
                    format!("State AB (align {} towards blob)", side),
                    format!("blob.size={}, halign={:.2}", self.blob.size, self.blob.h_align),
                )
            }
            FsmNode::MaintainDistance(band) => {
                let label = match band {
                    DistanceBand::TooFar => "State FB (drive forward)",
                    DistanceBand::TooClose => "State RB (drive backwards)",
                    DistanceBand::OnTarget => "State KD (keep distance)",
                    DistanceBand::Unknown => "State KD (no range reading)",
                };
                (label.to_string(), format!("dist={}", dist))
            }
        };
        StatusLine { label, details }
    }
}

/// Guarded layers in evaluation order; maintain-distance is the fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    ObstacleAvoidance,
    SearchBlob,
    AlignBlob,
}

const GUARDED_LAYERS: [Layer; 3] = [
    Layer::ObstacleAvoidance,
    Layer::SearchBlob,
    Layer::AlignBlob,
];

impl Layer {
    fn engaged(
        self,
        config: &ControllerConfig,
        sample: &SensorSample,
        blob: &BlobDescriptor,
    ) -> bool {
        match self {
            Layer::ObstacleAvoidance => {
                sample.obstacle_left
                    || sample.obstacle_right
                    || sample
                        .distance_cm
                        .is_some_and(|cm| cm < config.obstacle_distance_cm)
            }
            Layer::SearchBlob => blob.size <= config.blob_size_threshold,
            Layer::AlignBlob => {
                blob.h_align < -config.align_tolerance || blob.h_align > config.align_tolerance
            }
        }
    }
}

/// Hierarchical blob-following state machine
pub struct MotionController {
    config: ControllerConfig,
    state: ControllerState,
    executor: Controller,
}

impl MotionController {
    /// Create a controller with nothing acted on yet
    pub fn new(config: &ControllerConfig) -> Self {
        MotionController {
            config: config.clone(),
            state: ControllerState::new(),
            executor: Controller::new(),
        }
    }

    /// Evaluate the layers for one cycle and return the single command.
    ///
    /// Only a turn pulse changes the controller state (the acted-on sequence
    /// id); everything else is a pure function of the inputs.
    pub fn decide(&mut self, sample: &SensorSample, blob: &BlobDescriptor) -> Decision {
        let layer = GUARDED_LAYERS
            .iter()
            .copied()
            .find(|layer| layer.engaged(&self.config, sample, blob));

        let (node, command) = match layer {
            Some(Layer::ObstacleAvoidance) => (FsmNode::ObstacleAvoidance, MotionCommand::Stop),
            Some(Layer::SearchBlob) => (FsmNode::SearchBlob, self.search(blob)),
            Some(Layer::AlignBlob) => (FsmNode::AlignBlob, self.align(blob)),
            None => {
                let band = self.band(sample.distance_cm);
                (FsmNode::MaintainDistance(band), self.keep_distance(band))
            }
        };

        if node != self.state.node {
            log::debug!("FSM {} -> {}", self.state.node.tag(), node.tag());
        }
        self.state.node = node;
        self.state.cycles += 1;

        Decision {
            node,
            command,
            sample: *sample,
            blob: *blob,
        }
    }

    /// Decide and send the command to the motors.
    pub fn step<A: Actuator + ?Sized>(
        &mut self,
        sample: &SensorSample,
        blob: &BlobDescriptor,
        actuator: &mut A,
    ) -> Result<Decision, HardwareError> {
        let decision = self.decide(sample, blob);
        self.executor.execute(&decision.command, actuator)?;
        Ok(decision)
    }

    /// Controller memory
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    fn search(&mut self, blob: &BlobDescriptor) -> MotionCommand {
        if !self.state.is_fresh(blob.sequence_id) {
            return MotionCommand::Hold;
        }
        self.state.mark_acted(blob.sequence_id);
        MotionCommand::Pulse {
            turn: Turn::Right,
            speed: self.config.spin_speed,
            duration_ms: self.config.search_pulse_ms,
        }
    }

    fn align(&mut self, blob: &BlobDescriptor) -> MotionCommand {
        if !self.state.is_fresh(blob.sequence_id) {
            return MotionCommand::Hold;
        }
        self.state.mark_acted(blob.sequence_id);
        // negative alignment: blob right of centre
        let turn = if blob.h_align <= 0.0 { Turn::Right } else { Turn::Left };
        MotionCommand::Pulse {
            turn,
            speed: self.config.spin_speed,
            duration_ms: self.config.align_pulse_ms,
        }
    }

    fn band(&self, distance_cm: Option<f32>) -> DistanceBand {
        match distance_cm {
            None => DistanceBand::Unknown,
            Some(cm) if cm < self.config.too_close_cm => DistanceBand::TooClose,
            Some(cm) if cm > self.config.too_far_cm => DistanceBand::TooFar,
            Some(_) => DistanceBand::OnTarget,
        }
    }

    fn keep_distance(&self, band: DistanceBand) -> MotionCommand {
        match band {
            DistanceBand::TooClose => MotionCommand::Reverse(self.config.approach_speed),
            DistanceBand::TooFar => MotionCommand::Forward(self.config.approach_speed),
            DistanceBand::OnTarget | DistanceBand::Unknown => MotionCommand::Stop,
        }
    }
}

/// Blob follower wired to the shared vision result
pub struct BlobPilot {
    controller: MotionController,
    shared: Arc<SharedBlobState>,
}

impl BlobPilot {
    /// Follow blobs published into `shared`
    pub fn new(config: &ControllerConfig, shared: Arc<SharedBlobState>) -> Self {
        BlobPilot {
            controller: MotionController::new(config),
            shared,
        }
    }
}

impl Pilot for BlobPilot {
    fn cycle<S: Sensors, A: Actuator>(
        &mut self,
        sensors: &mut SensorGateway<S>,
        actuator: &mut A,
    ) -> Result<StatusLine, HardwareError> {
        let sample = sensors.sample();
        let blob = self.shared.snapshot();
        let decision = self.controller.step(&sample, &blob, actuator)?;
        Ok(decision.status())
    }
}
