// src/navigation/line_follow.rs
// Line following with the two downward infrared sensors. Obstacles still win:
// if either forward infrared detector fires the car stops, otherwise it
// steers back over a black line and reverses when the line is lost.

use serde::{Deserialize, Serialize};

use super::{Controller, MotionCommand, Pilot, StatusLine, Turn};
use crate::core::{LineReading, SensorGateway};
use crate::hardware::{Actuator, HardwareError, Sensors, Speed};

/// Speeds of the line follower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Forward speed while both sensors are on the line
    pub straight_speed: Speed,
    /// Spin speed when one sensor leaves the line
    pub correction_speed: Speed,
    /// Reverse speed when both sensors lost the line
    pub recovery_speed: Speed,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            straight_speed: Speed::saturating(80),
            correction_speed: Speed::saturating(90),
            recovery_speed: Speed::saturating(100),
        }
    }
}

/// Line follower states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineNode {
    /// Infrared obstacle detector fired
    ObstacleStop,
    /// Both sensors on the line
    Straight,
    /// Left sensor drifted onto white
    CorrectRight,
    /// Right sensor drifted onto white
    CorrectLeft,
    /// Both sensors on white
    LineLost,
}

/// One line-follower cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineDecision {
    /// State of the cycle
    pub node: LineNode,
    /// Command sent to the motors
    pub command: MotionCommand,
    /// Left/right obstacle flags
    pub obstacles: (bool, bool),
    /// Line sensor input
    pub line: LineReading,
}

impl LineDecision {
    /// Status line for the operator
    pub fn status(&self) -> StatusLine {
        let label = match self.node {
            LineNode::ObstacleStop => "Action: Stop",
            LineNode::Straight => "Action: Straight",
            LineNode::CorrectRight => "Action: Spin right",
            LineNode::CorrectLeft => "Action: Spin left",
            LineNode::LineLost => "Action: Lost my line, reverse",
        };
        let details = match self.node {
            LineNode::ObstacleStop => format!(
                "IR sensors: {}, {}",
                self.obstacles.0 as u8, self.obstacles.1 as u8
            ),
            _ => format!(
                "Line sensors: {}, {}",
                self.line.left_white as u8, self.line.right_white as u8
            ),
        };
        StatusLine {
            label: label.to_string(),
            details,
        }
    }
}

/// Reactive line follower; no memory between cycles
pub struct LineFollower {
    config: LineConfig,
    executor: Controller,
}

impl LineFollower {
    /// Create a follower with the given speeds
    pub fn new(config: &LineConfig) -> Self {
        LineFollower {
            config: config.clone(),
            executor: Controller::new(),
        }
    }

    /// Pick the command for one cycle.
    pub fn decide(&self, obstacles: (bool, bool), line: LineReading) -> LineDecision {
        let (node, command) = if obstacles.0 || obstacles.1 {
            (LineNode::ObstacleStop, MotionCommand::Stop)
        } else {
            match (line.left_white, line.right_white) {
                (false, false) => (
                    LineNode::Straight,
                    MotionCommand::Forward(self.config.straight_speed),
                ),
                (true, false) => (
                    LineNode::CorrectRight,
                    MotionCommand::Spin(Turn::Right, self.config.correction_speed),
                ),
                (false, true) => (
                    LineNode::CorrectLeft,
                    MotionCommand::Spin(Turn::Left, self.config.correction_speed),
                ),
                (true, true) => (
                    LineNode::LineLost,
                    MotionCommand::Reverse(self.config.recovery_speed),
                ),
            }
        };
        LineDecision {
            node,
            command,
            obstacles,
            line,
        }
    }
}

impl Pilot for LineFollower {
    fn cycle<S: Sensors, A: Actuator>(
        &mut self,
        sensors: &mut SensorGateway<S>,
        actuator: &mut A,
    ) -> Result<StatusLine, HardwareError> {
        let obstacles = sensors.read_obstacles();
        let line = sensors.read_line();
        let decision = self.decide(obstacles, line);
        self.executor.execute(&decision.command, actuator)?;
        Ok(decision.status())
    }
}
