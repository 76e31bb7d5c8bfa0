// core/state.rs

// Working state of the blob-following state machine: which node handled the
// last cycle and which blob detection the controller last reacted to.

use serde::{Deserialize, Serialize};

/// Result of the distance comparison in the innermost layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceBand {
    /// Closer than the lower band edge
    TooClose,
    /// Farther than the upper band edge
    TooFar,
    /// Inside the dead band
    OnTarget,
    /// No range reading available yet
    Unknown,
}

/// Node of the hierarchical state machine, outermost first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsmNode {
    /// Obstacle ahead, hold still
    ObstacleAvoidance,
    /// Blob missing or too small, look around
    SearchBlob,
    /// Blob found but off-centre, turn towards it
    AlignBlob,
    /// Facing the blob, keep the distance band
    MaintainDistance(DistanceBand),
}

impl FsmNode {
    /// Short tag shown on the status line
    pub fn tag(&self) -> &'static str {
        match self {
            FsmNode::ObstacleAvoidance => "OA",
            FsmNode::SearchBlob => "SB",
            FsmNode::AlignBlob => "AB",
            FsmNode::MaintainDistance(DistanceBand::TooFar) => "FB",
            FsmNode::MaintainDistance(DistanceBand::TooClose) => "RB",
            FsmNode::MaintainDistance(_) => "KD",
        }
    }
}

/// Controller memory; lives for the whole run
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    /// Sequence id of the last detection a turn pulse was issued for
    pub last_acted_sequence_id: u64,
    /// Node that handled the most recent cycle
    pub node: FsmNode,
    /// Cycles evaluated
    pub cycles: u64,
    /// Turn pulses issued
    pub pulses: u64,
}

impl ControllerState {
    /// Fresh state; nothing acted on yet
    pub fn new() -> Self {
        ControllerState {
            last_acted_sequence_id: 0,
            node: FsmNode::SearchBlob,
            cycles: 0,
            pulses: 0,
        }
    }

    /// Whether `sequence_id` is newer than anything already reacted to
    pub fn is_fresh(&self, sequence_id: u64) -> bool {
        sequence_id > self.last_acted_sequence_id
    }

    /// Record a reaction to detection `sequence_id`
    pub fn mark_acted(&mut self, sequence_id: u64) {
        self.last_acted_sequence_id = sequence_id;
        self.pulses += 1;
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::new()
    }
}
