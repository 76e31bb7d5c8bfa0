// core/mod.rs

// Sensing side of camcar: synchronous sensor polling for the control thread,
// the background blob search with its shared result cell, and the controller's
// own state.

pub mod sensors;
pub mod state;
pub mod vision;

pub use sensors::{LineReading, SensorGateway, SensorSample};
pub use state::{ControllerState, DistanceBand, FsmNode};
pub use vision::{BlobDescriptor, SharedBlobState, VisionConfig, VisionHandle, VisionWorker};
