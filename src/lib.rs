//! camcar - blob-following robot car controller
//!
//! This library fuses ultrasonic range, infrared obstacle/line detectors and a
//! camera blob detector (running on a background thread) into motor commands,
//! driven by a hierarchical state machine and stopped from the operator
//! terminal.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod core;
pub mod hardware;
pub mod navigation;
pub mod operator;
pub mod supervisor;

// Re-export commonly used items for easier access
pub use self::core::{
    BlobDescriptor, SensorGateway, SensorSample, SharedBlobState, VisionConfig, VisionWorker,
};
pub use hardware::sim::{SimConfig, SimulatedCamera, SimulatedRobot};
pub use hardware::{Actuator, BlobDetector, HardwareError, Sensors, Speed, TargetColor};
pub use navigation::{ControllerConfig, LineConfig, LineFollower, MotionCommand, MotionController};
pub use operator::{OperatorConsole, TerminalConsole};
pub use supervisor::{ShutdownReport, Supervisor};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CAMCAR_CONFIG";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "camcar.yaml";

/// Which controller drives the car
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Find, face and keep distance to a colored blob
    #[default]
    BlobFollow,
    /// Follow a black line on a white floor
    LineFollow,
}

/// Main configuration structure for camcar
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CamcarConfig {
    /// Controller to run
    pub mode: Mode,
    /// Write the log here instead of stderr
    pub log_file: Option<PathBuf>,
    /// Pause at the end of every control cycle
    pub cycle_delay_ms: u64,
    /// Blob follower thresholds and speeds
    pub controller: ControllerConfig,
    /// Line follower speeds
    pub line: LineConfig,
    /// Vision worker settings
    pub vision: VisionConfig,
    /// Simulated world
    pub simulation: SimConfig,
}

impl CamcarConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, CamcarError> {
        let file = std::fs::File::open(path)
            .map_err(|e| CamcarError::Config(format!("cannot open {}: {}", path.display(), e)))?;
        let config: CamcarConfig = serde_yaml::from_reader(file)
            .map_err(|e| CamcarError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, CamcarError> {
        let config: CamcarConfig =
            serde_yaml::from_str(text).map_err(|e| CamcarError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration from `$CAMCAR_CONFIG`, else `./camcar.yaml` if present,
    /// else the built-in defaults.
    pub fn discover() -> Result<Self, CamcarError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return CamcarConfig::load(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return CamcarConfig::load(local);
        }
        Ok(CamcarConfig::default())
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), CamcarError> {
        self.controller.validate()
    }
}

/// camcar error types
#[derive(Debug)]
pub enum CamcarError {
    /// Motor or sensor failure that could not be absorbed
    Hardware(HardwareError),
    /// Bad configuration
    Config(String),
    /// Worker thread could not be started or joined
    Thread(String),
    /// Operator terminal failure
    Terminal(std::io::Error),
}

impl std::fmt::Display for CamcarError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CamcarError::Hardware(e) => write!(f, "Hardware error: {}", e),
            CamcarError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CamcarError::Thread(msg) => write!(f, "Thread error: {}", msg),
            CamcarError::Terminal(e) => write!(f, "Terminal error: {}", e),
        }
    }
}

impl std::error::Error for CamcarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CamcarError::Hardware(e) => Some(e),
            CamcarError::Terminal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HardwareError> for CamcarError {
    fn from(e: HardwareError) -> Self {
        CamcarError::Hardware(e)
    }
}

impl From<std::io::Error> for CamcarError {
    fn from(e: std::io::Error) -> Self {
        CamcarError::Terminal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = CamcarConfig::from_yaml("{}").unwrap();
        assert_eq!(config, CamcarConfig::default());
        assert_eq!(config.controller.blob_size_threshold, 60);
        assert_eq!(config.vision.target_color, TargetColor([255, 0, 0]));
    }

    #[test]
    fn partial_yaml_overrides_only_given_fields() {
        let yaml = "mode: line_follow\n\
                    controller:\n  too_far_cm: 60\n  spin_speed: 50\n\
                    vision:\n  target_color: [0, 0, 255]\n";
        let config = CamcarConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mode, Mode::LineFollow);
        assert_eq!(config.controller.too_far_cm, 60.0);
        assert_eq!(config.controller.too_close_cm, 40.0);
        assert_eq!(config.controller.spin_speed.value(), 50);
        assert_eq!(config.vision.target_color, TargetColor([0, 0, 255]));
    }

    #[test]
    fn out_of_range_speed_is_a_config_error() {
        let result = CamcarConfig::from_yaml("controller:\n  approach_speed: 180\n");
        assert!(matches!(result, Err(CamcarError::Config(_))));
    }

    #[test]
    fn inconsistent_band_is_rejected() {
        let result = CamcarConfig::from_yaml("controller:\n  too_close_cm: 70\n");
        assert!(matches!(result, Err(CamcarError::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = CamcarConfig::load(Path::new("/nonexistent/camcar.yaml"));
        assert!(matches!(result, Err(CamcarError::Config(_))));
    }
}
