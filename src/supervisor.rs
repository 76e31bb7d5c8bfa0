// src/supervisor.rs

// Process lifecycle: start the vision worker, run the control loop until the
// operator quits, then signal and join the worker before the motors are
// released. The worker is always joined, including when the loop fails.

use log::{error, info, warn};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{SensorGateway, SharedBlobState, VisionWorker};
use crate::hardware::{Actuator, BlobDetector, Sensors};
use crate::navigation::{BlobPilot, LineFollower, Pilot, StatusLine};
use crate::operator::{OperatorConsole, QUIT_KEY};
use crate::{CamcarConfig, CamcarError, Mode};

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Control cycles executed
    pub cycles: u64,
    /// Detections made by the vision worker; `None` when it was not started
    pub detections: Option<u64>,
    /// Failed sensor reads absorbed by the gateway
    pub sensor_faults: u64,
    /// Last status shown to the operator
    pub last_status: Option<StatusLine>,
}

/// Owns the hardware handles and the console for one run
pub struct Supervisor<S: Sensors, A: Actuator, C: OperatorConsole> {
    config: CamcarConfig,
    program: String,
    sensors: SensorGateway<S>,
    actuator: A,
    console: C,
    cycles: u64,
    last_status: Option<StatusLine>,
}

impl<S: Sensors, A: Actuator, C: OperatorConsole> Supervisor<S, A, C> {
    /// Create a supervisor; `program` is shown in the banner
    pub fn new(config: CamcarConfig, program: &str, sensors: S, actuator: A, console: C) -> Self {
        Supervisor {
            config,
            program: program.to_string(),
            sensors: SensorGateway::new(sensors),
            actuator,
            console,
            cycles: 0,
            last_status: None,
        }
    }

    /// Run the configured controller until the operator quits.
    ///
    /// In line-follow mode the detector is dropped unused.
    pub fn run<D: BlobDetector + 'static>(
        mut self,
        detector: D,
    ) -> Result<ShutdownReport, CamcarError> {
        info!("Starting camcar in {:?} mode", self.config.mode);
        let detections = match self.config.mode {
            Mode::BlobFollow => Some(self.run_blob_follow(detector)?),
            Mode::LineFollow => {
                drop(detector);
                self.run_line_follow()?;
                None
            }
        };

        let report = ShutdownReport {
            cycles: self.cycles,
            detections,
            sensor_faults: self.sensors.faults(),
            last_status: self.last_status.take(),
        };
        info!("camcar shutdown complete: {:?}", report);
        Ok(report)
    }

    fn run_blob_follow<D: BlobDetector + 'static>(
        &mut self,
        detector: D,
    ) -> Result<u64, CamcarError> {
        // created before the worker, dropped only after it is joined
        let shared = Arc::new(SharedBlobState::new());
        let exit = Arc::new(AtomicBool::new(false));
        let worker =
            VisionWorker::new(detector, &self.config.vision, Arc::clone(&shared), exit).spawn()?;

        let mut pilot = BlobPilot::new(&self.config.controller, Arc::clone(&shared));
        let outcome = self.control_loop(&mut pilot);

        if worker.is_finished() {
            warn!("Vision worker exited before shutdown was requested");
        }
        worker.signal_exit();
        let stopped = self.stop_motors();
        info!("Waiting for vision worker to finish its current detection");
        let detections = match worker.shutdown() {
            Ok(n) => n,
            Err(e) => {
                // the worker state is unknown: leave the hardware alone
                error!("Vision worker could not be joined: {}", e);
                return Err(outcome.err().unwrap_or(e));
            }
        };

        self.finish(outcome, stopped)?;
        Ok(detections)
    }

    fn run_line_follow(&mut self) -> Result<(), CamcarError> {
        let mut pilot = LineFollower::new(&self.config.line);
        let outcome = self.control_loop(&mut pilot);
        let stopped = self.stop_motors();
        self.finish(outcome, stopped)
    }

    /// Release the hardware whatever the loop returned, then report the
    /// first error in loop, stop, release order.
    fn finish(
        &mut self,
        outcome: Result<(), CamcarError>,
        stopped: Result<(), CamcarError>,
    ) -> Result<(), CamcarError> {
        if let Err(e) = &outcome {
            error!("Control loop failed: {}", e);
        }
        let released = self.release();
        outcome?;
        stopped?;
        released
    }

    fn control_loop<P: Pilot>(&mut self, pilot: &mut P) -> Result<(), CamcarError> {
        self.console.render_banner(&self.program)?;
        let delay = Duration::from_millis(self.config.cycle_delay_ms);
        loop {
            let status = pilot.cycle(&mut self.sensors, &mut self.actuator)?;
            self.cycles += 1;
            self.console.render_status(&status.label, &status.details)?;
            self.last_status = Some(status);

            if let Some(key) = self.console.poll_key()? {
                self.console.render_key(key)?;
                if key == QUIT_KEY {
                    info!("Quit requested after {} cycles", self.cycles);
                    return Ok(());
                }
            }
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    fn stop_motors(&mut self) -> Result<(), CamcarError> {
        self.actuator.stop().map_err(|e| {
            warn!("Failed to stop motors: {}", e);
            CamcarError::from(e)
        })
    }

    fn release(&mut self) -> Result<(), CamcarError> {
        self.actuator.release()?;
        info!("Hardware released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        BlobDetection, HardwareError, MockActuator, MockBlobDetector, MockSensors,
    };
    use crate::operator::MockOperatorConsole;
    use mockall::Sequence;

    fn quiet_sensors(distance: f32) -> MockSensors {
        let mut sensors = MockSensors::new();
        sensors
            .expect_ultrasonic_distance_cm()
            .returning(move || Ok(distance));
        sensors.expect_infrared_left().returning(|| Ok(false));
        sensors.expect_infrared_right().returning(|| Ok(false));
        sensors.expect_line_left().returning(|| Ok(false));
        sensors.expect_line_right().returning(|| Ok(false));
        sensors
    }

    fn console_quitting_after(cycles: usize) -> MockOperatorConsole {
        let mut console = MockOperatorConsole::new();
        let mut seq = Sequence::new();
        console.expect_render_banner().times(1).returning(|_| Ok(()));
        console.expect_render_status().returning(|_, _| Ok(()));
        console.expect_render_key().returning(|_| Ok(()));
        console
            .expect_poll_key()
            .times(cycles - 1)
            .in_sequence(&mut seq)
            .returning(|| Ok(None));
        console
            .expect_poll_key()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some(QUIT_KEY)));
        console
    }

    #[test]
    fn obstacle_run_stops_every_cycle_and_joins_worker() {
        let mut actuator = MockActuator::new();
        // three OA cycles, the shutdown stop and the release
        actuator.expect_stop().times(4).returning(|| Ok(()));
        actuator.expect_release().times(1).returning(|| Ok(()));

        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .returning(|_| Ok(BlobDetection { size: 80, h_align: 0.0 }));

        let supervisor = Supervisor::new(
            CamcarConfig::default(),
            "camcar",
            quiet_sensors(3.0),
            actuator,
            console_quitting_after(3),
        );
        let report = supervisor.run(detector).unwrap();
        assert_eq!(report.cycles, 3);
        assert!(report.detections.is_some());
        assert_eq!(
            report.last_status.unwrap().label,
            "State OA (stop to avoid obstacle)"
        );
    }

    #[test]
    fn line_mode_does_not_start_the_worker() {
        let mut actuator = MockActuator::new();
        actuator.expect_drive_forward().times(2).returning(|_| Ok(()));
        actuator.expect_stop().times(1).returning(|| Ok(()));
        actuator.expect_release().times(1).returning(|| Ok(()));
        let mut detector = MockBlobDetector::new();
        detector.expect_search_blob().never();

        let config = CamcarConfig {
            mode: Mode::LineFollow,
            ..CamcarConfig::default()
        };
        let report = Supervisor::new(
            config,
            "camcar",
            quiet_sensors(100.0),
            actuator,
            console_quitting_after(2),
        )
        .run(detector)
        .unwrap();
        assert_eq!(report.cycles, 2);
        assert_eq!(report.detections, None);
    }

    #[test]
    fn motor_failure_still_joins_worker_and_releases() {
        let mut actuator = MockActuator::new();
        // the failing cycle and the shutdown stop
        actuator
            .expect_stop()
            .times(2)
            .returning(|| Err(HardwareError::Motor("bus off".into())));
        actuator.expect_release().times(1).returning(|| Ok(()));
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .returning(|_| Ok(BlobDetection::NONE));
        let mut console = MockOperatorConsole::new();
        console.expect_render_banner().returning(|_| Ok(()));
        console.expect_poll_key().never();

        let result = Supervisor::new(
            CamcarConfig::default(),
            "camcar",
            quiet_sensors(2.0),
            actuator,
            console,
        )
        .run(detector);
        assert!(matches!(result, Err(CamcarError::Hardware(_))));
    }

    fn console_with_broken_status_row() -> MockOperatorConsole {
        let mut console = MockOperatorConsole::new();
        console.expect_render_banner().returning(|_| Ok(()));
        console.expect_render_status().times(1).returning(|_, _| {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "tty gone",
            ))
        });
        console.expect_poll_key().never();
        console
    }

    #[test]
    fn terminal_failure_still_releases_hardware() {
        let mut actuator = MockActuator::new();
        let mut seq = Sequence::new();
        // the obstacle cycle, then the shutdown stop, then the release
        actuator
            .expect_stop()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        actuator
            .expect_release()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .returning(|_| Ok(BlobDetection::NONE));

        let result = Supervisor::new(
            CamcarConfig::default(),
            "camcar",
            quiet_sensors(2.0),
            actuator,
            console_with_broken_status_row(),
        )
        .run(detector);
        assert!(matches!(result, Err(CamcarError::Terminal(_))));
    }

    #[test]
    fn terminal_failure_in_line_mode_still_releases_hardware() {
        let mut actuator = MockActuator::new();
        actuator.expect_drive_forward().times(1).returning(|_| Ok(()));
        actuator.expect_stop().times(1).returning(|| Ok(()));
        actuator.expect_release().times(1).returning(|| Ok(()));
        let config = CamcarConfig {
            mode: Mode::LineFollow,
            ..CamcarConfig::default()
        };

        let result = Supervisor::new(
            config,
            "camcar",
            quiet_sensors(100.0),
            actuator,
            console_with_broken_status_row(),
        )
        .run(MockBlobDetector::new());
        assert!(matches!(result, Err(CamcarError::Terminal(_))));
    }

    #[test]
    fn non_quit_keys_are_echoed_and_ignored() {
        let mut actuator = MockActuator::new();
        actuator.expect_stop().returning(|| Ok(()));
        actuator.expect_release().returning(|| Ok(()));
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .returning(|_| Ok(BlobDetection::NONE));

        let mut console = MockOperatorConsole::new();
        let mut seq = Sequence::new();
        console.expect_render_banner().returning(|_| Ok(()));
        console.expect_render_status().returning(|_, _| Ok(()));
        console
            .expect_poll_key()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some('x')));
        console
            .expect_poll_key()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some(QUIT_KEY)));
        console
            .expect_render_key()
            .withf(|key| *key == 'x')
            .times(1)
            .returning(|_| Ok(()));
        console
            .expect_render_key()
            .withf(|key| *key == QUIT_KEY)
            .times(1)
            .returning(|_| Ok(()));

        let report = Supervisor::new(
            CamcarConfig::default(),
            "camcar",
            quiet_sensors(1.0),
            actuator,
            console,
        )
        .run(detector)
        .unwrap();
        assert_eq!(report.cycles, 2);
    }
}
