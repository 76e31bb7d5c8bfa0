// core/vision.rs

// Background blob search. The camera detector is far too slow for the control
// loop, so a dedicated thread calls it back-to-back and publishes each result
// into a shared cell together with a sequence number. The controller only
// ever copies the latest descriptor out; it never waits on the camera.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::CamcarError;
use crate::hardware::{BlobDetection, BlobDetector, HardwareError, TargetColor};

/// Latest published blob, immutable once published
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Blob size, 0 when no blob was found
    pub size: u32,
    /// Horizontal offset in `[-1, 1]`, 0 is centred and positive is left
    pub h_align: f32,
    /// Number of the detection this came from, starting at 1
    pub sequence_id: u64,
}

impl BlobDescriptor {
    /// Whether the detector found anything at all
    pub fn found(&self) -> bool {
        self.size > 0
    }
}

/// Single shared cell between the vision thread and the control loop.
///
/// Both `publish` and `snapshot` hold the lock only for a plain copy, so a
/// reader sees either the previous or the latest descriptor and never a mix.
#[derive(Debug, Default)]
pub struct SharedBlobState {
    latest: Mutex<BlobDescriptor>,
}

impl SharedBlobState {
    /// Empty cell: size 0, sequence 0
    pub fn new() -> Self {
        SharedBlobState::default()
    }

    /// Store a detection under the next sequence number and return that number.
    pub fn publish(&self, detection: BlobDetection) -> u64 {
        let detection = sanitize(detection);
        // a poisoned lock still holds a complete descriptor
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence_id = latest.sequence_id + 1;
        *latest = BlobDescriptor {
            size: detection.size,
            h_align: detection.h_align,
            sequence_id,
        };
        sequence_id
    }

    /// Copy of the latest descriptor
    pub fn snapshot(&self) -> BlobDescriptor {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sanitize(detection: BlobDetection) -> BlobDetection {
    if !detection.h_align.is_finite() {
        warn!("Detector returned non-finite alignment, treating as not found");
        return BlobDetection::NONE;
    }
    BlobDetection {
        size: detection.size,
        h_align: detection.h_align.clamp(-1.0, 1.0),
    }
}

/// Vision worker configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Color of the sign to follow
    pub target_color: TargetColor,
}

/// Loop that feeds `SharedBlobState` from a blob detector
pub struct VisionWorker<D: BlobDetector> {
    detector: D,
    target: TargetColor,
    shared: Arc<SharedBlobState>,
    exit: Arc<AtomicBool>,
    detections: u64,
    failures: u64,
}

impl<D: BlobDetector> VisionWorker<D> {
    /// Create a worker publishing into `shared` until `exit` is raised
    pub fn new(
        detector: D,
        config: &VisionConfig,
        shared: Arc<SharedBlobState>,
        exit: Arc<AtomicBool>,
    ) -> Self {
        VisionWorker {
            detector,
            target: config.target_color,
            shared,
            exit,
            detections: 0,
            failures: 0,
        }
    }

    /// One detection and publish. Detector failures publish "not found".
    pub fn iterate(&mut self) -> u64 {
        let detection = match self.detector.search_blob(self.target) {
            Ok(detection) => detection,
            Err(e) => {
                self.failures += 1;
                log_failure(&e, self.failures);
                BlobDetection::NONE
            }
        };
        self.detections += 1;
        let seq = self.shared.publish(detection);
        debug!(
            "Blob #{}: size={}, halign={:.2}",
            seq, detection.size, detection.h_align
        );
        seq
    }

    /// Run until the exit flag is raised; returns the number of detections.
    pub fn run(mut self) -> u64 {
        info!("Vision worker started, target color {:?}", self.target.0);
        while !self.exit.load(Ordering::Acquire) {
            self.iterate();
        }
        info!(
            "Vision worker stopped after {} detections ({} failed)",
            self.detections, self.failures
        );
        self.detections
    }
}

impl<D: BlobDetector + 'static> VisionWorker<D> {
    /// Move the worker onto its own thread.
    pub fn spawn(self) -> Result<VisionHandle, CamcarError> {
        let exit = Arc::clone(&self.exit);
        let handle = thread::Builder::new()
            .name("camcar-vision".to_string())
            .spawn(move || self.run())
            .map_err(|e| CamcarError::Thread(format!("failed to spawn vision worker: {}", e)))?;
        Ok(VisionHandle { exit, handle })
    }
}

fn log_failure(error: &HardwareError, failures: u64) {
    // a camera that keeps failing would otherwise flood the log
    if failures == 1 || failures % 50 == 0 {
        warn!("Blob search failed ({} so far): {}", failures, error);
    } else {
        debug!("Blob search failed: {}", error);
    }
}

/// Running vision thread
#[derive(Debug)]
pub struct VisionHandle {
    exit: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl VisionHandle {
    /// Raise the exit flag without waiting.
    pub fn signal_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    /// Whether the thread has already returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Raise the exit flag and wait for the worker, however long the current
    /// detection takes. Returns the number of detections performed.
    pub fn shutdown(self) -> Result<u64, CamcarError> {
        self.signal_exit();
        self.handle
            .join()
            .map_err(|_| CamcarError::Thread("vision worker panicked".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockBlobDetector;
    use std::time::Duration;

    #[test]
    fn publish_assigns_increasing_sequence_ids() {
        let shared = SharedBlobState::new();
        assert_eq!(shared.snapshot(), BlobDescriptor::default());
        assert_eq!(shared.publish(BlobDetection { size: 10, h_align: 0.2 }), 1);
        assert_eq!(shared.publish(BlobDetection::NONE), 2);
        let latest = shared.snapshot();
        assert_eq!(latest.sequence_id, 2);
        assert!(!latest.found());
    }

    #[test]
    fn publish_clamps_and_rejects_bad_alignment() {
        let shared = SharedBlobState::new();
        shared.publish(BlobDetection { size: 90, h_align: 3.0 });
        assert_eq!(shared.snapshot().h_align, 1.0);
        shared.publish(BlobDetection { size: 90, h_align: f32::NAN });
        let latest = shared.snapshot();
        assert_eq!(latest.size, 0);
        assert_eq!(latest.sequence_id, 2);
    }

    #[test]
    fn detector_failure_publishes_not_found() {
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .times(1)
            .returning(|_| Err(HardwareError::Camera("no frame".into())));
        let shared = Arc::new(SharedBlobState::new());
        let exit = Arc::new(AtomicBool::new(false));
        let mut worker =
            VisionWorker::new(detector, &VisionConfig::default(), Arc::clone(&shared), exit);

        assert_eq!(worker.iterate(), 1);
        assert_eq!(shared.snapshot().size, 0);
    }

    #[test]
    fn worker_searches_for_configured_color() {
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .withf(|color| *color == TargetColor([0, 255, 0]))
            .times(1)
            .returning(|_| Ok(BlobDetection { size: 70, h_align: -0.5 }));
        let shared = Arc::new(SharedBlobState::new());
        let config = VisionConfig {
            target_color: TargetColor([0, 255, 0]),
        };
        let mut worker = VisionWorker::new(
            detector,
            &config,
            Arc::clone(&shared),
            Arc::new(AtomicBool::new(false)),
        );
        worker.iterate();
        assert_eq!(
            shared.snapshot(),
            BlobDescriptor {
                size: 70,
                h_align: -0.5,
                sequence_id: 1
            }
        );
    }

    #[test]
    fn worker_does_nothing_when_exit_already_raised() {
        let detector = MockBlobDetector::new();
        let worker = VisionWorker::new(
            detector,
            &VisionConfig::default(),
            Arc::new(SharedBlobState::new()),
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(worker.run(), 0);
    }

    #[test]
    fn spawned_worker_stops_on_shutdown() {
        let mut detector = MockBlobDetector::new();
        detector.expect_search_blob().returning(|_| {
            std::thread::sleep(Duration::from_millis(2));
            Ok(BlobDetection { size: 5, h_align: 0.0 })
        });
        let shared = Arc::new(SharedBlobState::new());
        let handle = VisionWorker::new(
            detector,
            &VisionConfig::default(),
            Arc::clone(&shared),
            Arc::new(AtomicBool::new(false)),
        )
        .spawn()
        .unwrap();

        while shared.snapshot().sequence_id < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let detections = handle.shutdown().unwrap();
        assert!(detections >= 3);
        // nothing publishes after the join
        assert_eq!(shared.snapshot().sequence_id, detections);
    }

    #[test]
    fn panicking_worker_is_reported_on_join() {
        let mut detector = MockBlobDetector::new();
        detector
            .expect_search_blob()
            .returning(|_| panic!("camera driver crashed"));
        let handle = VisionWorker::new(
            detector,
            &VisionConfig::default(),
            Arc::new(SharedBlobState::new()),
            Arc::new(AtomicBool::new(false)),
        )
        .spawn()
        .unwrap();
        // let the first detection run before asking the worker to stop
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(handle.shutdown(), Err(CamcarError::Thread(_))));
    }
}
