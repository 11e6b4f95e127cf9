// Detection polling loop

use crate::emotion::ExpressionDetector;
use crate::models::{DetectionSnapshot, Frame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Latest-value slot read by the rendering layer. Absent when the last
/// tick found no face.
pub type SharedSnapshot = Arc<Mutex<Option<DetectionSnapshot>>>;

/// Write handle bound to one loop generation. Publishes are dropped once
/// the loop has been cancelled, so a slow detection finishing after
/// teardown never writes to torn-down state.
struct SnapshotPublisher {
    slot: SharedSnapshot,
    generation: Arc<AtomicU64>,
    generation_at_start: u64,
}

impl SnapshotPublisher {
    fn new(slot: SharedSnapshot, generation: Arc<AtomicU64>) -> Self {
        let generation_at_start = generation.load(Ordering::SeqCst);
        Self {
            slot,
            generation,
            generation_at_start,
        }
    }

    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.generation_at_start
    }

    /// Replaces the published snapshot; an absent value clears any prior
    /// result. Returns false without writing when stale.
    fn publish(&self, snapshot: Option<DetectionSnapshot>) -> bool {
        if !self.is_current() {
            return false;
        }
        *self.slot.lock().unwrap() = snapshot;
        true
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    /// No frame was available; nothing happened
    Skipped,
    /// A face was found and its snapshot published
    Published,
    /// No face was found; the prior snapshot was cleared
    Cleared,
    /// The loop was cancelled while detecting; the result was discarded
    Stale,
    /// The detector errored; the prior snapshot stays as-is
    Failed,
}

/// One detection tick: consume the current frame if there is one, run the
/// detector, publish the outcome. Detector errors are logged and swallowed
/// so a single bad tick never terminates the loop.
fn run_tick(
    detector: &mut dyn ExpressionDetector,
    frame: Option<Frame>,
    publisher: &SnapshotPublisher,
) -> TickOutcome {
    let Some(frame) = frame else {
        return TickOutcome::Skipped;
    };

    match detector.detect(&frame) {
        Ok(Some(face)) => {
            let snapshot = DetectionSnapshot {
                face,
                frame_width: frame.width,
                frame_height: frame.height,
            };
            if publisher.publish(Some(snapshot)) {
                TickOutcome::Published
            } else {
                TickOutcome::Stale
            }
        }
        Ok(None) => {
            if publisher.publish(None) {
                TickOutcome::Cleared
            } else {
                TickOutcome::Stale
            }
        }
        Err(e) => {
            error!("Detection tick failed: {}", e);
            TickOutcome::Failed
        }
    }
}

/// Recurring detection poll. Cancellation works through a monotonically
/// increasing generation counter: stop() bumps it, the loop observes the
/// bump on its next tick and exits, and any in-flight result from the old
/// generation is discarded at publish time.
pub struct DetectionLoop {
    generation: Arc<AtomicU64>,
    running: bool,
}

impl DetectionLoop {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            running: false,
        }
    }

    /// Spawns the polling thread. A second call while a loop is active is
    /// a no-op.
    pub fn start(
        &mut self,
        mut detector: Box<dyn ExpressionDetector>,
        mut frames: mpsc::Receiver<Frame>,
        snapshot: SharedSnapshot,
        interval: Duration,
    ) {
        if self.running {
            return;
        }
        self.running = true;

        let publisher = SnapshotPublisher::new(snapshot, self.generation.clone());

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create detection runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    if !publisher.is_current() {
                        break;
                    }

                    // Only the most recent frame matters; older queued
                    // frames are dropped
                    let mut latest = None;
                    while let Ok(frame) = frames.try_recv() {
                        latest = Some(frame);
                    }

                    run_tick(detector.as_mut(), latest, &publisher);
                }

                info!("Detection loop exited");
            });
        });
    }

    /// Cancels the active loop. Only the first call bumps the generation;
    /// repeated calls are no-ops.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn generation_value(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for DetectionLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MoodLensError;
    use crate::models::{EmotionDistribution, EmotionLabel, FaceExpression, FaceRegion};

    /// Scripted detector: pops the front result on every call
    struct StubDetector {
        results: Vec<crate::error::Result<Option<FaceExpression>>>,
    }

    impl StubDetector {
        fn new(results: Vec<crate::error::Result<Option<FaceExpression>>>) -> Self {
            Self { results }
        }
    }

    impl ExpressionDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> crate::error::Result<Option<FaceExpression>> {
            self.results.remove(0)
        }
    }

    fn face() -> FaceExpression {
        let mut expressions = EmotionDistribution::new();
        expressions.set(EmotionLabel::Happy, 0.9);
        FaceExpression {
            region: FaceRegion::new(10.0, 20.0, 100.0, 120.0),
            expressions,
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 640 * 480 * 3], 640, 480)
    }

    fn publisher(slot: &SharedSnapshot) -> (SnapshotPublisher, Arc<AtomicU64>) {
        let generation = Arc::new(AtomicU64::new(0));
        (
            SnapshotPublisher::new(slot.clone(), generation.clone()),
            generation,
        )
    }

    #[test]
    fn test_tick_without_frame_is_noop() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let (publisher, _) = publisher(&slot);
        let mut detector = StubDetector::new(vec![]);

        let outcome = run_tick(&mut detector, None, &publisher);
        assert_eq!(outcome, TickOutcome::Skipped);
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_tick_with_detection_publishes_snapshot() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let (publisher, _) = publisher(&slot);
        let mut detector = StubDetector::new(vec![Ok(Some(face()))]);

        let outcome = run_tick(&mut detector, Some(frame()), &publisher);
        assert_eq!(outcome, TickOutcome::Published);

        let published = slot.lock().unwrap().clone().unwrap();
        assert_eq!(published.frame_width, 640);
        assert_eq!(published.frame_height, 480);
        assert_eq!(published.face.region, FaceRegion::new(10.0, 20.0, 100.0, 120.0));
    }

    #[test]
    fn test_tick_without_face_clears_prior_snapshot() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let (publisher, _) = publisher(&slot);
        let mut detector = StubDetector::new(vec![Ok(Some(face())), Ok(None)]);

        assert_eq!(
            run_tick(&mut detector, Some(frame()), &publisher),
            TickOutcome::Published
        );
        assert!(slot.lock().unwrap().is_some());

        assert_eq!(
            run_tick(&mut detector, Some(frame()), &publisher),
            TickOutcome::Cleared
        );
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_tick_error_is_swallowed_and_keeps_prior() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let (publisher, _) = publisher(&slot);
        let mut detector = StubDetector::new(vec![
            Ok(Some(face())),
            Err(MoodLensError::FaceDetection("transient".to_string())),
        ]);

        run_tick(&mut detector, Some(frame()), &publisher);
        assert_eq!(
            run_tick(&mut detector, Some(frame()), &publisher),
            TickOutcome::Failed
        );
        // Prior snapshot stays published across a failed tick
        assert!(slot.lock().unwrap().is_some());
    }

    #[test]
    fn test_stale_generation_discards_result() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let (publisher, generation) = publisher(&slot);
        let mut detector = StubDetector::new(vec![Ok(Some(face()))]);

        // Cancellation happens while the detection is in flight
        generation.fetch_add(1, Ordering::SeqCst);

        let outcome = run_tick(&mut detector, Some(frame()), &publisher);
        assert_eq!(outcome, TickOutcome::Stale);
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_stop_bumps_generation_exactly_once() {
        let slot: SharedSnapshot = Arc::new(Mutex::new(None));
        let mut detection_loop = DetectionLoop::new();
        let (_sender, receiver) = mpsc::channel::<Frame>(4);

        detection_loop.start(
            Box::new(StubDetector::new(vec![])),
            receiver,
            slot,
            Duration::from_millis(100),
        );
        assert_eq!(detection_loop.generation_value(), 0);

        detection_loop.stop();
        assert_eq!(detection_loop.generation_value(), 1);

        // Repeated stops must not bump again
        detection_loop.stop();
        assert_eq!(detection_loop.generation_value(), 1);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut detection_loop = DetectionLoop::new();
        detection_loop.stop();
        assert_eq!(detection_loop.generation_value(), 0);
    }
}
