//! Async session controller

use attempt::{AttemptLifecycle, TestAttempt};
use chrono::Utc;
use frame_capture::{CaptureBackend, DeviceHandle, Frame, FrameSampler};
use integrity_ledger::{IntegrityStatus, ViolationStore};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use violation_engine::{BrowserSignal, FaceCount, TickObservation};
use vision::{FaceClassifier, VisionConfig};

use crate::engine::{Directive, EndReason, SessionEngine, SessionPhase};
use crate::status::{CameraPermission, ProctorStatus};
use crate::SessionConfig;

const COMMAND_QUEUE_DEPTH: usize = 32;

enum AcquisitionOutcome {
    Ready(DeviceHandle),
    Unavailable {
        reason: String,
        camera: CameraPermission,
    },
}

/// Commands serialized onto the session's single event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Discrete browser-originated signal
    Browser(BrowserSignal),
    /// Page went background; stop consuming frames
    Suspend,
    /// Page is foreground again
    Resume,
    /// End the session
    End(EndReason),
}

/// Clonable handle for feeding commands into a running session
///
/// Sends are fire-and-forget: once the session has ended, commands are
/// silently dropped, which makes every caller-side path idempotent.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn report_signal(&self, signal: BrowserSignal) {
        self.send(SessionCommand::Browser(signal)).await;
    }

    pub async fn suspend(&self) {
        self.send(SessionCommand::Suspend).await;
    }

    pub async fn resume(&self) {
        self.send(SessionCommand::Resume).await;
    }

    pub async fn submit(&self) {
        self.send(SessionCommand::End(EndReason::Submitted)).await;
    }

    pub async fn cancel(&self) {
        self.send(SessionCommand::End(EndReason::Cancelled)).await;
    }

    async fn send(&self, command: SessionCommand) {
        if self.tx.send(command).await.is_err() {
            debug!(?command, "session already ended, command dropped");
        }
    }
}

/// Final report returned when the session loop exits
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub attempt_id: Uuid,
    pub phase: SessionPhase,
    pub integrity: IntegrityStatus,
    pub total_events: usize,
}

/// Orchestrates one attempt's proctoring from acquisition to teardown
pub struct ProctorSessionController<C, L, S>
where
    C: FaceClassifier,
    L: AttemptLifecycle,
    S: ViolationStore,
{
    engine: SessionEngine<L, S>,
    classifier: C,
    backend: Option<Box<dyn CaptureBackend>>,
    config: SessionConfig,
    commands: mpsc::Receiver<SessionCommand>,
}

impl<C, L, S> ProctorSessionController<C, L, S>
where
    C: FaceClassifier,
    L: AttemptLifecycle,
    S: ViolationStore,
{
    /// Build a controller plus its command handle and status feed
    pub fn new(
        attempt: TestAttempt,
        classifier: C,
        backend: Box<dyn CaptureBackend>,
        config: SessionConfig,
        lifecycle: L,
        store: S,
    ) -> (Self, SessionHandle, watch::Receiver<ProctorStatus>) {
        let (feed, status_rx) = crate::status::StatusFeed::new();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let engine = SessionEngine::new(attempt, &config, lifecycle, store, feed);
        (
            Self {
                engine,
                classifier,
                backend: Some(backend),
                config,
                commands: rx,
            },
            SessionHandle { tx },
            status_rx,
        )
    }

    /// Drive the session to completion
    ///
    /// Vision ticks, browser commands, and the exam deadline interleave on
    /// this one loop; nothing else mutates counters or the ledger, so no
    /// locking is needed and ledger append order is the observable event
    /// order.
    pub async fn run(self) -> SessionReport {
        let Self {
            mut engine,
            mut classifier,
            backend,
            config,
            mut commands,
        } = self;

        engine.begin_acquiring();
        let mut device = match Self::acquire(backend, &mut classifier, &config) {
            AcquisitionOutcome::Ready(handle) => {
                engine.activate();
                Some(handle)
            }
            AcquisitionOutcome::Unavailable { reason, camera } => {
                engine.degrade(&reason, camera);
                None
            }
        };

        let deadline = Instant::now()
            + engine
                .attempt()
                .remaining(Utc::now())
                .to_std()
                .unwrap_or_default();

        loop {
            let sampling = engine.is_sampling() && device.is_some();
            let event = tokio::select! {
                biased;
                command = commands.recv() => LoopEvent::Command(command),
                _ = tokio::time::sleep_until(deadline) => LoopEvent::DeadlineReached,
                frame = Self::pull(&mut device), if sampling => LoopEvent::Frame(frame),
            };

            match event {
                LoopEvent::Command(None) => {
                    // Every handle dropped; treat as cancellation
                    Self::teardown(&mut engine, &mut device, EndReason::Cancelled);
                    break;
                }
                LoopEvent::Command(Some(SessionCommand::Suspend)) => engine.suspend(),
                LoopEvent::Command(Some(SessionCommand::Resume)) => engine.resume(),
                LoopEvent::Command(Some(SessionCommand::Browser(signal))) => {
                    if let Directive::EndAttempt(reason) = engine.browser_signal(signal) {
                        Self::teardown(&mut engine, &mut device, reason);
                        break;
                    }
                }
                LoopEvent::Command(Some(SessionCommand::End(reason))) => {
                    Self::teardown(&mut engine, &mut device, reason);
                    break;
                }
                LoopEvent::DeadlineReached => {
                    info!(attempt_id = %engine.attempt().id, "exam deadline reached");
                    Self::teardown(&mut engine, &mut device, EndReason::AutoSubmitted);
                    break;
                }
                LoopEvent::Frame(None) => {
                    // Device produced nothing this interval; drop the tick
                }
                LoopEvent::Frame(Some(frame)) => {
                    if let Some(obs) = Self::classify(&mut classifier, &frame, &config.vision) {
                        if let Directive::EndAttempt(reason) = engine.observe_tick(&obs) {
                            Self::teardown(&mut engine, &mut device, reason);
                            break;
                        }
                    }
                }
            }
        }

        SessionReport {
            attempt_id: engine.attempt().id,
            phase: engine.phase(),
            integrity: engine.ledger().status(),
            total_events: engine.ledger().total_events(),
        }
    }

    fn acquire(
        backend: Option<Box<dyn CaptureBackend>>,
        classifier: &mut C,
        config: &SessionConfig,
    ) -> AcquisitionOutcome {
        let Some(backend) = backend else {
            return AcquisitionOutcome::Unavailable {
                reason: "no capture backend supplied".into(),
                camera: CameraPermission::Denied,
            };
        };

        let handle = match FrameSampler::acquire(backend, config.constraints.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let camera = match e {
                    frame_capture::AcquisitionError::PermissionDenied => CameraPermission::Denied,
                    _ => CameraPermission::Prompt,
                };
                return AcquisitionOutcome::Unavailable {
                    reason: e.to_string(),
                    camera,
                };
            }
        };

        if let Err(e) = classifier.load() {
            // The device came up but the model did not; release the tracks
            // before degrading (the handle drop does it).
            return AcquisitionOutcome::Unavailable {
                reason: e.to_string(),
                camera: CameraPermission::Granted,
            };
        }

        AcquisitionOutcome::Ready(handle)
    }

    async fn pull(device: &mut Option<DeviceHandle>) -> Option<Frame> {
        match device.as_mut() {
            Some(handle) => handle.next_frame().await,
            // Unreachable behind the select precondition; park forever
            // rather than spinning if it ever is polled.
            None => std::future::pending().await,
        }
    }

    /// Classify one frame into a tick observation
    ///
    /// Returns `None` for skipped ticks (inference error): no counter may
    /// advance or decay on those.
    fn classify(classifier: &mut C, frame: &Frame, vision: &VisionConfig) -> Option<TickObservation> {
        let faces = match classifier.infer(frame) {
            Ok(faces) => faces,
            Err(e) => {
                debug!(error = %e, "inference failed, tick skipped");
                return None;
            }
        };

        let face_count = FaceCount::from(faces.len());
        let gaze = match faces.as_slice() {
            [face] => vision::gaze::observe(face, vision),
            _ => None,
        };
        Some(TickObservation { face_count, gaze })
    }

    /// Ordered, idempotent teardown: device first, then ledger
    fn teardown(
        engine: &mut SessionEngine<L, S>,
        device: &mut Option<DeviceHandle>,
        reason: EndReason,
    ) {
        if let Some(mut handle) = device.take() {
            if !handle.release() {
                warn!("device was already released at teardown");
            }
        }
        engine.finish(reason);
    }
}

enum LoopEvent {
    Command(Option<SessionCommand>),
    DeadlineReached,
    Frame(Option<Frame>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AiStatus;
    use attempt::AttemptError;
    use frame_capture::{AcquisitionError, CaptureConstraints};
    use integrity_ledger::InMemoryViolationStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use violation_engine::ViolationKind;
    use vision::{DetectedFace, InferenceError, LoadError};

    struct ScriptedBackend {
        reads: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
        deny: bool,
        sequence: u32,
    }

    impl ScriptedBackend {
        fn new(deny: bool) -> (Self, Arc<AtomicU32>, Arc<AtomicU32>) {
            let reads = Arc::new(AtomicU32::new(0));
            let closes = Arc::new(AtomicU32::new(0));
            (
                Self {
                    reads: reads.clone(),
                    closes: closes.clone(),
                    deny,
                    sequence: 0,
                },
                reads,
                closes,
            )
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn open(&mut self, _constraints: &CaptureConstraints) -> Result<(), AcquisitionError> {
            if self.deny {
                Err(AcquisitionError::PermissionDenied)
            } else {
                Ok(())
            }
        }

        fn read_frame(&mut self) -> Option<Frame> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.sequence += 1;
            Some(Frame::new(
                vec![0; 4 * 4 * 3],
                4,
                4,
                self.sequence as u64 * 66,
                self.sequence,
            ))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Classifier scripted to report a fixed face count or always error
    struct ScriptedClassifier {
        faces_per_frame: usize,
        always_fail: bool,
    }

    impl FaceClassifier for ScriptedClassifier {
        fn load(&mut self) -> Result<(), LoadError> {
            Ok(())
        }

        fn infer(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError> {
            if self.always_fail {
                return Err(InferenceError::Inference("decoder stalled".into()));
            }
            Ok((0..self.faces_per_frame)
                .map(|_| DetectedFace {
                    bbox: vision::BoundingBox {
                        x: 10.0,
                        y: 10.0,
                        width: 100.0,
                        height: 120.0,
                    },
                    landmarks: vec![(80.0, 50.0), (40.0, 50.0), (60.0, 80.0)],
                    confidence: 0.9,
                })
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLifecycle {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl AttemptLifecycle for RecordingLifecycle {
        fn submit(&mut self, _id: Uuid) -> Result<(), AttemptError> {
            self.calls.lock().unwrap().push("submit".into());
            Ok(())
        }

        fn auto_submit(&mut self, _id: Uuid) -> Result<(), AttemptError> {
            self.calls.lock().unwrap().push("auto_submit".into());
            Ok(())
        }

        fn terminate(&mut self, _id: Uuid, _reason: &str) -> Result<(), AttemptError> {
            self.calls.lock().unwrap().push("terminate".into());
            Ok(())
        }
    }

    fn controller(
        backend: ScriptedBackend,
        classifier: ScriptedClassifier,
        config: SessionConfig,
    ) -> (
        ProctorSessionController<ScriptedClassifier, RecordingLifecycle, Arc<InMemoryViolationStore>>,
        SessionHandle,
        watch::Receiver<ProctorStatus>,
        RecordingLifecycle,
        Arc<InMemoryViolationStore>,
    ) {
        let lifecycle = RecordingLifecycle::default();
        let store = Arc::new(InMemoryViolationStore::new());
        let attempt = TestAttempt::start(Uuid::new_v4(), 3600);
        let (controller, handle, status) = ProctorSessionController::new(
            attempt,
            classifier,
            Box::new(backend),
            config,
            lifecycle.clone(),
            store.clone(),
        );
        (controller, handle, status, lifecycle, store)
    }

    #[tokio::test]
    async fn test_denied_device_degrades_but_keeps_event_monitoring() {
        let (backend, _, _) = ScriptedBackend::new(true);
        let classifier = ScriptedClassifier {
            faces_per_frame: 1,
            always_fail: false,
        };
        let (c, handle, status, _, store) = controller(backend, classifier, SessionConfig::default());

        let task = tokio::spawn(c.run());
        handle.report_signal(BrowserSignal::TabSwitch).await;
        handle.submit().await;
        let report = task.await.unwrap();

        assert_eq!(report.phase, SessionPhase::Ended { degraded: true });
        assert_eq!(status.borrow().camera, CameraPermission::Denied);

        let rows = store.rows_for_attempt(report.attempt_id, None, 10).unwrap();
        let kinds: Vec<_> = rows.iter().map(|r| r.violation_type.as_str()).collect();
        assert!(kinds.contains(&"device_unavailable"));
        assert!(kinds.contains(&"tab_switch"));
    }

    #[tokio::test]
    async fn test_double_cancel_releases_device_once() {
        let (backend, _, closes) = ScriptedBackend::new(false);
        let classifier = ScriptedClassifier {
            faces_per_frame: 1,
            always_fail: false,
        };
        let (c, handle, _, _, _) = controller(backend, classifier, SessionConfig::default());

        let task = tokio::spawn(c.run());
        handle.cancel().await;
        handle.cancel().await;
        let report = task.await.unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(report.phase, SessionPhase::Ended { degraded: false });
    }

    #[tokio::test]
    async fn test_sustained_no_face_terminates_attempt() {
        let (backend, _, closes) = ScriptedBackend::new(false);
        let classifier = ScriptedClassifier {
            faces_per_frame: 0,
            always_fail: false,
        };
        let mut config = SessionConfig::default();
        config.debounce.no_face.rise_threshold = 2;
        config.debounce.no_face.cooldown_ticks = 0;
        config.escalation.hard_total_limit = 1;
        let (c, _handle, status, lifecycle, store) = controller(backend, classifier, config);

        let report = c.run().await;

        assert_eq!(report.integrity, IntegrityStatus::Terminated);
        assert_eq!(report.phase, SessionPhase::Ended { degraded: false });
        assert_eq!(status.borrow().ai, AiStatus::NoFace);
        assert_eq!(lifecycle.calls.lock().unwrap().as_slice(), ["terminate"]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        let summary = store.attempt_summary(report.attempt_id).unwrap();
        assert!(summary.terminated);
    }

    #[tokio::test]
    async fn test_inference_errors_skip_ticks_entirely() {
        let (backend, reads, _) = ScriptedBackend::new(false);
        let classifier = ScriptedClassifier {
            faces_per_frame: 0,
            always_fail: true,
        };
        let mut config = SessionConfig::default();
        config.debounce.no_face.rise_threshold = 1;
        let (c, handle, _, _, store) = controller(backend, classifier, config);

        let task = tokio::spawn(c.run());
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.submit().await;
        let report = task.await.unwrap();

        // Frames were consumed, but every tick was skipped: no counter
        // moved, no event fired
        assert!(reads.load(Ordering::SeqCst) > 0);
        assert_eq!(report.total_events, 0);
        let rows = store
            .rows_for_attempt(report.attempt_id, Some(ViolationKind::NoFace), 10)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_suspend_stops_frame_consumption() {
        let (backend, reads, _) = ScriptedBackend::new(false);
        let classifier = ScriptedClassifier {
            faces_per_frame: 1,
            always_fail: false,
        };
        let (c, handle, _, _, _) = controller(backend, classifier, SessionConfig::default());

        let task = tokio::spawn(c.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.suspend().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let at_suspend = reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(reads.load(Ordering::SeqCst), at_suspend);

        handle.resume().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(reads.load(Ordering::SeqCst) > at_suspend);

        handle.submit().await;
        let report = task.await.unwrap();
        assert_eq!(report.phase, SessionPhase::Ended { degraded: false });
    }

    #[tokio::test]
    async fn test_expired_attempt_auto_submits() {
        let (backend, _, _) = ScriptedBackend::new(false);
        let classifier = ScriptedClassifier {
            faces_per_frame: 1,
            always_fail: false,
        };
        let lifecycle = RecordingLifecycle::default();
        let store = Arc::new(InMemoryViolationStore::new());
        // Deadline already passed when the session starts
        let mut attempt = TestAttempt::start(Uuid::new_v4(), 1);
        attempt.started_at = attempt.started_at - chrono::Duration::seconds(10);
        let (c, _handle, _status) = ProctorSessionController::new(
            attempt,
            classifier,
            Box::new(backend),
            SessionConfig::default(),
            lifecycle.clone(),
            store.clone(),
        );

        let report = c.run().await;
        assert_eq!(report.phase, SessionPhase::Ended { degraded: false });
        assert_eq!(lifecycle.calls.lock().unwrap().as_slice(), ["auto_submit"]);
    }
}
