//! Violation debouncing

use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;
use vision::{GazeDirection, GazeObservation};

use crate::counter::{CounterOutcome, ViolationCounter};
use crate::{DebounceConfig, DetailValue, ViolationDetail, ViolationEvent, ViolationKind};

/// Number of faces seen in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceCount {
    None,
    One,
    Many,
}

impl From<usize> for FaceCount {
    fn from(n: usize) -> Self {
        match n {
            0 => FaceCount::None,
            1 => FaceCount::One,
            _ => FaceCount::Many,
        }
    }
}

/// One valid tick's classification outcome
///
/// Skipped ticks (inference error, degenerate gaze geometry with no face
/// signal either) never become a `TickObservation` at all.
#[derive(Debug, Clone, Copy)]
pub struct TickObservation {
    pub face_count: FaceCount,
    /// Present only when exactly one face with reliable geometry was seen
    pub gaze: Option<GazeObservation>,
}

/// Discrete browser-originated signal
///
/// These bypass the rise/decay counters and fire immediately, subject to a
/// per-kind wall-clock cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserSignal {
    TabSwitch,
    FullscreenExit,
    CopyAttempt,
    RightClick,
    DevtoolsOpen,
}

impl BrowserSignal {
    pub fn kind(&self) -> ViolationKind {
        match self {
            BrowserSignal::TabSwitch => ViolationKind::TabSwitch,
            BrowserSignal::FullscreenExit => ViolationKind::FullscreenExit,
            BrowserSignal::CopyAttempt => ViolationKind::CopyAttempt,
            BrowserSignal::RightClick => ViolationKind::RightClick,
            BrowserSignal::DevtoolsOpen => ViolationKind::DevtoolsOpen,
        }
    }

    fn slot(&self) -> usize {
        match self {
            BrowserSignal::TabSwitch => 0,
            BrowserSignal::FullscreenExit => 1,
            BrowserSignal::CopyAttempt => 2,
            BrowserSignal::RightClick => 3,
            BrowserSignal::DevtoolsOpen => 4,
        }
    }
}

/// Converts per-tick classifications and discrete browser signals into
/// rate-limited violation events
///
/// Owns one counter per continuous violation kind in a fixed, pre-sized
/// arena; never shared across attempts.
pub struct ViolationDebouncer {
    attempt_id: Uuid,
    counters: [ViolationCounter; 4],
    discrete_cooldown: Duration,
    last_discrete_fire: [Option<Instant>; 5],
}

impl ViolationDebouncer {
    pub fn new(attempt_id: Uuid, config: &DebounceConfig) -> Self {
        Self {
            attempt_id,
            counters: [
                ViolationCounter::new(ViolationKind::NoFace, config.no_face),
                ViolationCounter::new(ViolationKind::MultipleFaces, config.multiple_faces),
                ViolationCounter::new(ViolationKind::LookingAway, config.looking_away),
                ViolationCounter::new(ViolationKind::LookingDown, config.looking_down),
            ],
            discrete_cooldown: config.discrete_cooldown,
            last_discrete_fire: [None; 5],
        }
    }

    /// Feed one valid tick's observations through every counter
    ///
    /// Gaze counters are only touched when a gaze observation exists this
    /// tick; an unobservable signal neither advances nor decays its
    /// counter.
    pub fn observe_tick(&mut self, obs: &TickObservation) -> Vec<ViolationEvent> {
        let mut events = Vec::new();

        for counter in &mut self.counters {
            let matched = match counter.kind() {
                ViolationKind::NoFace => Some(obs.face_count == FaceCount::None),
                ViolationKind::MultipleFaces => Some(obs.face_count == FaceCount::Many),
                ViolationKind::LookingAway => obs
                    .gaze
                    .map(|g| g.direction == GazeDirection::Away),
                ViolationKind::LookingDown => obs
                    .gaze
                    .map(|g| g.direction == GazeDirection::Down),
                _ => None,
            };
            let Some(matched) = matched else { continue };

            if let CounterOutcome::Fired { ticks_at_fire } = counter.observe(matched) {
                let kind = counter.kind();
                info!(kind = kind.as_str(), ticks_at_fire, "violation fired");
                events.push(ViolationEvent::now(
                    self.attempt_id,
                    kind,
                    Self::tick_detail(kind, ticks_at_fire, obs),
                ));
            }
        }

        events
    }

    /// Feed one discrete browser signal
    ///
    /// Fires immediately unless the same kind fired within the cooldown
    /// window, collapsing event storms.
    pub fn observe_signal(&mut self, signal: BrowserSignal) -> Option<ViolationEvent> {
        let slot = signal.slot();
        let now = Instant::now();

        if let Some(last) = self.last_discrete_fire[slot] {
            if now.duration_since(last) < self.discrete_cooldown {
                debug!(kind = signal.kind().as_str(), "signal within cooldown, collapsed");
                return None;
            }
        }
        self.last_discrete_fire[slot] = Some(now);

        let kind = signal.kind();
        info!(kind = kind.as_str(), "browser signal violation");
        let mut detail = ViolationDetail::new();
        detail.insert("signal".into(), kind.as_str().into());
        Some(ViolationEvent::now(self.attempt_id, kind, detail))
    }

    /// Counter state for one continuous kind (status display, tests)
    pub fn counter(&self, kind: ViolationKind) -> Option<&ViolationCounter> {
        self.counters.iter().find(|c| c.kind() == kind)
    }

    fn tick_detail(kind: ViolationKind, ticks_at_fire: u32, obs: &TickObservation) -> ViolationDetail {
        let mut detail = ViolationDetail::new();
        detail.insert(
            "consecutive_ticks".into(),
            DetailValue::Number(ticks_at_fire as f64),
        );
        if let Some(gaze) = obs.gaze {
            match kind {
                ViolationKind::LookingAway => {
                    detail.insert(
                        "horizontal_ratio".into(),
                        DetailValue::Number(gaze.sample.horizontal_ratio as f64),
                    );
                }
                ViolationKind::LookingDown => {
                    detail.insert(
                        "vertical_ratio".into(),
                        DetailValue::Number(gaze.sample.vertical_ratio as f64),
                    );
                }
                _ => {}
            }
        }
        detail
    }
}
