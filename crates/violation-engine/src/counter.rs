//! Per-kind sliding counters

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ViolationKind;

/// Rise/decay/cooldown parameters for one counter
///
/// Asymmetric rise and decay: a violation must persist to register, but
/// recovery is gradual rather than instant, so rapid fidgeting cannot game
/// the detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CounterPolicy {
    /// Consecutive matching ticks required before an event fires
    pub rise_threshold: u32,
    /// Ticks subtracted per non-matching valid tick, floored at 0
    pub decay_rate: u32,
    /// Valid ticks after a fire during which no second event may fire
    pub cooldown_ticks: u32,
}

/// What one observed tick did to a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    /// Nothing crossed the threshold
    Quiet,
    /// Threshold crossed; one event fires. Carries the tick count at fire
    /// time (the counter itself has already reset to 0).
    Fired { ticks_at_fire: u32 },
    /// Threshold crossed during cooldown; counted but no event
    Suppressed,
}

/// Sliding counter for one violation kind
///
/// Owned exclusively by the debouncer; mutated once per valid sampling
/// tick and never shared across attempts. `consecutive_ticks` resets to 0
/// the moment it exceeds the rise threshold, so it is never observed above
/// the threshold between ticks.
#[derive(Debug, Clone)]
pub struct ViolationCounter {
    kind: ViolationKind,
    policy: CounterPolicy,
    consecutive_ticks: u32,
    cooldown_remaining: u32,
}

impl ViolationCounter {
    pub fn new(kind: ViolationKind, policy: CounterPolicy) -> Self {
        Self {
            kind,
            policy,
            consecutive_ticks: 0,
            cooldown_remaining: 0,
        }
    }

    /// Feed one valid tick
    ///
    /// Skipped ticks (inference errors, degenerate geometry) must not reach
    /// this method at all: they neither advance nor decay the counter.
    pub fn observe(&mut self, matched: bool) -> CounterOutcome {
        let cooling = self.cooldown_remaining > 0;

        if matched {
            self.consecutive_ticks += 1;
        } else {
            self.consecutive_ticks = self.consecutive_ticks.saturating_sub(self.policy.decay_rate);
        }

        let mut outcome = CounterOutcome::Quiet;
        if self.consecutive_ticks > self.policy.rise_threshold {
            let ticks_at_fire = self.consecutive_ticks;
            self.consecutive_ticks = 0;
            outcome = if cooling {
                debug!(kind = ?self.kind, "violation sustained during cooldown, suppressed");
                CounterOutcome::Suppressed
            } else {
                CounterOutcome::Fired { ticks_at_fire }
            };
        }

        if cooling {
            self.cooldown_remaining -= 1;
        }
        if matches!(outcome, CounterOutcome::Fired { .. }) {
            self.cooldown_remaining = self.policy.cooldown_ticks;
        }

        outcome
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn consecutive_ticks(&self) -> u32 {
        self.consecutive_ticks
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining > 0
    }
}
