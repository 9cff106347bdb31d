//! Debounce configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CounterPolicy;

/// Debounce configuration
///
/// Thresholds are tuning defaults, not contracts: every deployment may
/// override them per exam policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// No face visible in frame
    pub no_face: CounterPolicy,

    /// More than one face in frame
    pub multiple_faces: CounterPolicy,

    /// Gaze deviated horizontally
    pub looking_away: CounterPolicy,

    /// Gaze deviated downward
    pub looking_down: CounterPolicy,

    /// Wall-clock cooldown for discrete browser signals, collapsing event
    /// storms (rapid repeated tab switching counts once)
    #[serde(with = "duration_secs")]
    pub discrete_cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            // Face-presence counters recover fully on one clean tick
            no_face: CounterPolicy {
                rise_threshold: 60,
                decay_rate: 60,
                cooldown_ticks: 120,
            },
            multiple_faces: CounterPolicy {
                rise_threshold: 30,
                decay_rate: 30,
                cooldown_ticks: 60,
            },
            // Gaze counters decay gradually
            looking_away: CounterPolicy {
                rise_threshold: 45,
                decay_rate: 2,
                cooldown_ticks: 90,
            },
            looking_down: CounterPolicy {
                rise_threshold: 45,
                decay_rate: 2,
                cooldown_ticks: 90,
            },
            discrete_cooldown: Duration::from_secs(1),
        }
    }
}

impl DebounceConfig {
    /// Strict preset (fires sooner, longer cooldowns)
    pub fn strict() -> Self {
        Self {
            no_face: CounterPolicy {
                rise_threshold: 40,
                decay_rate: 40,
                cooldown_ticks: 120,
            },
            multiple_faces: CounterPolicy {
                rise_threshold: 20,
                decay_rate: 20,
                cooldown_ticks: 60,
            },
            looking_away: CounterPolicy {
                rise_threshold: 30,
                decay_rate: 1,
                cooldown_ticks: 120,
            },
            looking_down: CounterPolicy {
                rise_threshold: 30,
                decay_rate: 1,
                cooldown_ticks: 120,
            },
            discrete_cooldown: Duration::from_secs(2),
        }
    }

    /// Lenient preset (tolerates longer lapses)
    pub fn lenient() -> Self {
        Self {
            no_face: CounterPolicy {
                rise_threshold: 90,
                decay_rate: 90,
                cooldown_ticks: 120,
            },
            multiple_faces: CounterPolicy {
                rise_threshold: 45,
                decay_rate: 45,
                cooldown_ticks: 90,
            },
            looking_away: CounterPolicy {
                rise_threshold: 75,
                decay_rate: 4,
                cooldown_ticks: 90,
            },
            looking_down: CounterPolicy {
                rise_threshold: 75,
                decay_rate: 4,
                cooldown_ticks: 90,
            },
            discrete_cooldown: Duration::from_millis(500),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
