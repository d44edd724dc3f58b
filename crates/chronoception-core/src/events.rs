use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Outcome, Verdict};

/// Every state change in the round controller produces an Event.
/// Subscribers (loggers, front ends) receive them over a broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RoundStarted {
        round_id: u64,
        interval_seconds: f64,
        window_seconds: f64,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    RoundResolved {
        round_id: u64,
        verdict: Verdict,
        outcome: Outcome,
        elapsed_seconds: Option<f64>,
        at: DateTime<Utc>,
    },
    /// Round cycle stopped; stats kept.
    RoundReset {
        at: DateTime<Utc>,
    },
    StatsReset {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::RoundStarted { at, .. }
            | Event::RoundResolved { at, .. }
            | Event::RoundReset { at }
            | Event::StatsReset { at } => *at,
        }
    }
}
