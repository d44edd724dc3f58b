//! Decision logic of the watchdog, independent of scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::round::TimeoutReport;

/// "The round you armed me for timed out and nobody resolved it."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSignal {
    pub round_id: u64,
    pub deadline: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

/// Why polling stopped without a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The round cycle was reset.
    Inactive,
    /// The server moved on to another round.
    Superseded { current: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDecision {
    /// Not due yet, or signal held back by the cooldown.
    KeepPolling,
    Signal(TimeoutSignal),
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    round_id: u64,
    deadline: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Tracker {
    cooldown: Duration,
    armed: Option<Armed>,
    last_signal_at: Option<Instant>,
    last_signaled_round: Option<u64>,
}

impl Tracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            armed: None,
            last_signal_at: None,
            last_signaled_round: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn armed_round(&self) -> Option<u64> {
        self.armed.map(|a| a.round_id)
    }

    /// Watch `round_id`. A round already signaled is never armed again.
    pub fn arm(&mut self, round_id: u64, deadline: DateTime<Utc>) -> bool {
        if self.last_signaled_round == Some(round_id) {
            return false;
        }
        self.armed = Some(Armed { round_id, deadline });
        true
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn on_report(&mut self, report: &TimeoutReport, now: Instant) -> ProbeDecision {
        let Some(armed) = self.armed else {
            return ProbeDecision::KeepPolling;
        };
        if !report.active {
            self.armed = None;
            return ProbeDecision::Stop(StopReason::Inactive);
        }
        if report.round_id != armed.round_id {
            self.armed = None;
            return ProbeDecision::Stop(StopReason::Superseded {
                current: report.round_id,
            });
        }
        if !report.timed_out {
            return ProbeDecision::KeepPolling;
        }
        if let Some(last) = self.last_signal_at {
            if now.duration_since(last) < self.cooldown {
                return ProbeDecision::KeepPolling;
            }
        }
        self.armed = None;
        self.last_signal_at = Some(now);
        self.last_signaled_round = Some(armed.round_id);
        ProbeDecision::Signal(TimeoutSignal {
            round_id: armed.round_id,
            deadline: armed.deadline,
            observed_at: report.now,
        })
    }
}
