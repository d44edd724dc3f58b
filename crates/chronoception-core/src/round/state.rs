//! Authoritative round state machine.
//!
//! Wall-clock based, no internal threads. Every command takes the instant it
//! happens at, so the caller owns time and tests can replay exact sequences.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start--> Open --resolve--> Open (unarmed) --start--> Open
//!                  |                      |
//!                  +-------reset----------+----> Idle
//! ```
//!
//! A resolution keeps the round continuous: the start instant moves to the
//! resolution instant and the round id advances, but the deadline stays
//! cleared until the caller re-arms with `start`. Resolving an unarmed round
//! is rejected, so one round is scored at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::{History, HistoryEntry};
use crate::clock::{self, Outcome, Verdict, Window};
use crate::error::RoundError;

/// Timing parameters of the current round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundParams {
    pub interval_minutes: f64,
    pub interval_seconds: f64,
    pub window_seconds: f64,
}

impl RoundParams {
    /// Validate start arguments. The interval arrives in minutes.
    pub fn new(interval_minutes: f64, window_seconds: f64) -> Result<Self, RoundError> {
        if !interval_minutes.is_finite() || interval_minutes <= 0.0 {
            return Err(RoundError::invalid("interval must be greater than zero"));
        }
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(RoundError::invalid("window must be greater than zero"));
        }
        let interval_seconds = interval_minutes * 60.0;
        if !interval_seconds.is_finite() {
            return Err(RoundError::invalid("interval is too long"));
        }
        if window_seconds >= interval_seconds {
            return Err(RoundError::invalid(format!(
                "window ({window_seconds}s) must be shorter than the interval ({interval_seconds}s)"
            )));
        }
        Ok(Self {
            interval_minutes,
            interval_seconds,
            window_seconds,
        })
    }

    pub fn window(&self) -> Window {
        Window::for_round(self.interval_seconds, self.window_seconds)
    }
}

/// Running totals. `total == success + fail` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub success: u64,
    pub fail: u64,
}

impl Stats {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Fail => self.fail += 1,
        }
    }

    /// Success share in percent, 0 when nothing was played.
    pub fn accuracy_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64 * 100.0
    }
}

/// What `start` hands back to the caller to drive its own timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStart {
    pub round_id: u64,
    pub interval_minutes: f64,
    pub interval_seconds: f64,
    pub window_seconds: f64,
    pub start_instant: DateTime<Utc>,
    pub deadline_instant: DateTime<Utc>,
}

/// Result of an accepted click or timeout resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The round that was scored.
    pub round_id: u64,
    /// The id the round cycle continues under.
    pub next_round_id: u64,
    pub verdict: Verdict,
    pub outcome: Outcome,
    /// `None` for timeouts.
    pub elapsed_seconds: Option<f64>,
    pub window: Window,
    pub resolved_at: DateTime<Utc>,
    pub stats: Stats,
    pub history: Vec<HistoryEntry>,
}

/// Read-only deadline probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutReport {
    pub timed_out: bool,
    pub active: bool,
    pub round_id: u64,
    pub deadline_instant: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// The single process-wide round record.
#[derive(Debug, Clone, Default)]
pub struct RoundState {
    active: bool,
    round_id: u64,
    params: Option<RoundParams>,
    start_instant: Option<DateTime<Utc>>,
    deadline_instant: Option<DateTime<Utc>>,
    stats: Stats,
    history: History,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn params(&self) -> Option<RoundParams> {
        self.params
    }

    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start_instant
    }

    pub fn deadline_instant(&self) -> Option<DateTime<Utc>> {
        self.deadline_instant
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Open and not yet scored.
    pub fn is_armed(&self) -> bool {
        self.active && self.deadline_instant.is_some()
    }

    pub fn peek_timeout(&self, now: DateTime<Utc>) -> TimeoutReport {
        let timed_out = self.active && self.deadline_instant.is_some_and(|d| now >= d);
        TimeoutReport {
            timed_out,
            active: self.active,
            round_id: self.round_id,
            deadline_instant: self.deadline_instant,
            now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Open a round, replacing any current one. Rejected without any change
    /// when the deadline falls outside the representable time range.
    pub(crate) fn start(
        &mut self,
        params: RoundParams,
        now: DateTime<Utc>,
    ) -> Result<RoundStart, RoundError> {
        let deadline = clock::seconds(params.interval_seconds)
            .and_then(|interval| now.checked_add_signed(interval))
            .ok_or_else(|| RoundError::invalid("interval is too long"))?;
        self.round_id += 1;
        self.active = true;
        self.params = Some(params);
        self.start_instant = Some(now);
        self.deadline_instant = Some(deadline);
        Ok(RoundStart {
            round_id: self.round_id,
            interval_minutes: params.interval_minutes,
            interval_seconds: params.interval_seconds,
            window_seconds: params.window_seconds,
            start_instant: now,
            deadline_instant: deadline,
        })
    }

    /// Score a click. Prefers the elapsed time the player perceived.
    pub(crate) fn resolve_click(
        &mut self,
        client_elapsed: Option<f64>,
        expected_round: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, RoundError> {
        let (params, start) = self.claim(expected_round)?;
        if let Some(e) = client_elapsed {
            if !e.is_finite() || e < 0.0 {
                return Err(RoundError::invalid(
                    "client elapsed time must be a non-negative number",
                ));
            }
        }
        let elapsed = client_elapsed.unwrap_or_else(|| clock::elapsed(now, start));
        let verdict = clock::classify(elapsed, params.interval_seconds, params.window_seconds);
        Ok(self.settle(params, verdict, Some(elapsed), now))
    }

    /// Score a missed deadline. Always a failure.
    pub(crate) fn resolve_timeout(
        &mut self,
        expected_round: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, RoundError> {
        let (params, _) = self.claim(expected_round)?;
        Ok(self.settle(params, Verdict::TimedOut, None, now))
    }

    pub(crate) fn reset(&mut self) {
        self.active = false;
        self.start_instant = None;
        self.deadline_instant = None;
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = Stats::default();
        self.history.clear();
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Check that the caller may score the current round. No mutation.
    fn claim(
        &self,
        expected_round: Option<u64>,
    ) -> Result<(RoundParams, DateTime<Utc>), RoundError> {
        if !self.active {
            return Err(RoundError::RoundNotActive);
        }
        if let Some(expected) = expected_round {
            if expected != self.round_id {
                return Err(RoundError::StaleRound {
                    expected,
                    current: self.round_id,
                });
            }
        }
        match (self.params, self.start_instant, self.deadline_instant) {
            (Some(params), Some(start), Some(_)) => Ok((params, start)),
            _ => Err(RoundError::RoundNotActive),
        }
    }

    fn settle(
        &mut self,
        params: RoundParams,
        verdict: Verdict,
        elapsed: Option<f64>,
        now: DateTime<Utc>,
    ) -> Resolution {
        let outcome = verdict.outcome();
        let scored = self.round_id;
        self.stats.record(outcome);
        self.history.push(HistoryEntry {
            outcome,
            verdict,
            round_id: scored,
            resolved_at: now,
        });
        // Continuous rounds: restart the clock, leave the deadline unarmed.
        self.round_id += 1;
        self.start_instant = Some(now);
        self.deadline_instant = None;
        Resolution {
            round_id: scored,
            next_round_id: self.round_id,
            verdict,
            outcome,
            elapsed_seconds: elapsed,
            window: params.window(),
            resolved_at: now,
            stats: self.stats,
            history: self.history.to_vec(),
        }
    }
}
