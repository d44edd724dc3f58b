//! The only way to touch the round state.
//!
//! All mutations run under one mutex so the check-then-mutate sequences in
//! start/resolve never interleave. The state has no partially-updated
//! windows, so a poisoned lock is recovered rather than propagated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::history::HistoryEntry;
use super::state::{Resolution, RoundParams, RoundStart, RoundState, Stats, TimeoutReport};
use crate::error::RoundError;
use crate::events::Event;

const EVENT_BUFFER: usize = 64;

/// Stats plus the bounded history, newest last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub stats: Stats,
    pub history: Vec<HistoryEntry>,
}

/// Point-in-time view of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub active: bool,
    pub armed: bool,
    pub round_id: u64,
    pub params: Option<RoundParams>,
    pub start_instant: Option<DateTime<Utc>>,
    pub deadline_instant: Option<DateTime<Utc>>,
}

pub struct RoundController {
    state: Mutex<RoundState>,
    events: broadcast::Sender<Event>,
}

impl RoundController {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(RoundState::new()),
            events,
        }
    }

    /// Receive every event produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(
        &self,
        interval_minutes: f64,
        window_seconds: f64,
    ) -> Result<RoundStart, RoundError> {
        self.start_at(interval_minutes, window_seconds, Utc::now())
    }

    pub fn start_at(
        &self,
        interval_minutes: f64,
        window_seconds: f64,
        now: DateTime<Utc>,
    ) -> Result<RoundStart, RoundError> {
        let mut state = self.lock();
        let started = RoundParams::new(interval_minutes, window_seconds)
            .and_then(|params| state.start(params, now))
            .inspect_err(|e| {
                tracing::debug!(interval_minutes, window_seconds, "start rejected: {e}");
            })?;
        tracing::info!(
            round_id = started.round_id,
            interval_seconds = started.interval_seconds,
            window_seconds = started.window_seconds,
            "round started"
        );
        // Sent under the lock so subscribers see events in state order.
        self.emit(Event::RoundStarted {
            round_id: started.round_id,
            interval_seconds: started.interval_seconds,
            window_seconds: started.window_seconds,
            deadline: started.deadline_instant,
            at: now,
        });
        Ok(started)
    }

    pub fn resolve_click(
        &self,
        client_elapsed: Option<f64>,
        round_id: Option<u64>,
    ) -> Result<Resolution, RoundError> {
        self.resolve_click_at(client_elapsed, round_id, Utc::now())
    }

    pub fn resolve_click_at(
        &self,
        client_elapsed: Option<f64>,
        round_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, RoundError> {
        let mut state = self.lock();
        let result = state.resolve_click(client_elapsed, round_id, now);
        self.after_resolve("click", result)
    }

    pub fn resolve_timeout(&self, round_id: Option<u64>) -> Result<Resolution, RoundError> {
        self.resolve_timeout_at(round_id, Utc::now())
    }

    pub fn resolve_timeout_at(
        &self,
        round_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, RoundError> {
        let mut state = self.lock();
        let result = state.resolve_timeout(round_id, now);
        self.after_resolve("timeout", result)
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        let at = Utc::now();
        state.reset();
        tracing::info!("round cycle reset");
        self.emit(Event::RoundReset { at });
    }

    pub fn reset_stats(&self) {
        let mut state = self.lock();
        let at = Utc::now();
        state.reset_stats();
        tracing::info!("stats reset");
        self.emit(Event::StatsReset { at });
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn peek_timeout(&self) -> TimeoutReport {
        self.peek_timeout_at(Utc::now())
    }

    pub fn peek_timeout_at(&self, now: DateTime<Utc>) -> TimeoutReport {
        self.lock().peek_timeout(now)
    }

    pub fn stats(&self) -> StatsSnapshot {
        let state = self.lock();
        StatsSnapshot {
            stats: state.stats(),
            history: state.history().to_vec(),
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let state = self.lock();
        RoundSnapshot {
            active: state.is_active(),
            armed: state.is_armed(),
            round_id: state.round_id(),
            params: state.params(),
            start_instant: state.start_instant(),
            deadline_instant: state.deadline_instant(),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Callers hold the state lock while this runs.
    fn after_resolve(
        &self,
        source: &'static str,
        result: Result<Resolution, RoundError>,
    ) -> Result<Resolution, RoundError> {
        match &result {
            Ok(res) => {
                tracing::info!(
                    source,
                    round_id = res.round_id,
                    verdict = ?res.verdict,
                    elapsed = ?res.elapsed_seconds,
                    total = res.stats.total,
                    "round resolved"
                );
                self.emit(Event::RoundResolved {
                    round_id: res.round_id,
                    verdict: res.verdict,
                    outcome: res.outcome,
                    elapsed_seconds: res.elapsed_seconds,
                    at: res.resolved_at,
                });
            }
            Err(e) => tracing::debug!(source, "resolution rejected: {e}"),
        }
        result
    }
}

impl Default for RoundController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Verdict;
    use chrono::Duration;

    #[test]
    fn start_then_click_scores() {
        let controller = RoundController::new();
        let t0 = Utc::now();
        let started = controller.start_at(1.0, 5.0, t0).unwrap();
        assert_eq!(started.interval_seconds, 60.0);

        let res = controller.resolve_click_at(Some(57.0), None, t0).unwrap();
        assert_eq!(res.verdict, Verdict::Success);
        assert_eq!(res.window.as_pair(), [55.0, 60.0]);
        assert_eq!(res.stats.success, 1);
    }

    #[test]
    fn inactive_resolution_does_not_mutate() {
        let controller = RoundController::new();
        assert_eq!(
            controller.resolve_click(Some(57.0), None),
            Err(RoundError::RoundNotActive)
        );
        assert_eq!(
            controller.resolve_timeout(None),
            Err(RoundError::RoundNotActive)
        );
        let snap = controller.stats();
        assert_eq!(snap.stats, Stats::default());
        assert!(snap.history.is_empty());
    }

    #[test]
    fn events_are_broadcast() {
        let controller = RoundController::new();
        let mut rx = controller.subscribe();
        controller.start(1.0, 5.0).unwrap();
        controller.resolve_timeout(None).unwrap();
        controller.reset();

        assert!(matches!(rx.try_recv(), Ok(Event::RoundStarted { round_id: 1, .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(Event::RoundResolved {
                verdict: Verdict::TimedOut,
                ..
            })
        ));
        assert!(matches!(rx.try_recv(), Ok(Event::RoundReset { .. })));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let controller = RoundController::new();
        for interval in [1.0e12, 1.0e308, f64::MAX] {
            assert!(matches!(
                controller.start(interval, 5.0),
                Err(RoundError::InvalidParameters { .. })
            ));
        }
        assert!(!controller.snapshot().active);
        controller.start(1.0, 5.0).unwrap();
    }

    #[test]
    fn concurrent_events_follow_state_order() {
        use std::sync::Arc;

        let controller = Arc::new(RoundController::new());
        let mut rx = controller.subscribe();
        // 4 threads x 8 iterations x at most 2 events fits the buffer.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&controller);
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        c.start(1.0, 5.0).unwrap();
                        let _ = c.resolve_timeout(None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut last = 0;
        while let Ok(event) = rx.try_recv() {
            let id = match event {
                Event::RoundStarted { round_id, .. } | Event::RoundResolved { round_id, .. } => {
                    round_id
                }
                _ => continue,
            };
            assert!(id >= last, "event for round {id} after round {last}");
            last = id;
        }
        assert!(last > 0);
    }

    #[test]
    fn snapshot_tracks_arming() {
        let controller = RoundController::new();
        let t0 = Utc::now();
        controller.start_at(1.0, 5.0, t0).unwrap();
        let snap = controller.snapshot();
        assert!(snap.active && snap.armed);
        assert_eq!(snap.deadline_instant, Some(t0 + Duration::seconds(60)));

        controller.resolve_timeout_at(None, t0).unwrap();
        let snap = controller.snapshot();
        assert!(snap.active && !snap.armed);
        assert_eq!(snap.round_id, 2);
    }

    #[test]
    fn concurrent_resolutions_score_once() {
        use std::sync::Arc;

        let controller = Arc::new(RoundController::new());
        controller.start(1.0, 5.0).unwrap();
        let round_id = controller.snapshot().round_id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = Arc::clone(&controller);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        c.resolve_click(Some(57.0), Some(round_id)).is_ok()
                    } else {
                        c.resolve_timeout(Some(round_id)).is_ok()
                    }
                })
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 1);
        assert_eq!(controller.stats().stats.total, 1);
    }
}
