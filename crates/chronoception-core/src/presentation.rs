//! Client-local presentation timer.
//!
//! Purely cosmetic: it drives the displayed clock and predicts the timeout
//! locally, but scoring stays with the server. It also gates the client so
//! that only one resolution request per round leaves it, whichever of
//! click, local expiry or watchdog signal comes first.

use chrono::{DateTime, Duration, Utc};

use crate::api::StartResponse;
use crate::clock::{self, Window};

/// Local and server clocks further apart than this are not trusted to
/// share an origin.
pub const MAX_TRUSTED_SKEW_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerTick {
    Running { elapsed: f64 },
    /// Reported once, on the first tick at or past the interval.
    Expired { elapsed: f64 },
    /// Already expired or claimed; nothing left to do this round.
    Done { elapsed: f64 },
}

#[derive(Debug, Clone)]
pub struct PresentationTimer {
    round_id: u64,
    anchor: DateTime<Utc>,
    interval_seconds: f64,
    window_seconds: f64,
    expired: bool,
    claimed: bool,
}

impl PresentationTimer {
    pub fn new(
        round_id: u64,
        anchor: DateTime<Utc>,
        interval_seconds: f64,
        window_seconds: f64,
    ) -> Self {
        Self {
            round_id,
            anchor,
            interval_seconds,
            window_seconds,
            expired: false,
            claimed: false,
        }
    }

    /// Anchor on the server's start instant when the two clocks agree,
    /// otherwise on the moment the start answer arrived.
    pub fn from_start(start: &StartResponse, received_at: DateTime<Utc>) -> Self {
        let skew = received_at - start.start_instant;
        let trusted = Duration::zero()..=Duration::milliseconds(MAX_TRUSTED_SKEW_MS);
        let anchor = if !trusted.contains(&skew) {
            tracing::debug!(
                skew_ms = skew.num_milliseconds(),
                "clock skew too large; anchoring on local receipt time"
            );
            received_at
        } else {
            start.start_instant
        };
        Self::new(
            start.round_id,
            anchor,
            start.interval_seconds,
            start.window_seconds,
        )
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn window(&self) -> Window {
        Window::for_round(self.interval_seconds, self.window_seconds)
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        clock::elapsed(now, self.anchor)
    }

    /// `m:ss.ss` as shown to the player.
    pub fn display(&self, now: DateTime<Utc>) -> String {
        clock::format_clock(self.elapsed_at(now))
    }

    pub fn target_label(&self) -> String {
        self.window().label()
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerTick {
        let elapsed = self.elapsed_at(now);
        if self.expired || self.claimed {
            return TimerTick::Done { elapsed };
        }
        if elapsed >= self.interval_seconds {
            self.expired = true;
            return TimerTick::Expired { elapsed };
        }
        TimerTick::Running { elapsed }
    }

    /// Take the right to resolve this round. True only once.
    pub fn claim(&mut self) -> bool {
        if self.claimed {
            return false;
        }
        self.claimed = true;
        true
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }
}
