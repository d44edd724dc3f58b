//! JSON bodies of the HTTP surface, shared by the server and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{self, Outcome, Verdict};
use crate::round::{HistoryEntry, Resolution, RoundStart, Stats, StatsSnapshot};

/// `POST /api/start`. Missing fields fall back to configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default, alias = "interval", skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<f64>,
    #[serde(default, alias = "time_before", skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub round_id: u64,
    pub interval_seconds: f64,
    pub interval_minutes: f64,
    pub window_seconds: f64,
    pub start_instant: DateTime<Utc>,
    pub deadline_instant: DateTime<Utc>,
    /// `[lower, upper]` in elapsed seconds.
    pub target_window: [f64; 2],
}

impl From<RoundStart> for StartResponse {
    fn from(s: RoundStart) -> Self {
        let window = clock::Window::for_round(s.interval_seconds, s.window_seconds);
        Self {
            success: true,
            round_id: s.round_id,
            interval_seconds: s.interval_seconds,
            interval_minutes: s.interval_minutes,
            window_seconds: s.window_seconds,
            start_instant: s.start_instant,
            deadline_instant: s.deadline_instant,
            target_window: window.as_pair(),
        }
    }
}

/// `POST /api/click`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,
}

/// `POST /api/timeout`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,
}

/// Answer to an accepted click or timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub outcome: Outcome,
    pub verdict: Verdict,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_window: Option<[f64; 2]>,
    pub round_id: u64,
    pub next_round_id: u64,
    pub stats: Stats,
    pub history: Vec<HistoryEntry>,
    /// The round cycle keeps going; the caller should start the next round.
    #[serde(rename = "continue")]
    pub continues: bool,
}

impl From<Resolution> for ResolveResponse {
    fn from(r: Resolution) -> Self {
        let is_click = r.verdict != Verdict::TimedOut;
        Self {
            outcome: r.outcome,
            verdict: r.verdict,
            message: clock::describe(r.verdict, r.elapsed_seconds),
            elapsed_seconds: r.elapsed_seconds,
            target_window: is_click.then(|| r.window.as_pair()),
            round_id: r.round_id,
            next_round_id: r.next_round_id,
            stats: r.stats,
            history: r.history,
            continues: true,
        }
    }
}

/// `GET /api/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: Stats,
    pub history: Vec<HistoryEntry>,
    pub accuracy_pct: f64,
}

impl From<StatsSnapshot> for StatsResponse {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            accuracy_pct: s.stats.accuracy_pct(),
            stats: s.stats,
            history: s.history,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Body of every rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub kind: Option<String>,
}
