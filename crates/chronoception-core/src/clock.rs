//! Round clock: pure timing arithmetic shared by server and client.
//!
//! Elapsed time is a real number of seconds measured from the round's start
//! instant. A click scores iff it lands inside the closed trailing window
//! `[interval - window, interval]`. There is no partial credit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Binary scoring result recorded in stats and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Fail,
}

/// Why a round was scored the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    TooEarly,
    TooLate,
    /// Nobody clicked before the deadline.
    TimedOut,
}

impl Verdict {
    pub fn outcome(self) -> Outcome {
        match self {
            Verdict::Success => Outcome::Success,
            Verdict::TooEarly | Verdict::TooLate | Verdict::TimedOut => Outcome::Fail,
        }
    }
}

/// The closed success window `[lower, upper]` in elapsed seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub lower: f64,
    pub upper: f64,
}

impl Window {
    pub fn for_round(interval_seconds: f64, window_seconds: f64) -> Self {
        Self {
            lower: interval_seconds - window_seconds,
            upper: interval_seconds,
        }
    }

    pub fn contains(&self, elapsed: f64) -> bool {
        self.lower <= elapsed && elapsed <= self.upper
    }

    pub fn as_pair(&self) -> [f64; 2] {
        [self.lower, self.upper]
    }

    /// "Click when timer reaches 0:55 - 1:00"
    pub fn label(&self) -> String {
        format!(
            "Click when timer reaches {} - {}",
            format_mark(self.lower),
            format_mark(self.upper)
        )
    }
}

/// Seconds elapsed between `start` and `now`.
///
/// Callers must not ask before the round started; a backwards wall clock
/// is clamped to zero.
pub fn elapsed(now: DateTime<Utc>, start: DateTime<Utc>) -> f64 {
    let delta = now - start;
    let secs = match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    };
    secs.max(0.0)
}

/// The sole scoring rule.
pub fn classify(elapsed: f64, interval_seconds: f64, window_seconds: f64) -> Verdict {
    let window = Window::for_round(interval_seconds, window_seconds);
    if window.contains(elapsed) {
        Verdict::Success
    } else if elapsed < window.lower {
        Verdict::TooEarly
    } else {
        Verdict::TooLate
    }
}

/// Convert fractional seconds into a chrono duration (microsecond precision).
/// `None` when the value is not finite or does not fit.
pub fn seconds(secs: f64) -> Option<Duration> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(Duration::microseconds(micros as i64))
}

/// `m:ss.ss`, the running-clock format.
pub fn format_clock(elapsed: f64) -> String {
    let elapsed = elapsed.max(0.0);
    let mins = (elapsed / 60.0).floor() as u64;
    let secs = elapsed % 60.0;
    format!("{mins}:{secs:05.2}")
}

/// `m:ss`, whole seconds, for window bounds.
pub fn format_mark(secs: f64) -> String {
    let secs = secs.max(0.0);
    let mins = (secs / 60.0).floor() as u64;
    let rem = (secs % 60.0).floor() as u64;
    format!("{mins}:{rem:02}")
}

/// Player-facing sentence for a resolved round.
pub fn describe(verdict: Verdict, elapsed: Option<f64>) -> String {
    let at = elapsed.map(format_clock).unwrap_or_default();
    match verdict {
        Verdict::Success => format!("Success! You clicked at {at}"),
        Verdict::TooEarly => format!("Too early! You clicked at {at}"),
        Verdict::TooLate => format!("Too late! You clicked at {at}"),
        Verdict::TimedOut => "Time's up! You didn't click in time.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bounds_are_closed() {
        assert_eq!(classify(55.0, 60.0, 5.0), Verdict::Success);
        assert_eq!(classify(60.0, 60.0, 5.0), Verdict::Success);
        assert_eq!(classify(57.0, 60.0, 5.0), Verdict::Success);
    }

    #[test]
    fn outside_window_is_early_or_late() {
        assert_eq!(classify(10.0, 60.0, 5.0), Verdict::TooEarly);
        assert_eq!(classify(54.999, 60.0, 5.0), Verdict::TooEarly);
        assert_eq!(classify(60.001, 60.0, 5.0), Verdict::TooLate);
    }

    #[test]
    fn verdict_maps_to_outcome() {
        assert_eq!(Verdict::Success.outcome(), Outcome::Success);
        assert_eq!(Verdict::TooEarly.outcome(), Outcome::Fail);
        assert_eq!(Verdict::TooLate.outcome(), Outcome::Fail);
        assert_eq!(Verdict::TimedOut.outcome(), Outcome::Fail);
    }

    #[test]
    fn elapsed_uses_sub_second_precision() {
        let start = Utc::now();
        let now = start + Duration::milliseconds(57_250);
        assert!((elapsed(now, start) - 57.25).abs() < 1e-9);
    }

    #[test]
    fn seconds_rejects_unrepresentable() {
        assert_eq!(seconds(1.5), Some(Duration::milliseconds(1_500)));
        assert_eq!(seconds(f64::INFINITY), None);
        assert_eq!(seconds(f64::NAN), None);
        assert_eq!(seconds(1.0e20), None);
    }

    #[test]
    fn elapsed_never_negative() {
        let start = Utc::now();
        let before = start - Duration::seconds(3);
        assert_eq!(elapsed(before, start), 0.0);
    }

    #[test]
    fn formats_running_clock() {
        assert_eq!(format_clock(0.0), "0:00.00");
        assert_eq!(format_clock(57.0), "0:57.00");
        assert_eq!(format_clock(65.5), "1:05.50");
    }

    #[test]
    fn window_label_uses_whole_seconds() {
        let window = Window::for_round(60.0, 5.0);
        assert_eq!(window.label(), "Click when timer reaches 0:55 - 1:00");
        assert_eq!(window.as_pair(), [55.0, 60.0]);
    }

    #[test]
    fn describes_each_verdict() {
        assert_eq!(
            describe(Verdict::Success, Some(57.0)),
            "Success! You clicked at 0:57.00"
        );
        assert!(describe(Verdict::TooEarly, Some(10.0)).starts_with("Too early!"));
        assert!(describe(Verdict::TooLate, Some(61.0)).starts_with("Too late!"));
        assert_eq!(
            describe(Verdict::TimedOut, None),
            "Time's up! You didn't click in time."
        );
    }

    proptest! {
        #[test]
        fn inside_closed_range_is_success(
            interval in 1.0f64..3600.0,
            frac in 0.001f64..0.999,
            pos in 0.0f64..=1.0,
        ) {
            let window = interval * frac;
            let lower = interval - window;
            let elapsed = (lower + (interval - lower) * pos).clamp(lower, interval);
            prop_assert_eq!(classify(elapsed, interval, window), Verdict::Success);
        }

        #[test]
        fn outside_range_fails_with_direction(
            interval in 1.0f64..3600.0,
            frac in 0.001f64..0.999,
            offset in 0.001f64..100.0,
        ) {
            let window = interval * frac;
            let lower = interval - window;
            prop_assert_eq!(classify(lower - offset, interval, window), Verdict::TooEarly);
            prop_assert_eq!(classify(interval + offset, interval, window), Verdict::TooLate);
        }
    }
}
