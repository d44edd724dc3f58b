mod controller;
mod history;
mod state;

pub use controller::{RoundController, RoundSnapshot, StatsSnapshot};
pub use history::{History, HistoryEntry, HISTORY_CAPACITY};
pub use state::{Resolution, RoundParams, RoundStart, RoundState, Stats, TimeoutReport};
