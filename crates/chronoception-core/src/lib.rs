//! # Chronoception Core Library
//!
//! Core logic of a reaction-timing game: a round counts up to a fixed
//! interval and the player must click inside a trailing window just before
//! it elapses. The server holds the authoritative round; clients run a
//! cosmetic presentation timer and a background watchdog that keeps
//! timeouts detected while the interactive side is not rendering.
//!
//! ## Architecture
//!
//! - **Round Clock**: pure elapsed-time and scoring arithmetic
//! - **Round Controller**: the single mutex-guarded round record and its
//!   transitions (start, resolve click/timeout, reset, reset stats, peek)
//! - **Timeout Watchdog**: independent poll loop that signals a missed
//!   deadline exactly once per round
//! - **Presentation Timer**: client-local display clock and resolve gate
//! - **Server / Client**: HTTP + JSON surface over the controller
//!
//! ## Key Components
//!
//! - [`RoundController`]: authoritative round state machine
//! - [`Watchdog`]: background timeout detection
//! - [`PresentationTimer`]: client-side clock
//! - [`Config`]: application configuration management

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod presentation;
pub mod round;
pub mod server;
pub mod session;
pub mod watchdog;

pub use client::RoundClient;
pub use clock::{Outcome, Verdict, Window};
pub use config::Config;
pub use error::{ConfigError, CoreError, RoundError, TransportError};
pub use events::Event;
pub use presentation::{PresentationTimer, TimerTick};
pub use round::{
    HistoryEntry, Resolution, RoundController, RoundStart, Stats, StatsSnapshot, TimeoutReport,
    HISTORY_CAPACITY,
};
pub use server::ServerState;
pub use session::{PlayEvent, PlayInput, PlaySession, ResolvedBy, SessionConfig};
pub use watchdog::{TimeoutSignal, Watchdog, WatchdogConfig, WatchdogHandle};
