//! Background timeout watchdog.
//!
//! Polls a [`TimeoutProbe`] on a fixed period while armed, plus one probe at
//! the exact deadline, and emits at most one [`TimeoutSignal`] per round.
//! The watchdog never resolves anything itself: the interactive side that
//! receives the signal calls `resolve_timeout` and then `start`.
//!
//! ```text
//! Arm(round, deadline) --> poll every period / at deadline
//!     timed out, same round   --> Signal, disarm
//!     inactive / other round  --> disarm
//!     probe error             --> log, keep polling
//! Disarm                  --> stop polling
//! Shutdown                --> task exits
//! ```

mod probe;
mod tracker;

pub use probe::{ControllerProbe, HttpProbe, TimeoutProbe};
pub use tracker::{ProbeDecision, StopReason, TimeoutSignal, Tracker};

use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use crate::config::WatchdogSection;

const SIGNAL_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub poll_period: Duration,
    pub cooldown: Duration,
    pub probe_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        (&WatchdogSection::default()).into()
    }
}

impl From<&WatchdogSection> for WatchdogConfig {
    fn from(section: &WatchdogSection) -> Self {
        Self {
            poll_period: section.poll_period(),
            cooldown: section.cooldown(),
            probe_timeout: section.probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    Arm {
        round_id: u64,
        deadline: DateTime<Utc>,
    },
    /// The interactive side resolved the round first.
    Disarm,
    Shutdown,
}

/// Control side of a running watchdog task.
pub struct WatchdogHandle {
    commands: mpsc::UnboundedSender<WatchdogCommand>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn arm(&self, round_id: u64, deadline: DateTime<Utc>) {
        self.send(WatchdogCommand::Arm { round_id, deadline });
    }

    pub fn disarm(&self) {
        self.send(WatchdogCommand::Disarm);
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.send(WatchdogCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("watchdog task ended abnormally: {e}");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn send(&self, cmd: WatchdogCommand) {
        if self.commands.send(cmd).is_err() {
            tracing::warn!(?cmd, "watchdog task is gone; command dropped");
        }
    }
}

pub struct Watchdog;

impl Watchdog {
    /// Spawn the poll loop on the current tokio runtime.
    pub fn spawn<P: TimeoutProbe>(
        probe: P,
        config: WatchdogConfig,
    ) -> (WatchdogHandle, mpsc::Receiver<TimeoutSignal>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (sig_tx, sig_rx) = mpsc::channel(SIGNAL_BUFFER);
        let task = tokio::spawn(run(probe, config, cmd_rx, sig_tx));
        (
            WatchdogHandle {
                commands: cmd_tx,
                task,
            },
            sig_rx,
        )
    }
}

/// Timers alive while armed.
struct Schedule {
    ticker: Interval,
    at_deadline: Option<Pin<Box<Sleep>>>,
}

impl Schedule {
    fn new(poll_period: Duration, deadline: DateTime<Utc>) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + poll_period, poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Past deadlines get probed right away.
        let until = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Self {
            ticker,
            at_deadline: Some(Box::pin(tokio::time::sleep(until))),
        }
    }
}

async fn next_probe(schedule: &mut Option<Schedule>) {
    match schedule {
        Some(s) => match s.at_deadline.as_mut() {
            Some(sleep) => {
                tokio::select! {
                    _ = sleep.as_mut() => { s.at_deadline = None; }
                    _ = s.ticker.tick() => {}
                }
            }
            None => {
                s.ticker.tick().await;
            }
        },
        None => std::future::pending().await,
    }
}

async fn run<P: TimeoutProbe>(
    probe: P,
    config: WatchdogConfig,
    mut commands: mpsc::UnboundedReceiver<WatchdogCommand>,
    signals: mpsc::Sender<TimeoutSignal>,
) {
    let mut tracker = Tracker::new(config.cooldown);
    let mut schedule: Option<Schedule> = None;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                None | Some(WatchdogCommand::Shutdown) => break,
                Some(WatchdogCommand::Arm { round_id, deadline }) => {
                    if let Some(previous) = tracker.armed_round().filter(|&id| id != round_id) {
                        tracing::debug!(previous, round_id, "replacing armed round");
                    }
                    if tracker.arm(round_id, deadline) {
                        tracing::debug!(round_id, %deadline, "watchdog armed");
                        schedule = Some(Schedule::new(config.poll_period, deadline));
                    } else {
                        tracing::debug!(round_id, "round already signaled; not re-arming");
                    }
                }
                Some(WatchdogCommand::Disarm) => {
                    tracker.disarm();
                    schedule = None;
                }
            },
            _ = next_probe(&mut schedule) => {
                if !check(&probe, &config, &mut tracker, &signals).await {
                    break;
                }
                if !tracker.is_armed() {
                    schedule = None;
                }
            }
        }
    }
    tracing::debug!("watchdog stopped");
}

/// One probe. Returns false once nobody listens for signals anymore.
async fn check<P: TimeoutProbe>(
    probe: &P,
    config: &WatchdogConfig,
    tracker: &mut Tracker,
    signals: &mpsc::Sender<TimeoutSignal>,
) -> bool {
    let report = match tokio::time::timeout(config.probe_timeout, probe.probe()).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            tracing::warn!("timeout probe failed, retrying next tick: {e}");
            return true;
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.probe_timeout.as_millis() as u64,
                "timeout probe timed out, retrying next tick"
            );
            return true;
        }
    };
    tracing::debug!(
        round_id = report.round_id,
        timed_out = report.timed_out,
        active = report.active,
        "timeout probe"
    );

    match tracker.on_report(&report, Instant::now()) {
        ProbeDecision::KeepPolling => true,
        ProbeDecision::Stop(reason) => {
            tracing::debug!(?reason, "watchdog disarmed");
            true
        }
        ProbeDecision::Signal(signal) => {
            tracing::info!(round_id = signal.round_id, "timeout observed");
            signals.send(signal).await.is_ok()
        }
    }
}
