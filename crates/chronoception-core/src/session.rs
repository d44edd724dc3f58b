//! Interactive round loop for one client.
//!
//! Three producers compete to resolve each round: the player's click, the
//! presentation timer's local expiry, and the watchdog's timeout signal.
//! The first one claims the round through the presentation timer; the
//! server rejects anything that still slips through via the round id.

use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, Sleep};

use crate::api::{ClickRequest, ResolveResponse, StartRequest, StatsResponse, TimeoutRequest};
use crate::client::RoundClient;
use crate::config::Config;
use crate::error::TransportError;
use crate::presentation::{PresentationTimer, TimerTick};
use crate::watchdog::{HttpProbe, Watchdog, WatchdogConfig, WatchdogHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayInput {
    Click,
    Stop,
}

/// Who got to resolve the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Click,
    LocalTimer,
    Watchdog,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayEvent {
    RoundStarted {
        round_id: u64,
        target: String,
    },
    Tick {
        display: String,
    },
    Resolved {
        by: ResolvedBy,
        response: ResolveResponse,
    },
    /// Lost a race the server settled differently; no score change.
    Rejected {
        by: ResolvedBy,
        reason: String,
    },
    /// The request did not get through; it is sent again for the same round.
    Retrying {
        by: ResolvedBy,
        reason: String,
    },
}

/// Pause between attempts at a resolution that failed in transit.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// A claimed resolution, replayable until the server answers it.
#[derive(Debug, Clone, Copy)]
struct Claim {
    by: ResolvedBy,
    round_id: u64,
    elapsed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub interval_minutes: f64,
    pub window_seconds: f64,
    pub tick: Duration,
    pub result_delay: Duration,
    pub watchdog: WatchdogConfig,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval_minutes: config.round.interval_minutes,
            window_seconds: config.round.window_seconds,
            tick: config.presentation.tick(),
            result_delay: config.presentation.result_delay(),
            watchdog: (&config.watchdog).into(),
        }
    }
}

pub struct PlaySession {
    client: RoundClient,
    config: SessionConfig,
}

impl PlaySession {
    pub fn new(client: RoundClient, config: SessionConfig) -> Self {
        Self { client, config }
    }

    /// Play rounds until `Stop` arrives or the input channel closes.
    /// Resets the round cycle on exit and returns the final stats.
    ///
    /// # Errors
    ///
    /// Fails if the first round cannot be started or the final stats cannot
    /// be fetched. Errors in between are reported and play continues.
    pub async fn run(
        self,
        mut inputs: mpsc::Receiver<PlayInput>,
        events: mpsc::Sender<PlayEvent>,
    ) -> Result<StatsResponse, TransportError> {
        let (watchdog, mut signals) = Watchdog::spawn(
            HttpProbe::new(self.client.clone()),
            self.config.watchdog,
        );

        let mut timer = match self.start_round(&watchdog, &events).await {
            Ok(timer) => timer,
            Err(e) => {
                watchdog.shutdown().await;
                return Err(e);
            }
        };

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_round: Option<Pin<Box<Sleep>>> = None;
        // Claimed but not yet answered; blocks the next start.
        let mut pending: Option<Claim> = None;

        loop {
            let claim = tokio::select! {
                input = inputs.recv() => match input {
                    Some(PlayInput::Click) if next_round.is_none() && timer.claim() => {
                        watchdog.disarm();
                        Some(Claim {
                            by: ResolvedBy::Click,
                            round_id: timer.round_id(),
                            elapsed: Some(timer.elapsed_at(Utc::now())),
                        })
                    }
                    Some(PlayInput::Click) => None,
                    Some(PlayInput::Stop) | None => break,
                },
                _ = ticker.tick(), if next_round.is_none() => {
                    match timer.tick(Utc::now()) {
                        TimerTick::Running { elapsed } => {
                            // Display updates are best effort.
                            let _ = events.try_send(PlayEvent::Tick {
                                display: crate::clock::format_clock(elapsed),
                            });
                            None
                        }
                        TimerTick::Expired { .. } if timer.claim() => {
                            watchdog.disarm();
                            Some(Claim {
                                by: ResolvedBy::LocalTimer,
                                round_id: timer.round_id(),
                                elapsed: None,
                            })
                        }
                        TimerTick::Expired { .. } | TimerTick::Done { .. } => None,
                    }
                },
                Some(signal) = signals.recv() => {
                    if signal.round_id == timer.round_id() && timer.claim() {
                        Some(Claim {
                            by: ResolvedBy::Watchdog,
                            round_id: signal.round_id,
                            elapsed: None,
                        })
                    } else {
                        tracing::debug!(
                            round_id = signal.round_id,
                            "watchdog signal already handled"
                        );
                        None
                    }
                },
                _ = wait(&mut next_round) => {
                    next_round = None;
                    match pending.take() {
                        Some(claim) => Some(claim),
                        None => {
                            match self.start_round(&watchdog, &events).await {
                                Ok(next) => timer = next,
                                Err(e) => {
                                    tracing::warn!("could not start next round, retrying: {e}");
                                    let delay = self.config.result_delay;
                                    next_round = Some(Box::pin(tokio::time::sleep(delay)));
                                }
                            }
                            None
                        }
                    }
                },
            };

            if let Some(claim) = claim {
                let delay = if self.submit(claim, &events).await {
                    self.config.result_delay
                } else {
                    pending = Some(claim);
                    RETRY_DELAY
                };
                next_round = Some(Box::pin(tokio::time::sleep(delay)));
            }
        }

        // One last attempt so a claimed round is not silently dropped.
        if let Some(claim) = pending {
            self.submit(claim, &events).await;
        }
        watchdog.shutdown().await;
        if let Err(e) = self.client.reset().await {
            tracing::warn!("reset on exit failed: {e}");
        }
        self.client.stats().await
    }

    async fn start_round(
        &self,
        watchdog: &WatchdogHandle,
        events: &mpsc::Sender<PlayEvent>,
    ) -> Result<PresentationTimer, TransportError> {
        let req = StartRequest {
            interval_minutes: Some(self.config.interval_minutes),
            window_seconds: Some(self.config.window_seconds),
        };
        let started = self.client.start(&req).await?;
        let timer = PresentationTimer::from_start(&started, Utc::now());
        watchdog.arm(started.round_id, started.deadline_instant);
        let _ = events
            .send(PlayEvent::RoundStarted {
                round_id: started.round_id,
                target: timer.target_label(),
            })
            .await;
        Ok(timer)
    }

    /// Send a claimed resolution. False when it should be sent again.
    async fn submit(&self, claim: Claim, events: &mpsc::Sender<PlayEvent>) -> bool {
        let result = match claim.elapsed {
            Some(elapsed) => {
                let req = ClickRequest {
                    client_elapsed_seconds: Some(elapsed),
                    round_id: Some(claim.round_id),
                };
                self.client.click(&req).await
            }
            None => {
                let req = TimeoutRequest {
                    round_id: Some(claim.round_id),
                };
                self.client.timeout(&req).await
            }
        };

        let by = claim.by;
        let (event, settled) = match result {
            Ok(response) => (PlayEvent::Resolved { by, response }, true),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    ?by,
                    round_id = claim.round_id,
                    "resolution failed, will retry: {e}"
                );
                (
                    PlayEvent::Retrying {
                        by,
                        reason: e.to_string(),
                    },
                    false,
                )
            }
            Err(e) => {
                match e.round_error_kind() {
                    Some("round_not_active") | Some("stale_round") => {
                        tracing::debug!(?by, "resolution lost the race: {e}");
                    }
                    _ => tracing::warn!(?by, "resolution rejected: {e}"),
                }
                (
                    PlayEvent::Rejected {
                        by,
                        reason: e.to_string(),
                    },
                    true,
                )
            }
        };
        let _ = events.send(event).await;
        settled
    }
}

async fn wait(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(s) => s.as_mut().await,
        None => std::future::pending().await,
    }
}
