use chronoception_core::watchdog::HttpProbe;
use chronoception_core::{Config, Watchdog, WatchdogConfig};

use super::{client, runtime, CommandResult};

/// Re-arms on every new round the server reports and prints one JSON line
/// per missed deadline. Only observes: the timeout is left for a player to
/// resolve.
pub fn run(url: Option<&str>) -> CommandResult {
    let config = Config::load()?;
    let client = client(&config, url)?;
    let watchdog_config = WatchdogConfig::from(&config.watchdog);

    runtime()?.block_on(async move {
        let (watchdog, mut signals) =
            Watchdog::spawn(HttpProbe::new(client.clone()), watchdog_config);
        let mut poll = tokio::time::interval(watchdog_config.poll_period);
        let mut armed_round = None;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match client.check_timeout().await {
                        Ok(report) => {
                            if report.active && armed_round != Some(report.round_id) {
                                if let Some(deadline) = report.deadline_instant {
                                    watchdog.arm(report.round_id, deadline);
                                    armed_round = Some(report.round_id);
                                }
                            }
                        }
                        Err(e) => tracing::warn!("server unreachable: {e}"),
                    }
                }
                Some(signal) = signals.recv() => {
                    println!("{}", serde_json::to_string(&signal)?);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        watchdog.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
