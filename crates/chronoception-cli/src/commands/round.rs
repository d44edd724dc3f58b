use chronoception_core::api::{ClickRequest, StartRequest, TimeoutRequest};
use chronoception_core::Config;
use clap::Subcommand;

use super::{client, print_json, runtime, CommandResult};

#[derive(Subcommand)]
pub enum RoundAction {
    /// Start (or restart) a round
    Start {
        /// Round length in minutes
        #[arg(long)]
        interval: Option<f64>,
        /// Success window in seconds before the end of the round
        #[arg(long)]
        window: Option<f64>,
    },
    /// Resolve the round with a click
    Click {
        /// Elapsed seconds as measured by the caller
        #[arg(long)]
        elapsed: Option<f64>,
        /// Only resolve if this is still the current round
        #[arg(long)]
        round_id: Option<u64>,
    },
    /// Resolve the round as timed out
    Timeout {
        /// Only resolve if this is still the current round
        #[arg(long)]
        round_id: Option<u64>,
    },
    /// Stop the round cycle (stats are kept)
    Reset,
    /// Ask whether the deadline has passed, without resolving
    Peek,
}

pub fn run(action: RoundAction, url: Option<&str>) -> CommandResult {
    let config = Config::load()?;
    let client = client(&config, url)?;

    runtime()?.block_on(async move {
        match action {
            RoundAction::Start { interval, window } => {
                let req = StartRequest {
                    interval_minutes: interval,
                    window_seconds: window,
                };
                print_json(&client.start(&req).await?)
            }
            RoundAction::Click { elapsed, round_id } => {
                let req = ClickRequest {
                    client_elapsed_seconds: elapsed,
                    round_id,
                };
                print_json(&client.click(&req).await?)
            }
            RoundAction::Timeout { round_id } => {
                print_json(&client.timeout(&TimeoutRequest { round_id }).await?)
            }
            RoundAction::Reset => print_json(&client.reset().await?),
            RoundAction::Peek => print_json(&client.check_timeout().await?),
        }
    })
}
