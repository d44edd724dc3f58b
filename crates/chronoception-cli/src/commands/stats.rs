use chronoception_core::Config;
use clap::Subcommand;

use super::{client, print_json, runtime, CommandResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Totals, accuracy and recent history
    Show,
    /// Zero the counters and clear history
    Reset,
}

pub fn run(action: StatsAction, url: Option<&str>) -> CommandResult {
    let config = Config::load()?;
    let client = client(&config, url)?;

    runtime()?.block_on(async move {
        match action {
            StatsAction::Show => print_json(&client.stats().await?),
            StatsAction::Reset => print_json(&client.reset_stats().await?),
        }
    })
}
