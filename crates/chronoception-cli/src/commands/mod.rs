pub mod config;
pub mod play;
pub mod round;
pub mod serve;
pub mod stats;
pub mod watch;

use chronoception_core::{Config, RoundClient};
use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

/// Client for `url`, or for `server.url` from the config.
pub fn client(
    config: &Config,
    url: Option<&str>,
) -> Result<RoundClient, Box<dyn std::error::Error>> {
    let base = url.unwrap_or(&config.server.url);
    Ok(RoundClient::new(base, config.watchdog.probe_timeout())?)
}

pub fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
