use std::sync::Arc;

use chronoception_core::server::{self, ServerState};
use chronoception_core::{Config, RoundController};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use super::{runtime, CommandResult};

pub fn run(bind: Option<String>) -> CommandResult {
    let config = Config::load()?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    runtime()?.block_on(async move {
        let listener = TcpListener::bind(bind.as_str()).await?;
        let controller = Arc::new(RoundController::new());

        let mut events = controller.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            let at = event.at();
                            tracing::debug!(target: "chronoception::events", %at, "{json}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let state = ServerState::new(controller, config.round.clone());
        server::serve(listener, state, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("could not listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
