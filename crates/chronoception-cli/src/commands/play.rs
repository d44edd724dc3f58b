use std::io::Write;

use chronoception_core::{Config, PlayEvent, PlayInput, PlaySession, SessionConfig};
use tokio::sync::mpsc;

use super::{client, runtime, CommandResult};

pub fn run(interval: Option<f64>, window: Option<f64>, url: Option<&str>) -> CommandResult {
    let config = Config::load()?;
    let client = client(&config, url)?;
    let mut session_config = SessionConfig::from_config(&config);
    if let Some(interval) = interval {
        session_config.interval_minutes = interval;
    }
    if let Some(window) = window {
        session_config.window_seconds = window;
    }

    runtime()?.block_on(async move {
        let (input_tx, input_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(256);

        // Blocking stdin reads stay off the runtime.
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                let input = match line.trim() {
                    "q" | "quit" => PlayInput::Stop,
                    _ => PlayInput::Click,
                };
                if input_tx.blocking_send(input).is_err() || input == PlayInput::Stop {
                    break;
                }
            }
        });

        let printer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                render(&event);
            }
        });

        println!("Press Enter to click, q + Enter to quit.");
        let stats = PlaySession::new(client, session_config)
            .run(input_rx, event_tx)
            .await?;
        let _ = printer.await;

        println!();
        println!(
            "Rounds: {}  Success: {}  Fail: {}  Accuracy: {:.1}%",
            stats.stats.total, stats.stats.success, stats.stats.fail, stats.accuracy_pct
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn render(event: &PlayEvent) {
    let mut out = std::io::stdout().lock();
    // Terminal output is best effort.
    let _ = match event {
        PlayEvent::RoundStarted { target, .. } => writeln!(out, "\n{target}"),
        PlayEvent::Tick { display } => write!(out, "\r{display}  ").and_then(|_| out.flush()),
        PlayEvent::Resolved { response, .. } => writeln!(
            out,
            "\n{}  [{}/{}]",
            response.message,
            response.stats.success,
            response.stats.total
        ),
        PlayEvent::Rejected { reason, .. } => writeln!(out, "\n(ignored: {reason})"),
        PlayEvent::Retrying { reason, .. } => writeln!(out, "\n(retrying: {reason})"),
    };
}
