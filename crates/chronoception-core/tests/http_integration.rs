//! End-to-end tests over a real loopback server.
//!
//! These run on real time: reqwest timeouts misbehave under paused tokio
//! time, so rounds here are a fraction of a second long.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;

use chronoception_core::api::{ClickRequest, StartRequest, TimeoutRequest};
use chronoception_core::config::RoundConfig;
use chronoception_core::watchdog::HttpProbe;
use chronoception_core::{
    server, Outcome, PlayEvent, PlayInput, PlaySession, ResolvedBy, RoundClient, RoundController,
    ServerState, SessionConfig, TransportError, Verdict, Watchdog, WatchdogConfig,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct TestServer {
    url: String,
    controller: Arc<RoundController>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let controller = Arc::new(RoundController::new());
        let state = ServerState::new(controller.clone(), RoundConfig::default());
        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, state, async move {
            let _ = rx.await;
        }));
        Self {
            url: format!("http://{addr}"),
            controller,
            shutdown,
            task,
        }
    }

    /// Same server, but the first `/api/timeout` answers 503 without
    /// reaching the controller.
    async fn spawn_failing_first_timeout() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let controller = Arc::new(RoundController::new());
        let state = ServerState::new(controller.clone(), RoundConfig::default());
        let failed = Arc::new(AtomicBool::new(false));
        let app = server::router(state).layer(middleware::from_fn(
            move |req: Request, next: Next| {
                let failed = failed.clone();
                async move {
                    if req.uri().path() == "/api/timeout" && !failed.swap(true, Ordering::SeqCst) {
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                    next.run(req).await
                }
            },
        ));
        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });
        Self {
            url: format!("http://{addr}"),
            controller,
            shutdown,
            task,
        }
    }

    fn client(&self) -> RoundClient {
        RoundClient::new(&self.url, Duration::from_secs(2)).unwrap()
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap().unwrap();
    }
}

fn short_round() -> StartRequest {
    // 0.3 s interval, 0.1 s window.
    StartRequest {
        interval_minutes: Some(0.005),
        window_seconds: Some(0.1),
    }
}

#[tokio::test]
async fn test_round_trip_over_http() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let started = client
        .start(&StartRequest {
            interval_minutes: Some(1.0),
            window_seconds: Some(5.0),
        })
        .await
        .unwrap();
    assert!(started.success);
    assert_eq!(started.interval_seconds, 60.0);
    assert_eq!(started.target_window, [55.0, 60.0]);

    let res = client
        .click(&ClickRequest {
            client_elapsed_seconds: Some(57.0),
            round_id: Some(started.round_id),
        })
        .await
        .unwrap();
    assert_eq!(res.outcome, Outcome::Success);
    assert_eq!(res.verdict, Verdict::Success);
    assert!(res.continues);
    assert_eq!(res.stats.total, 1);

    let report = client.check_timeout().await.unwrap();
    assert!(report.active);
    assert!(!report.timed_out);

    client.reset_stats().await.unwrap();
    let stats = client.stats().await.unwrap();
    assert_eq!(stats.stats.total, 0);
    assert!(stats.history.is_empty());

    client.reset().await.unwrap();
    assert!(!server.controller.snapshot().active);
    server.stop().await;
}

#[tokio::test]
async fn test_rejections_carry_kind_and_status() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let err = client.click(&ClickRequest::default()).await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected { status: 400, .. }));
    assert_eq!(err.round_error_kind(), Some("round_not_active"));

    let err = client
        .start(&StartRequest {
            interval_minutes: Some(1.0),
            window_seconds: Some(60.0),
        })
        .await
        .unwrap_err();
    assert_eq!(err.round_error_kind(), Some("invalid_parameters"));

    // Deadline beyond the representable range: rejected, server keeps going.
    let err = client
        .start(&StartRequest {
            interval_minutes: Some(1.0e12),
            window_seconds: Some(5.0),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected { status: 400, .. }));
    assert_eq!(err.round_error_kind(), Some("invalid_parameters"));

    let started = client.start(&short_round()).await.unwrap();
    let err = client
        .timeout(&TimeoutRequest {
            round_id: Some(started.round_id + 100),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected { status: 409, .. }));
    assert_eq!(err.round_error_kind(), Some("stale_round"));
    assert_eq!(server.controller.stats().stats.total, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_raw_bodies() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    // No body at all: configured defaults.
    let resp = http
        .post(format!("{}/api/start", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["interval_seconds"], 60.0);

    // Legacy field names.
    let resp = http
        .post(format!("{}/api/start", server.url))
        .body(r#"{"interval": 2, "time_before": 10}"#)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["target_window"], serde_json::json!([110.0, 120.0]));

    let resp = http
        .post(format!("{}/api/click", server.url))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "bad_request");

    server.stop().await;
}

#[tokio::test]
async fn test_http_watchdog_signals_missed_deadline() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let config = WatchdogConfig {
        poll_period: Duration::from_millis(50),
        cooldown: Duration::ZERO,
        probe_timeout: Duration::from_millis(500),
    };
    let (watchdog, mut signals) = Watchdog::spawn(HttpProbe::new(client.clone()), config);

    let started = client.start(&short_round()).await.unwrap();
    watchdog.arm(started.round_id, started.deadline_instant);

    let signal = tokio::time::timeout(Duration::from_secs(5), signals.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.round_id, started.round_id);

    let res = client
        .timeout(&TimeoutRequest {
            round_id: Some(signal.round_id),
        })
        .await
        .unwrap();
    assert_eq!(res.verdict, Verdict::TimedOut);
    assert!(res.elapsed_seconds.is_none());

    // Round already resolved: the same signal cannot score twice.
    let err = client
        .timeout(&TimeoutRequest {
            round_id: Some(signal.round_id),
        })
        .await
        .unwrap_err();
    assert_eq!(err.round_error_kind(), Some("stale_round"));
    assert_eq!(server.controller.stats().stats.fail, 1);

    watchdog.shutdown().await;
    server.stop().await;
}

async fn next_resolution(events: &mut mpsc::Receiver<PlayEvent>) -> (ResolvedBy, Verdict) {
    loop {
        match events.recv().await {
            Some(PlayEvent::Resolved { by, response }) => return (by, response.verdict),
            Some(_) => continue,
            None => panic!("session ended early"),
        }
    }
}

async fn next_start(events: &mut mpsc::Receiver<PlayEvent>) -> u64 {
    loop {
        match events.recv().await {
            Some(PlayEvent::RoundStarted { round_id, .. }) => return round_id,
            Some(_) => continue,
            None => panic!("session ended early"),
        }
    }
}

fn fast_session() -> SessionConfig {
    SessionConfig {
        interval_minutes: 0.01,
        window_seconds: 0.2,
        tick: Duration::from_millis(10),
        result_delay: Duration::from_millis(100),
        watchdog: WatchdogConfig {
            poll_period: Duration::from_millis(50),
            cooldown: Duration::ZERO,
            probe_timeout: Duration::from_millis(500),
        },
    }
}

#[tokio::test]
async fn test_play_session_click_then_timeout() {
    let server = TestServer::spawn().await;
    let session = PlaySession::new(server.client(), fast_session());
    let (input_tx, input_rx) = mpsc::channel(8);
    let (event_tx, mut events) = mpsc::channel(4096);
    let task = tokio::spawn(session.run(input_rx, event_tx));

    let scenario = async {
        // Click straight away: far before the window.
        next_start(&mut events).await;
        input_tx.send(PlayInput::Click).await.unwrap();
        let (by, verdict) = next_resolution(&mut events).await;
        assert_eq!(by, ResolvedBy::Click);
        assert_eq!(verdict, Verdict::TooEarly);

        // Leave the next round alone until it expires.
        next_start(&mut events).await;
        let (by, verdict) = next_resolution(&mut events).await;
        assert_ne!(by, ResolvedBy::Click);
        assert_eq!(verdict, Verdict::TimedOut);

        input_tx.send(PlayInput::Stop).await.unwrap();
    };
    tokio::time::timeout(Duration::from_secs(10), scenario)
        .await
        .unwrap();

    let stats = task.await.unwrap().unwrap();
    assert!(stats.stats.total >= 2);
    assert_eq!(stats.stats.success, 0);
    assert_eq!(stats.stats.total, stats.stats.fail);
    assert!(!server.controller.snapshot().active);

    server.stop().await;
}

#[tokio::test]
async fn test_play_session_resends_timeout_after_server_failure() {
    let server = TestServer::spawn_failing_first_timeout().await;
    let session = PlaySession::new(server.client(), fast_session());
    let (input_tx, input_rx) = mpsc::channel(8);
    let (event_tx, mut events) = mpsc::channel(4096);
    let task = tokio::spawn(session.run(input_rx, event_tx));

    let scenario = async {
        let first = next_start(&mut events).await;
        let mut retried = false;
        loop {
            match events.recv().await {
                Some(PlayEvent::Retrying { .. }) => retried = true,
                Some(PlayEvent::RoundStarted { round_id, .. }) => {
                    panic!("round {round_id} started before round {first} was scored")
                }
                Some(PlayEvent::Resolved { response, .. }) => {
                    assert!(retried);
                    assert_eq!(response.round_id, first);
                    assert_eq!(response.verdict, Verdict::TimedOut);
                    break;
                }
                Some(_) => continue,
                None => panic!("session ended early"),
            }
        }
        input_tx.send(PlayInput::Stop).await.unwrap();
    };
    tokio::time::timeout(Duration::from_secs(10), scenario)
        .await
        .unwrap();

    let stats = task.await.unwrap().unwrap();
    assert!(stats.stats.total >= 1);
    assert_eq!(stats.history[0].round_id, 1);
    assert_eq!(stats.stats.total, stats.stats.fail);

    server.stop().await;
}
