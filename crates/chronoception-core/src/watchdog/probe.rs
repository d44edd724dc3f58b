use std::future::Future;
use std::sync::Arc;

use crate::client::RoundClient;
use crate::error::TransportError;
use crate::round::{RoundController, TimeoutReport};

/// One bounded "has the deadline passed?" question.
///
/// Implementations must not mutate round state.
pub trait TimeoutProbe: Send + Sync + 'static {
    fn probe(&self) -> impl Future<Output = Result<TimeoutReport, TransportError>> + Send;
}

/// Probes an in-process controller.
#[derive(Clone)]
pub struct ControllerProbe {
    controller: Arc<RoundController>,
}

impl ControllerProbe {
    pub fn new(controller: Arc<RoundController>) -> Self {
        Self { controller }
    }
}

impl TimeoutProbe for ControllerProbe {
    async fn probe(&self) -> Result<TimeoutReport, TransportError> {
        Ok(self.controller.peek_timeout())
    }
}

/// Probes a remote server via `GET /api/check_timeout`.
#[derive(Clone)]
pub struct HttpProbe {
    client: RoundClient,
}

impl HttpProbe {
    pub fn new(client: RoundClient) -> Self {
        Self { client }
    }
}

impl TimeoutProbe for HttpProbe {
    async fn probe(&self) -> Result<TimeoutReport, TransportError> {
        self.client.check_timeout().await
    }
}
