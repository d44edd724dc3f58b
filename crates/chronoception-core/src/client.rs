//! Async HTTP client for a remote round server.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::api::{
    AckResponse, ClickRequest, ErrorBody, ResolveResponse, StartRequest, StartResponse,
    StatsResponse, TimeoutRequest,
};
use crate::error::TransportError;
use crate::round::TimeoutReport;

#[derive(Debug, Clone)]
pub struct RoundClient {
    http: Client,
    base: Url,
    timeout: Duration,
}

impl RoundClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:5000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn start(&self, req: &StartRequest) -> Result<StartResponse, TransportError> {
        self.post("api/start", req).await
    }

    pub async fn click(&self, req: &ClickRequest) -> Result<ResolveResponse, TransportError> {
        self.post("api/click", req).await
    }

    pub async fn timeout(&self, req: &TimeoutRequest) -> Result<ResolveResponse, TransportError> {
        self.post("api/timeout", req).await
    }

    pub async fn reset(&self) -> Result<AckResponse, TransportError> {
        self.post("api/reset", &serde_json::json!({})).await
    }

    pub async fn reset_stats(&self) -> Result<AckResponse, TransportError> {
        self.post("api/reset_stats", &serde_json::json!({})).await
    }

    pub async fn check_timeout(&self) -> Result<TimeoutReport, TransportError> {
        self.get("api/check_timeout").await
    }

    pub async fn stats(&self) -> Result<StatsResponse, TransportError> {
        self.get("api/stats").await
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = self.base.join(route)?;
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.decode(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, TransportError> {
        let url = self.base.join(route)?;
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache, no-store")
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: Response) -> Result<T, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| self.classify(e));
        }
        let text = resp.text().await.unwrap_or_default();
        let (message, kind) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.kind),
            Err(_) => (text, None),
        };
        Err(TransportError::Rejected {
            status: status.as_u16(),
            kind,
            message,
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            TransportError::Request(err)
        }
    }
}
