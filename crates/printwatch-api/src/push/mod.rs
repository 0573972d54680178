//! Push transport client.
//!
//! Thin wrapper around the mobile-push provider API: one endpoint per
//! device token, provider-token auth, and two push flavors -- standard
//! alerts and live-activity channel updates. No retry logic lives here;
//! callers decide what a failed delivery means.

mod jwt;
mod payload;

use std::path::PathBuf;

use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

pub use jwt::ProviderTokenSigner;
pub use payload::{LiveActivityEvent, Notification};

/// Production push endpoint.
pub const PRODUCTION_ENDPOINT: &str = "https://api.push.apple.com";
/// Sandbox endpoint for development builds.
pub const SANDBOX_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

// ── Configuration ────────────────────────────────────────────────────

/// Configuration for the push client.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Provider API endpoint (production or sandbox).
    pub endpoint: Url,
    /// App bundle topic, e.g. `com.example.printwatch`.
    pub topic: String,
    /// Path to the PKCS#8 EC signing key.
    pub key_path: PathBuf,
    /// Key identifier issued with the signing key.
    pub key_id: String,
    /// Developer team identifier.
    pub team_id: String,
    pub transport: TransportConfig,
}

// ── Client ───────────────────────────────────────────────────────────

enum TokenSource {
    Signer(ProviderTokenSigner),
    /// Pre-minted bearer token (tests, externally managed credentials).
    Fixed(String),
}

/// Client for the push provider API.
pub struct ApnsClient {
    http: reqwest::Client,
    endpoint: Url,
    topic: String,
    auth: TokenSource,
}

impl ApnsClient {
    /// Build a client that signs its own provider tokens.
    pub fn new(config: &PushConfig) -> Result<Self, Error> {
        let signer =
            ProviderTokenSigner::from_pem_file(&config.key_path, &config.key_id, &config.team_id)?;
        Ok(Self {
            http: config.transport.build_client()?,
            endpoint: config.endpoint.clone(),
            topic: config.topic.clone(),
            auth: TokenSource::Signer(signer),
        })
    }

    /// Build a client around a pre-minted provider token.
    pub fn with_bearer(
        endpoint: Url,
        topic: impl Into<String>,
        token: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoint,
            topic: topic.into(),
            auth: TokenSource::Fixed(token.into()),
        })
    }

    fn bearer(&self) -> Result<String, Error> {
        match &self.auth {
            TokenSource::Signer(signer) => signer.token(),
            TokenSource::Fixed(token) => Ok(token.clone()),
        }
    }

    fn device_url(&self, device_token: &str) -> Result<Url, Error> {
        Ok(self.endpoint.join(&format!("/3/device/{device_token}"))?)
    }

    // ── Delivery ─────────────────────────────────────────────────────

    /// Deliver a standard alert notification to one device token.
    pub async fn deliver(&self, device_token: &str, notification: &Notification) -> Result<(), Error> {
        let url = self.device_url(device_token)?;
        tracing::debug!(url = %url, "delivering alert push");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .header("apns-topic", &self.topic)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(&notification.to_wire())
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::check_response(resp).await
    }

    /// Deliver a live-activity update or end event to one activity token.
    pub async fn deliver_live_activity(
        &self,
        activity_token: &str,
        event: &LiveActivityEvent,
    ) -> Result<(), Error> {
        let url = self.device_url(activity_token)?;
        tracing::debug!(url = %url, "delivering live-activity push");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .header("apns-topic", format!("{}.push-type.liveactivity", self.topic))
            .header("apns-push-type", "liveactivity")
            .header("apns-priority", event.priority().to_string())
            .json(&event.to_wire(chrono::Utc::now()))
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::check_response(resp).await
    }

    /// Map a provider response to the crate error taxonomy.
    ///
    /// 400 `BadDeviceToken` and 410 `Unregistered` become
    /// [`Error::BadDeviceToken`] so callers can prune dead tokens.
    async fn check_response(resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["reason"].as_str().map(String::from))
            .unwrap_or_else(|| status.to_string());

        if status == reqwest::StatusCode::GONE
            || (status == reqwest::StatusCode::BAD_REQUEST && reason == "BadDeviceToken")
        {
            return Err(Error::BadDeviceToken { reason });
        }

        Err(Error::PushDelivery {
            status: status.as_u16(),
            reason,
        })
    }
}
