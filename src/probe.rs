//! Reachability probe — the one-shot "can we reach the backend" check.
//!
//! The probe is the only I/O this crate performs. Every failure mode is
//! absorbed by the caller as `connected=false`; a probe error is never
//! shown to the user as a distinct error and never crashes the agent.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One `{connected, link_type}` observation, from a probe or the watcher feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSample {
    pub connected: bool,
    /// Transport hint, e.g. "wifi" or "cellular". `None` = unknown; the
    /// monitor keeps the last known hint when a sample carries none.
    pub link_type: Option<String>,
}

impl LinkSample {
    pub fn online(link_type: impl Into<String>) -> Self {
        Self {
            connected: true,
            link_type: Some(link_type.into()),
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            link_type: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Transport-level failure: DNS, connection refused, TLS, timeout.
    #[error("reachability probe failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The platform could not answer the probe at all.
    #[error("reachability probe unavailable: {0}")]
    Unavailable(String),
}

/// One-shot reachability check.
///
/// Implementations must never panic; callers treat any `Err` as offline.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<LinkSample, ProbeError>;
}

/// HTTP HEAD against the configured probe URL as a lightweight ping.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Result<LinkSample, ProbeError> {
        self.client.head(&self.url).send().await?;
        // The HTTP layer cannot tell wifi from cellular; the transport hint
        // stays unknown and the monitor keeps the last one it saw.
        Ok(LinkSample {
            connected: true,
            link_type: None,
        })
    }
}
