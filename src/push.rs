use serde_json::Value;
use tokio::sync::broadcast;

/// Fans notification strings out to every subscribed UI surface.
///
/// Each notification is a JSON object `{"at", "method", "params"}` — the
/// shape the StayPass client screens already consume. Delivery is
/// fire-and-forget: subscribers that lag are skipped, and pushing with no
/// subscribers at all is fine.
#[derive(Clone)]
pub struct PushBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for PushBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl PushBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Send a notification to all subscribers.
    pub fn push(&self, method: &str, params: Value) {
        let notification = serde_json::json!({
            "method": method,
            "params": params,
            "at": chrono::Utc::now().to_rfc3339(),
        });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to all pushed notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
