// SPDX-License-Identifier: MIT
//! Platform feeds — the event sources the monitor subscribes to.
//!
//! Mobile platforms push network-change and app-foreground events; a
//! headless agent has no portable equivalent, so the production
//! [`NetworkSource`] is an interval probe loop and the production
//! [`LifecycleSource`] maps `SIGUSR1` to "app came to foreground". The
//! monitor itself never schedules re-probes — these feeds are the external
//! collaborators that drive it.

use crate::probe::{LinkSample, ReachabilityProbe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Continuous feed of link samples — the platform's network-change
/// subscription. A closed channel means the subscription was lost; the
/// monitor re-subscribes once on the next foreground event.
pub trait NetworkSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<LinkSample>;
}

/// App lifecycle transitions. Only the foreground edge is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foregrounded,
}

pub trait LifecycleSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent>;
}

// ─── ProbeWatcher ─────────────────────────────────────────────────────────────

/// Interval-probe watcher — headless stand-in for the mobile platform's
/// network-change feed. Runs the reachability probe every `interval` and
/// broadcasts each sample; a probe failure is broadcast as offline.
pub struct ProbeWatcher {
    tx: broadcast::Sender<LinkSample>,
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
}

impl ProbeWatcher {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            probe,
            interval,
        }
    }

    /// Spawn the probe loop.
    /// Returns the `JoinHandle` — drop or abort to stop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; the monitor already did its
            // own initial probe, so skip it.
            interval.tick().await;

            loop {
                interval.tick().await;
                let sample = match self.probe.probe().await {
                    Ok(s) => s,
                    Err(e) => {
                        debug!(err = %e, "watcher probe failed — reporting offline");
                        LinkSample::offline()
                    }
                };
                // Ignore errors — no subscribers is fine
                let _ = self.tx.send(sample);
            }
        })
    }
}

impl NetworkSource for ProbeWatcher {
    fn subscribe(&self) -> broadcast::Receiver<LinkSample> {
        self.tx.subscribe()
    }
}

// ─── Lifecycle feeds ──────────────────────────────────────────────────────────

/// `SIGUSR1` = "app came to foreground — radios may have changed while
/// backgrounded". Unix only.
#[cfg(unix)]
pub struct SignalLifecycle {
    tx: broadcast::Sender<LifecycleEvent>,
}

#[cfg(unix)]
impl Default for SignalLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl SignalLifecycle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Spawn the signal listener.
    /// Returns the `JoinHandle` — drop or abort to stop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut sig = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::user_defined1(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    warn!(err = %e, "SIGUSR1 handler unavailable — foreground re-probe disabled");
                    return;
                }
            };
            while sig.recv().await.is_some() {
                debug!("SIGUSR1 received — treating as app foreground");
                let _ = self.tx.send(LifecycleEvent::Foregrounded);
            }
        })
    }
}

#[cfg(unix)]
impl LifecycleSource for SignalLifecycle {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

/// Inert lifecycle feed for platforms without a foreground signal. The
/// sender lives as long as the source, so subscribers block instead of
/// seeing a closed channel.
pub struct NullLifecycle {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for NullLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl NullLifecycle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }
}

impl LifecycleSource for NullLifecycle {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

/// Platform lifecycle feed: `SIGUSR1` on unix, inert elsewhere.
///
/// Returns the source plus the listener task handle, if one was spawned.
pub fn platform_lifecycle() -> (Arc<dyn LifecycleSource>, Option<JoinHandle<()>>) {
    #[cfg(unix)]
    {
        let src = Arc::new(SignalLifecycle::new());
        let task = Arc::clone(&src).spawn();
        info!("foreground feed active — send SIGUSR1 to force a re-probe");
        (src as Arc<dyn LifecycleSource>, Some(task))
    }
    #[cfg(not(unix))]
    {
        info!("no platform foreground signal — foreground re-probe disabled");
        (Arc::new(NullLifecycle::new()) as Arc<dyn LifecycleSource>, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;

    /// Probe that always fails — the watcher must report offline.
    struct DeadProbe;

    #[async_trait::async_trait]
    impl ReachabilityProbe for DeadProbe {
        async fn probe(&self) -> Result<LinkSample, ProbeError> {
            Err(ProbeError::Unavailable("dead probe".to_string()))
        }
    }

    #[tokio::test]
    async fn watcher_broadcasts_offline_on_probe_failure() {
        let watcher = Arc::new(ProbeWatcher::new(
            Arc::new(DeadProbe),
            Duration::from_millis(10),
        ));
        let mut rx = watcher.subscribe();
        let task = Arc::clone(&watcher).spawn();

        let sample = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("watcher produced no sample in time")
            .unwrap();
        assert!(!sample.connected);

        task.abort();
    }

    #[tokio::test]
    async fn null_lifecycle_never_closes() {
        let src = NullLifecycle::new();
        let mut rx = src.subscribe();
        let recv = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        // Timeout, not Closed — the feed stays open and silent.
        assert!(recv.is_err());
    }
}
