// SPDX-License-Identifier: MIT
//! Connectivity monitor — owns the committed state and the event funnel.
//!
//! Every sample reaches the state through [`ConnectivityMonitor::on_network_change`]:
//! the initial probe, watcher feed events, manual retries, and foreground
//! re-probes. The state write lock is held across the notifier hand-off, so
//! transitions reach the notifier in commit order and `was_offline` can
//! never be observed half-updated.

use crate::connectivity::state::{apply_sample, ConnectivityState};
use crate::notifier::ReconnectNotifier;
use crate::probe::{LinkSample, ReachabilityProbe};
use crate::push::PushBroadcaster;
use crate::watch::{LifecycleEvent, LifecycleSource, NetworkSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct MonitorInner {
    state: RwLock<ConnectivityState>,
    probe: Arc<dyn ReachabilityProbe>,
    network: Arc<dyn NetworkSource>,
    lifecycle: Arc<dyn LifecycleSource>,
    notifier: ReconnectNotifier,
    push: PushBroadcaster,
    torn_down: AtomicBool,
    /// Set when the network feed channel closes; cleared by the one-time
    /// re-subscription on the next foreground event.
    subscription_lost: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheaply cloneable — all clones share the same committed state, timers,
/// and subscriptions.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        network: Arc<dyn NetworkSource>,
        lifecycle: Arc<dyn LifecycleSource>,
        notifier: ReconnectNotifier,
        push: PushBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: RwLock::new(ConnectivityState::new()),
                probe,
                network,
                lifecycle,
                notifier,
                push,
                torn_down: AtomicBool::new(false),
                subscription_lost: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// One immediate probe, then subscribe to the network and lifecycle
    /// feeds. A failed initial probe is committed as offline.
    pub async fn initialize(&self) {
        let sample = self.sample_or_offline().await;
        self.on_network_change(sample).await;
        self.spawn_network_forwarder();
        self.spawn_lifecycle_forwarder();
        let connected = self.snapshot().await.is_connected;
        info!(connected, "connectivity monitor initialized");
    }

    /// The single funnel every sample is committed through.
    pub async fn on_network_change(&self, sample: LinkSample) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        // Hold the write guard across the notifier hand-off — the lock is
        // also the ordering serializer for concurrent probe completions.
        let mut state = self.inner.state.write().await;
        let transition = apply_sample(&mut state, sample.connected, sample.link_type.as_deref());
        if let Some(t) = transition {
            debug!(transition = ?t, connected = state.is_connected, "connectivity transition");
            self.inner.push.push(
                "connectivity.changed",
                serde_json::json!({
                    "connected": state.is_connected,
                    "link_type": state.link_type,
                    "at": state.changed_at.to_rfc3339(),
                }),
            );
            self.inner.notifier.handle(t).await;
        }
    }

    /// User-triggered manual re-probe. If the state did not actually flip,
    /// no transition is derived and nothing is presented — the UI never
    /// restarts its animations on a no-change retry.
    pub async fn retry_now(&self) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        debug!("manual reachability re-check");
        let sample = self.sample_or_offline().await;
        self.on_network_change(sample).await;
    }

    /// Read-only copy of the committed state.
    pub async fn snapshot(&self) -> ConnectivityState {
        self.inner.state.read().await.clone()
    }

    /// Idempotent. Aborts the forwarder tasks and the notifier's timers;
    /// after the first call no further samples are committed.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.inner.notifier.teardown();
        info!("connectivity monitor torn down");
    }

    async fn sample_or_offline(&self) -> LinkSample {
        match self.inner.probe.probe().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(err = %e, "reachability probe failed — assuming offline");
                LinkSample::offline()
            }
        }
    }

    fn spawn_network_forwarder(&self) {
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut rx = monitor.inner.network.subscribe();
            loop {
                match rx.recv().await {
                    Ok(sample) => monitor.on_network_change(sample).await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "network feed lagged — continuing with latest");
                    }
                    Err(RecvError::Closed) => {
                        warn!("network feed closed — will re-subscribe on next foreground");
                        monitor.inner.subscription_lost.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
        self.track(handle);
    }

    fn spawn_lifecycle_forwarder(&self) {
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut rx = monitor.inner.lifecycle.subscribe();
            loop {
                match rx.recv().await {
                    Ok(LifecycleEvent::Foregrounded) => {
                        debug!("foreground — re-probing, radios may have changed");
                        if monitor.inner.subscription_lost.swap(false, Ordering::SeqCst) {
                            info!("re-subscribing to network feed after loss");
                            monitor.spawn_network_forwarder();
                        }
                        let sample = monitor.sample_or_offline().await;
                        monitor.on_network_change(sample).await;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }
}
