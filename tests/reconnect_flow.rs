//! End-to-end reconnect scenarios over the full monitor → notifier →
//! refresh wiring, driven by scriptable network and lifecycle feeds.

use async_trait::async_trait;
use staypassd::connectivity::ConnectivityMonitor;
use staypassd::notifier::{NotificationPhase, NotifierTiming, ReconnectNotifier};
use staypassd::probe::{LinkSample, ProbeError, ReachabilityProbe};
use staypassd::push::PushBroadcaster;
use staypassd::refresh::RefreshSignal;
use staypassd::watch::{LifecycleEvent, LifecycleSource, NetworkSource};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const BANNER_MS: u64 = 80;
const PULSE_MS: u64 = 20;
const REFRESH_MS: u64 = 120;

/// Probe that replays a scripted sequence; `None` entries fail the probe.
/// Once the script runs out it repeats the final entry.
struct ScriptedProbe {
    script: Mutex<VecDeque<Option<LinkSample>>>,
    last: Mutex<Option<LinkSample>>,
}

impl ScriptedProbe {
    fn new(script: Vec<Option<LinkSample>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> Result<LinkSample, ProbeError> {
        let step = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(step) => {
                    *self.last.lock().unwrap() = step.clone();
                    step
                }
                None => self.last.lock().unwrap().clone(),
            }
        };
        step.ok_or_else(|| ProbeError::Unavailable("scripted failure".to_string()))
    }
}

/// Network feed whose sender can be dropped to simulate a lost platform
/// subscription. Re-subscribers land on the replacement channel.
#[derive(Clone)]
struct FakeNetwork {
    tx: Arc<Mutex<broadcast::Sender<LinkSample>>>,
}

impl FakeNetwork {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            tx: Arc::new(Mutex::new(tx)),
        }
    }

    fn emit(&self, sample: LinkSample) {
        let _ = self.tx.lock().unwrap().send(sample);
    }

    /// Drop the current sender — existing subscribers observe a closed
    /// channel; the next subscribe gets a fresh feed.
    fn drop_feed(&self) {
        let (tx, _) = broadcast::channel(32);
        *self.tx.lock().unwrap() = tx;
    }
}

impl NetworkSource for FakeNetwork {
    fn subscribe(&self) -> broadcast::Receiver<LinkSample> {
        self.tx.lock().unwrap().subscribe()
    }
}

#[derive(Clone)]
struct FakeLifecycle {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl FakeLifecycle {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    fn foreground(&self) {
        let _ = self.tx.send(LifecycleEvent::Foregrounded);
    }
}

impl LifecycleSource for FakeLifecycle {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

struct Harness {
    monitor: ConnectivityMonitor,
    notifier: ReconnectNotifier,
    refresh: RefreshSignal,
    push: PushBroadcaster,
    net: FakeNetwork,
    life: FakeLifecycle,
}

fn harness(script: Vec<Option<LinkSample>>) -> Harness {
    let push = PushBroadcaster::new();
    let refresh = RefreshSignal::new(Duration::from_millis(REFRESH_MS), push.clone());
    let notifier = ReconnectNotifier::new(
        NotifierTiming {
            banner_visible: Duration::from_millis(BANNER_MS),
            overlay_pulse: Duration::from_millis(PULSE_MS),
        },
        push.clone(),
        refresh.clone(),
    );
    let net = FakeNetwork::new();
    let life = FakeLifecycle::new();
    let monitor = ConnectivityMonitor::new(
        Arc::new(ScriptedProbe::new(script)),
        Arc::new(net.clone()),
        Arc::new(life.clone()),
        notifier.clone(),
        push.clone(),
    );
    Harness {
        monitor,
        notifier,
        refresh,
        push,
        net,
        life,
    }
}

/// Let the forwarder tasks drain the feeds.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

fn drain(rx: &mut broadcast::Receiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn count(msgs: &[String], method: &str) -> usize {
    msgs.iter()
        .filter(|m| {
            serde_json::from_str::<serde_json::Value>(m)
                .map(|v| v["method"] == method)
                .unwrap_or(false)
        })
        .count()
}

#[tokio::test]
async fn offline_twice_then_online_notifies_once() {
    let h = harness(vec![Some(LinkSample::online("wifi"))]);
    let mut rx = h.push.subscribe();
    h.monitor.initialize().await;

    h.net.emit(LinkSample::offline());
    settle().await;
    h.net.emit(LinkSample::offline());
    settle().await;
    h.net.emit(LinkSample::online("wifi"));
    settle().await;

    let msgs = drain(&mut rx);
    assert_eq!(count(&msgs, "overlay.show"), 1, "one overlay show, no repeats");
    assert_eq!(count(&msgs, "banner.show"), 1);
    assert_eq!(count(&msgs, "user.refresh"), 1);
    assert_eq!(count(&msgs, "connectivity.changed"), 2, "one per actual flip");
    assert!(h.refresh.is_requested());
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingRestoredBanner
    );

    // Banner hides on its own; the refresh pulse clears after its window.
    tokio::time::sleep(Duration::from_millis(BANNER_MS + REFRESH_MS)).await;
    assert_eq!(h.notifier.phase().await, NotificationPhase::Hidden);
    assert!(!h.refresh.is_requested());
    assert_eq!(count(&drain(&mut rx), "banner.hide"), 1);

    h.monitor.teardown();
}

#[tokio::test]
async fn new_offline_preempts_restored_banner() {
    let h = harness(vec![Some(LinkSample::online("wifi"))]);
    let mut rx = h.push.subscribe();
    h.monitor.initialize().await;

    h.net.emit(LinkSample::offline());
    settle().await;
    h.net.emit(LinkSample::online("wifi"));
    settle().await;
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingRestoredBanner
    );

    // Offline again while the banner is still up.
    h.net.emit(LinkSample::offline());
    settle().await;
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingOfflineBlock
    );

    // The cancelled banner timer must not hide the overlay later, and the
    // second offline fires no refresh pulse.
    tokio::time::sleep(Duration::from_millis(BANNER_MS + 40)).await;
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingOfflineBlock
    );
    let msgs = drain(&mut rx);
    assert_eq!(count(&msgs, "user.refresh"), 1);
    assert_eq!(count(&msgs, "overlay.show"), 2, "initial show plus re-block");

    h.monitor.teardown();
}

#[tokio::test]
async fn manual_retry_while_online_changes_nothing() {
    let h = harness(vec![
        Some(LinkSample::online("wifi")),
        Some(LinkSample::online("wifi")),
    ]);
    h.monitor.initialize().await;

    let mut rx = h.push.subscribe();
    h.monitor.retry_now().await;
    settle().await;

    assert!(drain(&mut rx).is_empty(), "no-change retry pushes nothing");
    assert_eq!(h.notifier.phase().await, NotificationPhase::Hidden);
    assert!(h.monitor.snapshot().await.is_connected);

    h.monitor.teardown();
}

#[tokio::test]
async fn double_teardown_freezes_the_monitor() {
    let h = harness(vec![Some(LinkSample::online("wifi"))]);
    h.monitor.initialize().await;

    h.monitor.teardown();
    h.monitor.teardown();

    h.net.emit(LinkSample::offline());
    settle().await;

    let state = h.monitor.snapshot().await;
    assert!(state.is_connected, "no commits after teardown");
    assert_eq!(h.notifier.phase().await, NotificationPhase::Hidden);
}

#[tokio::test]
async fn lost_feed_resubscribes_on_foreground() {
    // Initial probe online; the foreground re-probe fails, so the monitor
    // commits offline; the re-subscribed feed then restores it.
    let h = harness(vec![Some(LinkSample::online("wifi")), None]);
    h.monitor.initialize().await;

    h.net.drop_feed();
    settle().await;

    h.life.foreground();
    settle().await;
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingOfflineBlock
    );

    // The replacement feed must be live again after the one-time
    // re-subscription.
    h.net.emit(LinkSample::online("cellular"));
    settle().await;
    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingRestoredBanner
    );
    assert!(h.refresh.is_requested());
    assert_eq!(
        h.monitor.snapshot().await.link_type.as_deref(),
        Some("cellular")
    );

    h.monitor.teardown();
}

#[tokio::test]
async fn foreground_reprobe_detects_background_offline() {
    // Online at start; the radio died while "backgrounded" (the feed is
    // silent), and the foreground re-probe notices.
    let h = harness(vec![Some(LinkSample::online("wifi")), None]);
    h.monitor.initialize().await;
    assert_eq!(h.notifier.phase().await, NotificationPhase::Hidden);

    h.life.foreground();
    settle().await;

    assert_eq!(
        h.notifier.phase().await,
        NotificationPhase::ShowingOfflineBlock
    );
    assert!(!h.monitor.snapshot().await.is_connected);

    h.monitor.teardown();
}
