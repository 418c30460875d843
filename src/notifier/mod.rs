// SPDX-License-Identifier: MIT
//! Reconnect notifier — the presentation state machine over transitions.
//!
//! # State machine
//!
//! ```text
//! Hidden ──WentOffline──► ShowingOfflineBlock ──RestoredAfterOffline──► ShowingRestoredBanner
//!   ▲                            ▲                                            │
//!   │                            └───────────────WentOffline─────────────────┤
//!   └──────────────────────────(banner timer elapses)────────────────────────┘
//! ```
//!
//! - **Hidden**: nothing presented.
//! - **ShowingOfflineBlock**: a modal overlay blocks all interaction with
//!   the underlying screens; a pulse loop ticks the overlay animation.
//! - **ShowingRestoredBanner**: transient "back online" banner; fires the
//!   refresh pulse on entry and hides itself when the timer elapses. A new
//!   offline event preempts the banner and brings the overlay back.
//!
//! The phase enum makes showing overlay and banner at the same time
//! unrepresentable. The step function is pure — timers and pushes live in
//! the async wrapper, so the machine is unit-testable on its own.

use crate::connectivity::Transition;
use crate::push::PushBroadcaster;
use crate::refresh::RefreshSignal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shown in the restored banner. The shipped product asks the user to
/// restart rather than auto-recovering every screen; the refresh pulse only
/// nudges listeners that know how to refetch.
const RESTORED_BANNER_TEXT: &str =
    "Back online. Restart the app if any screen still looks out of date.";

/// Which reconnect surface is currently presented. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPhase {
    Hidden,
    ShowingOfflineBlock,
    ShowingRestoredBanner,
}

impl std::fmt::Display for NotificationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hidden => write!(f, "hidden"),
            Self::ShowingOfflineBlock => write!(f, "offline_block"),
            Self::ShowingRestoredBanner => write!(f, "restored_banner"),
        }
    }
}

/// Side effect requested by one step of the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseEffect {
    /// Nothing to present.
    None,
    /// Show the blocking overlay and start its pulse loop.
    ShowOverlay,
    /// Stop the overlay, fire the refresh pulse, start the banner timer.
    ShowBanner,
    /// Cancel the banner timer and bring the blocking overlay back.
    ReblockFromBanner,
}

/// Pure step function — the transition table, no timers, no I/O.
pub(crate) fn next_phase(
    phase: NotificationPhase,
    transition: Transition,
) -> (NotificationPhase, PhaseEffect) {
    use NotificationPhase::*;
    use Transition::*;

    match (phase, transition) {
        (Hidden, WentOffline) => (ShowingOfflineBlock, PhaseEffect::ShowOverlay),
        (ShowingOfflineBlock, WentOffline) => (ShowingOfflineBlock, PhaseEffect::None),
        (ShowingOfflineBlock, RestoredAfterOffline) => {
            (ShowingRestoredBanner, PhaseEffect::ShowBanner)
        }
        (ShowingRestoredBanner, WentOffline) => {
            (ShowingOfflineBlock, PhaseEffect::ReblockFromBanner)
        }
        // Everything else — plain online, or a restoration arriving while
        // nothing is shown — keeps the machine where it is.
        (phase, _) => (phase, PhaseEffect::None),
    }
}

/// Timing knobs for the notifier (see `[notifier]` in config.toml).
#[derive(Debug, Clone)]
pub struct NotifierTiming {
    /// How long the restored banner stays visible.
    pub banner_visible: Duration,
    /// Interval between overlay pulse ticks while blocking.
    pub overlay_pulse: Duration,
}

impl Default for NotifierTiming {
    fn default() -> Self {
        Self {
            banner_visible: Duration::from_millis(3_000),
            overlay_pulse: Duration::from_millis(800),
        }
    }
}

struct NotifierInner {
    phase: RwLock<NotificationPhase>,
    timing: NotifierTiming,
    push: PushBroadcaster,
    refresh: RefreshSignal,
    banner_timer: Mutex<Option<JoinHandle<()>>>,
    pulse_loop: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

/// Async wrapper around the phase machine: owns the banner timer and the
/// overlay pulse loop, pushes presentation notifications, and fires the
/// refresh pulse on restoration.
///
/// Cheaply cloneable — all clones share the same phase and timers.
#[derive(Clone)]
pub struct ReconnectNotifier {
    inner: Arc<NotifierInner>,
}

impl ReconnectNotifier {
    pub fn new(timing: NotifierTiming, push: PushBroadcaster, refresh: RefreshSignal) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                phase: RwLock::new(NotificationPhase::Hidden),
                timing,
                push,
                refresh,
                banner_timer: Mutex::new(None),
                pulse_loop: Mutex::new(None),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Step the machine with one transition and apply its side effects.
    ///
    /// The phase write guard is held through effect application so the
    /// overlay and banner can never be visible at the same instant.
    pub async fn handle(&self, transition: Transition) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        let mut phase = self.inner.phase.write().await;
        let (next, effect) = next_phase(*phase, transition);
        if *phase != next {
            info!(from = %*phase, to = %next, transition = ?transition, "notification phase change");
        }
        *phase = next;

        match effect {
            PhaseEffect::None => {}
            PhaseEffect::ShowOverlay => {
                self.inner
                    .push
                    .push("overlay.show", serde_json::json!({ "blocking": true }));
                self.start_pulse_loop();
            }
            PhaseEffect::ShowBanner => {
                self.stop_pulse_loop();
                self.inner.push.push("overlay.hide", serde_json::json!({}));
                self.inner.refresh.fire();
                self.inner.push.push(
                    "banner.show",
                    serde_json::json!({ "text": RESTORED_BANNER_TEXT }),
                );
                self.start_banner_timer();
            }
            PhaseEffect::ReblockFromBanner => {
                self.cancel_banner_timer();
                self.inner.push.push("banner.hide", serde_json::json!({}));
                self.inner
                    .push
                    .push("overlay.show", serde_json::json!({ "blocking": true }));
                self.start_pulse_loop();
            }
        }
    }

    /// Current phase.
    pub async fn phase(&self) -> NotificationPhase {
        *self.inner.phase.read().await
    }

    /// Idempotent. Cancels the banner timer and the pulse loop; no phase
    /// changes happen after the first call.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_banner_timer();
        self.stop_pulse_loop();
        debug!("reconnect notifier torn down");
    }

    fn start_banner_timer(&self) {
        let notifier = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(notifier.inner.timing.banner_visible).await;
            notifier.finish_banner().await;
        });
        if let Ok(mut slot) = self.inner.banner_timer.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    fn cancel_banner_timer(&self) {
        if let Ok(mut slot) = self.inner.banner_timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }

    /// Banner timer elapsed — hide the banner unless something already
    /// moved the machine on.
    async fn finish_banner(&self) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        let mut phase = self.inner.phase.write().await;
        if *phase == NotificationPhase::ShowingRestoredBanner {
            *phase = NotificationPhase::Hidden;
            debug!("restored banner elapsed — hiding");
            self.inner.push.push("banner.hide", serde_json::json!({}));
        }
    }

    fn start_pulse_loop(&self) {
        let notifier = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(notifier.inner.timing.overlay_pulse);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; the first pulse should land
            // one period after overlay.show.
            interval.tick().await;
            loop {
                interval.tick().await;
                notifier
                    .inner
                    .push
                    .push("overlay.pulse", serde_json::json!({}));
            }
        });
        if let Ok(mut slot) = self.inner.pulse_loop.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    fn stop_pulse_loop(&self) {
        if let Ok(mut slot) = self.inner.pulse_loop.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
