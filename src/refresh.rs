//! User-data refresh pulse.
//!
//! A bounded boolean pulse: [`RefreshSignal::fire`] flips the flag on,
//! invokes the registered listener synchronously, pushes `user.refresh`,
//! and clears the flag after the configured window. Components mounting
//! shortly after a restoration still observe the pulse; a poller reading
//! long afterward never acts on a stale "refresh requested".

use crate::push::PushBroadcaster;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type RefreshListener = Box<dyn Fn() + Send + Sync>;

struct RefreshInner {
    requested: AtomicBool,
    window: Duration,
    push: PushBroadcaster,
    listener: Mutex<Option<RefreshListener>>,
    clear_timer: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

/// Cheaply cloneable — all clones share the same pulse state.
#[derive(Clone)]
pub struct RefreshSignal {
    inner: Arc<RefreshInner>,
}

impl RefreshSignal {
    pub fn new(window: Duration, push: PushBroadcaster) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                requested: AtomicBool::new(false),
                window,
                push,
                listener: Mutex::new(None),
                clear_timer: Mutex::new(None),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register the listener invoked synchronously on every fire.
    /// Replaces any previous listener.
    pub fn on_refresh(&self, listener: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.inner.listener.lock() {
            *slot = Some(Box::new(listener));
        }
    }

    /// True within the pulse window of the most recent fire.
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Fire the pulse. Only this method may set the flag; consumers read
    /// it or register a listener, never write it.
    ///
    /// Re-firing inside the window restarts the clear timer. Requires a
    /// running tokio runtime for the timer task.
    pub fn fire(&self) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        self.inner.requested.store(true, Ordering::SeqCst);
        debug!("refresh pulse fired");

        if let Ok(listener) = self.inner.listener.lock() {
            if let Some(cb) = listener.as_ref() {
                cb();
            }
        }
        self.inner.push.push("user.refresh", serde_json::json!({}));

        let signal = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(signal.inner.window).await;
            signal.inner.requested.store(false, Ordering::SeqCst);
            debug!("refresh pulse cleared");
        });
        if let Ok(mut slot) = self.inner.clear_timer.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    /// Idempotent. Cancels a pending clear timer and drops the flag so a
    /// late poller cannot observe a pulse that will never clear.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.inner.clear_timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
        self.inner.requested.store(false, Ordering::SeqCst);
    }
}
