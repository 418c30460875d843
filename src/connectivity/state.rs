// SPDX-License-Identifier: MIT
//! Committed connectivity state and the transition function.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An instantaneous connectivity fact derived from one committed sample.
/// Consumed once by the notifier; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The link flipped from connected to disconnected.
    WentOffline,
    /// Online edge with no preceding offline period.
    ///
    /// [`apply_sample`] cannot produce this — any committed offline sample
    /// marks the offline period, which makes the next online edge a
    /// restoration. Kept so consumers handle the full taxonomy.
    WentOnline,
    /// Online again after at least one offline sample with no online
    /// sample in between.
    RestoredAfterOffline,
}

/// Single source of truth for reachability, owned by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityState {
    pub is_connected: bool,
    /// Transport hint from the last sample that carried one.
    pub link_type: Option<String>,
    /// True from the first offline sample until a restoration is derived.
    /// Updated only after the restored-check, so a read replayed between
    /// events cannot double-fire the restoration.
    pub was_offline: bool,
    /// When `is_connected` last flipped.
    pub changed_at: DateTime<Utc>,
}

impl ConnectivityState {
    /// The agent assumes it is online until the initial probe says
    /// otherwise; an offline initial probe then flips the state and shows
    /// the overlay like any other offline event.
    pub fn new() -> Self {
        Self {
            is_connected: true,
            link_type: None,
            was_offline: false,
            changed_at: Utc::now(),
        }
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::new()
    }
}

/// Commit one sample and derive the transition, if any.
///
/// The previous `was_offline` is captured before any mutation. Repeated
/// offline samples are idempotent — the transport hint is still updated,
/// but no transition is derived when the state did not actually flip.
pub fn apply_sample(
    state: &mut ConnectivityState,
    connected: bool,
    link_type: Option<&str>,
) -> Option<Transition> {
    let previously_offline = state.was_offline;
    let previously_connected = state.is_connected;

    if previously_connected != connected {
        state.changed_at = Utc::now();
    }
    state.is_connected = connected;
    if let Some(t) = link_type {
        state.link_type = Some(t.to_string());
    }

    if previously_offline && connected {
        state.was_offline = false;
        return Some(Transition::RestoredAfterOffline);
    }

    state.was_offline = !connected;

    if !connected && previously_connected {
        return Some(Transition::WentOffline);
    }

    // Plain online is not a transition.
    None
}
