//! Connectivity core — committed reachability state and the event funnel.
//!
//! ## Submodules
//!
//! - `state` — [`ConnectivityState`], [`Transition`], and the pure
//!   transition function every sample is committed through
//! - `monitor` — [`ConnectivityMonitor`]: owns the subscriptions, the
//!   initial probe, manual retry, and teardown
//!
//! The monitor is the single writer of the state; everything downstream
//! (the reconnect notifier, UI pushes) reacts to the transitions it derives.

pub mod monitor;
pub mod state;

pub use monitor::ConnectivityMonitor;
pub use state::{ConnectivityState, Transition};
