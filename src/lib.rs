pub mod config;
pub mod connectivity;
pub mod notifier;
pub mod probe;
pub mod push;
pub mod refresh;
pub mod watch;

use std::sync::Arc;

use config::AgentConfig;
use push::PushBroadcaster;
use refresh::RefreshSignal;

/// Shared state handed to the monitor and to anything that consumes
/// connectivity pushes or the refresh pulse.
///
/// The refresh signal is the one deliberately process-wide piece of mutable
/// state. It is constructed here, with an explicit teardown, and handed to
/// dependents — never reached through an ambient global.
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<AgentConfig>,
    pub push: PushBroadcaster,
    pub refresh: RefreshSignal,
    pub started_at: std::time::Instant,
}

impl AgentContext {
    pub fn new(config: AgentConfig) -> Self {
        let push = PushBroadcaster::new();
        let refresh = RefreshSignal::new(config.refresh.pulse_window(), push.clone());
        Self {
            config: Arc::new(config),
            push,
            refresh,
            started_at: std::time::Instant::now(),
        }
    }
}
