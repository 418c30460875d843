use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;

const DEFAULT_PROBE_URL: &str = "https://api.staypass.app/health";
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 30;
const DEFAULT_BANNER_VISIBLE_MS: u64 = 3_000;
const DEFAULT_OVERLAY_PULSE_MS: u64 = 800;
const DEFAULT_PULSE_WINDOW_MS: u64 = 1_000;

// ─── ConnectivityConfig ───────────────────────────────────────────────────────

/// Reachability probing (`[connectivity]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Probe request timeout in milliseconds. Default: 5000.
    pub probe_timeout_ms: u64,
    /// Seconds between platform watcher probes. Default: 30.
    pub watch_interval_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}

// ─── NotifierConfig ───────────────────────────────────────────────────────────

/// Reconnect overlay/banner timing (`[notifier]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// How long the restored banner stays visible, in milliseconds. Default: 3000.
    pub banner_visible_ms: u64,
    /// Interval between overlay pulse ticks while blocking, in milliseconds. Default: 800.
    pub overlay_pulse_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            banner_visible_ms: DEFAULT_BANNER_VISIBLE_MS,
            overlay_pulse_ms: DEFAULT_OVERLAY_PULSE_MS,
        }
    }
}

impl NotifierConfig {
    pub fn banner_visible(&self) -> Duration {
        Duration::from_millis(self.banner_visible_ms)
    }

    pub fn overlay_pulse(&self) -> Duration {
        Duration::from_millis(self.overlay_pulse_ms)
    }
}

// ─── RefreshConfig ────────────────────────────────────────────────────────────

/// Refresh pulse (`[refresh]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// How long the refresh flag stays observable after a fire, in
    /// milliseconds. Default: 1000.
    pub pulse_window_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pulse_window_ms: DEFAULT_PULSE_WINDOW_MS,
        }
    }
}

impl RefreshConfig {
    pub fn pulse_window(&self) -> Duration {
        Duration::from_millis(self.pulse_window_ms)
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Reachability probe URL (default: https://api.staypass.app/health).
    probe_url: Option<String>,
    /// Log level filter string, e.g. "debug", "info,staypassd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Reachability probing (`[connectivity]`).
    connectivity: Option<ConnectivityConfig>,
    /// Overlay/banner timing (`[notifier]`).
    notifier: Option<NotifierConfig>,
    /// Refresh pulse (`[refresh]`).
    refresh: Option<RefreshConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AgentConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Reachability probe URL (STAYPASS_PROBE_URL env var).
    pub probe_url: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Reachability probing: timeout, watcher interval.
    pub connectivity: ConnectivityConfig,
    /// Overlay/banner timing.
    pub notifier: NotifierConfig,
    /// Refresh pulse window.
    pub refresh: RefreshConfig,
}

impl AgentConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(probe_url: Option<String>, data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let probe_url = probe_url
            .or(toml.probe_url)
            .unwrap_or_else(|| DEFAULT_PROBE_URL.to_string());

        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("STAYPASS_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let connectivity = toml.connectivity.unwrap_or_default();
        let notifier = toml.notifier.unwrap_or_default();
        let refresh = toml.refresh.unwrap_or_default();

        Self {
            probe_url,
            data_dir,
            log,
            log_format,
            connectivity,
            notifier,
            refresh,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/staypass
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("staypass");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/staypass or ~/.local/share/staypass
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("staypass");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("staypass");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\staypass
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("staypass");
        }
    }
    // Fallback
    PathBuf::from(".staypass")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_config_file() {
        let dir = TempDir::new().unwrap();
        let cfg = AgentConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.probe_url, DEFAULT_PROBE_URL);
        assert_eq!(cfg.log, "info");
        assert_eq!(cfg.connectivity.probe_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.notifier.banner_visible(), Duration::from_secs(3));
        assert_eq!(cfg.refresh.pulse_window(), Duration::from_secs(1));
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
probe_url = "https://staging.staypass.app/health"
log = "debug"

[connectivity]
probe_timeout_ms = 2500
watch_interval_secs = 10

[notifier]
banner_visible_ms = 1500

[refresh]
pulse_window_ms = 750
"#,
        )
        .unwrap();

        let cfg = AgentConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.probe_url, "https://staging.staypass.app/health");
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.connectivity.probe_timeout_ms, 2500);
        assert_eq!(cfg.connectivity.watch_interval_secs, 10);
        assert_eq!(cfg.notifier.banner_visible_ms, 1500);
        // Unset section fields keep their defaults.
        assert_eq!(cfg.notifier.overlay_pulse_ms, DEFAULT_OVERLAY_PULSE_MS);
        assert_eq!(cfg.refresh.pulse_window_ms, 750);
    }

    #[test]
    fn cli_beats_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "probe_url = \"https://toml.staypass.app/health\"\n",
        )
        .unwrap();

        let cfg = AgentConfig::new(
            Some("https://cli.staypass.app/health".to_string()),
            Some(dir.path().to_path_buf()),
            None,
        );
        assert_eq!(cfg.probe_url, "https://cli.staypass.app/health");
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "probe_url = [not toml").unwrap();

        let cfg = AgentConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.probe_url, DEFAULT_PROBE_URL);
    }
}
