use anyhow::Result;
use clap::Parser;
use staypassd::{
    config::AgentConfig,
    connectivity::ConnectivityMonitor,
    notifier::{NotifierTiming, ReconnectNotifier},
    probe::{HttpProbe, ReachabilityProbe},
    watch::{platform_lifecycle, NetworkSource, ProbeWatcher},
    AgentContext,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "staypassd",
    about = "StayPass connectivity agent — reachability monitor and reconnect notifier",
    version
)]
struct Args {
    /// Reachability probe URL
    #[arg(long, env = "STAYPASS_PROBE_URL")]
    probe_url: Option<String>,

    /// Data directory for config.toml
    #[arg(long, env = "STAYPASS_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STAYPASS_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "STAYPASS_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AgentConfig::new(args.probe_url, args.data_dir, args.log);
    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        probe_url = %config.probe_url,
        "staypassd starting"
    );

    let ctx = AgentContext::new(config);

    // Platform collaborators: the probe, its interval watcher (the
    // network-change feed), and the SIGUSR1 foreground feed.
    let probe: Arc<dyn ReachabilityProbe> = Arc::new(HttpProbe::new(
        ctx.config.probe_url.clone(),
        ctx.config.connectivity.probe_timeout(),
    ));
    let watcher = Arc::new(ProbeWatcher::new(
        Arc::clone(&probe),
        ctx.config.connectivity.watch_interval(),
    ));
    let watcher_task = Arc::clone(&watcher).spawn();
    let network: Arc<dyn NetworkSource> = watcher;
    let (lifecycle, lifecycle_task) = platform_lifecycle();

    let notifier = ReconnectNotifier::new(
        NotifierTiming {
            banner_visible: ctx.config.notifier.banner_visible(),
            overlay_pulse: ctx.config.notifier.overlay_pulse(),
        },
        ctx.push.clone(),
        ctx.refresh.clone(),
    );

    let monitor = ConnectivityMonitor::new(probe, network, lifecycle, notifier, ctx.push.clone());
    monitor.initialize().await;

    // The UI would attach here; in the standalone agent the pushes go to
    // the log and the refresh callback records the request.
    ctx.refresh
        .on_refresh(|| info!("user-data refresh requested — consumers should refetch"));
    let mut push_rx = ctx.push.subscribe();
    let push_log_task = tokio::spawn(async move {
        loop {
            match push_rx.recv().await {
                Ok(msg) => debug!(notification = %msg, "push"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    monitor.teardown();
    ctx.refresh.teardown();
    watcher_task.abort();
    if let Some(task) = lifecycle_task {
        task.abort();
    }
    push_log_task.abort();

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format)
/// or `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only
/// logging with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    let stdout_only = |use_json: bool| {
        if use_json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(log_level)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
        }
    };

    let Some(path) = log_file else {
        stdout_only(use_json);
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("staypassd.log"));

    // Ensure the directory exists before tracing-appender tries to open it.
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — falling back to stdout",
            dir.display()
        );
        stdout_only(use_json);
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    if use_json {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().json())
            .with(fmt::layer().json().with_writer(non_blocking))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(non_blocking))
            .init();
    }

    Some(guard)
}
