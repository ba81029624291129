//! Entry point for resmon_agent. Reads configuration, opens the output files
//! and runs the sampling loop until SIGINT/SIGTERM.

use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use resmon_agent::config::{Config, USAGE};
use resmon_agent::encode::SCHEMA_VERSION;
use resmon_agent::metrics::SystemSampler;
use resmon_agent::observability::{ObservabilityContext, SEPARATOR_WIDTH};
use resmon_agent::probe::PingProbe;
use resmon_agent::sampler::Monitor;
use resmon_agent::sink::RotationPolicy;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// A handler that failed to install must not read as a shutdown request.
async fn signal_or_pending(name: &str, installed: std::io::Result<()>) {
    if let Err(e) = installed {
        warn!("{name} handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}

async fn ctrl_c() {
    signal_or_pending("SIGINT", tokio::signal::ctrl_c().await).await;
}

// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("cannot create log directory {}", cfg.log_dir.display()))?;
    let ctx = ObservabilityContext::open(
        &cfg.log_dir,
        &cfg.mode,
        cfg.log_format,
        cfg.console_output,
        RotationPolicy::default(),
    )
    .context("cannot open output files")?;

    let host = hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "unknown".into());
    info!(
        "resmon_agent {} on {host}: dir={}, mode={}, interval={}s, format={}, top={}, csv schema v{}",
        env!("CARGO_PKG_VERSION"),
        cfg.log_dir.display(),
        cfg.mode,
        cfg.interval.as_secs(),
        cfg.log_format.as_str(),
        cfg.process_count,
        SCHEMA_VERSION
    );
    println!("Starting monitor in {} mode", cfg.mode);
    println!(
        "Logging Format Set To: {}",
        cfg.log_format.as_str().to_ascii_uppercase()
    );
    println!("{}", "-".repeat(SEPARATOR_WIDTH));

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = tx.send(true);
        // keep the sender alive so the loop only sees the explicit flag
        std::future::pending::<()>().await;
    });

    let mut monitor = Monitor::new(SystemSampler::new(), PingProbe::new(), ctx, &cfg);
    monitor.run(&cfg, rx).await;
    info!("Shutdown complete after {} ticks", monitor.ticks());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cfg = match Config::from_env().and_then(|c| c.apply_args(std::env::args())) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("resmon_agent: {e}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
