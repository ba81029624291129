//! Fixed-interval sampling loop: providers -> encoders -> sinks, once per tick.
//!
//! Each category is sampled, encoded and written inside its own isolation
//! boundary, so one failing category never stops the others or the loop.

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

use crate::config::Config;
use crate::encode::EncoderSet;
use crate::error::CategoryError;
use crate::metrics::MetricsSource;
use crate::observability::{Level, ObservabilityContext, SEPARATOR_WIDTH};
use crate::probe::Probe;
use crate::types::{Category, Encoding, MetricSnapshot, ReachabilitySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Per-category outcome of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub written: Vec<Category>,
    pub failed: Vec<(Category, String)>,
    pub reachability: Option<ReachabilitySnapshot>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Monitor<S, P> {
    source: S,
    probe: P,
    ctx: ObservabilityContext,
    encoders: EncoderSet,
    ping_host: String,
    ping_timeout: Duration,
    process_count: usize,
    state: LoopState,
    ticks: u64,
}

impl<S: MetricsSource, P: Probe> Monitor<S, P> {
    pub fn new(source: S, probe: P, ctx: ObservabilityContext, cfg: &Config) -> Self {
        Self {
            source,
            probe,
            ctx,
            encoders: EncoderSet::new(cfg.process_count),
            ping_host: cfg.ping_host.clone(),
            ping_timeout: cfg.ping_timeout,
            process_count: cfg.process_count,
            state: LoopState::Starting,
            ticks: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn context(&self) -> &ObservabilityContext {
        &self.ctx
    }

    fn transition(&mut self, next: LoopState) {
        debug!("monitor state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Prime CPU baselines and announce the configuration on the main channel.
    pub fn start(&mut self, cfg: &Config) {
        if self.state != LoopState::Starting {
            return;
        }
        self.source.prime();
        let format = cfg.log_format;
        let enabled = |on: bool| if on { "ENABLED" } else { "DISABLED" };
        self.ctx
            .main(Level::Info, &format!("Starting monitor in {} mode", cfg.mode));
        self.ctx.main(
            Level::Info,
            &format!("Logging Format Set To: {}", format.as_str().to_ascii_uppercase()),
        );
        self.ctx.main(
            Level::Info,
            &format!("CSV Logging: {}", enabled(format.enables(Encoding::Csv))),
        );
        self.ctx.main(
            Level::Info,
            &format!("Flat Logging: {}", enabled(format.enables(Encoding::Log))),
        );
        self.ctx.main(Level::Info, &"-".repeat(SEPARATOR_WIDTH));
        self.transition(LoopState::Running);
    }

    // encode + write one snapshot to every enabled sink, then summarize
    fn emit(
        &mut self,
        snapshot: &MetricSnapshot,
        ping: Option<&ReachabilitySnapshot>,
        at: &DateTime<Local>,
    ) -> Result<(), CategoryError> {
        let category = snapshot.category();
        let human = self.encoders.encode_human(snapshot, ping)?;
        let row = self.encoders.encode_csv(snapshot, ping, at)?;
        if category != Category::Main {
            self.ctx.write_log(category, at, &human)?;
        }
        if let Some(row) = row {
            self.ctx.write_csv(category, &row)?;
        }
        let summary = self.encoders.summarize(snapshot);
        self.ctx.main(Level::Info, &summary);
        self.ctx.console_line(at, &summary);
        Ok(())
    }

    fn record(
        &mut self,
        report: &mut TickReport,
        category: Category,
        result: Result<(), CategoryError>,
    ) {
        match result {
            Ok(()) => report.written.push(category),
            Err(e) => {
                let msg = format!("Error in {category} monitoring: {e}");
                self.ctx.main(Level::Error, &msg);
                if self.ctx.console_enabled() {
                    println!("ERROR: {msg}");
                }
                report.failed.push((category, e.to_string()));
            }
        }
    }

    /// Run one tick. Never fails: per-category errors are reported and recorded.
    pub async fn tick(&mut self) -> TickReport {
        let at = Local::now();
        let mut report = TickReport::default();
        let n = self.process_count;

        let cpu = self.source.sample_cpu(n).map(MetricSnapshot::Cpu);
        let res = cpu.map_err(CategoryError::from).and_then(|s| self.emit(&s, None, &at));
        self.record(&mut report, Category::Cpu, res);

        let mem = self.source.sample_memory(n).map(MetricSnapshot::Memory);
        let res = mem.map_err(CategoryError::from).and_then(|s| self.emit(&s, None, &at));
        self.record(&mut report, Category::Memory, res);

        let disk = self.source.sample_disk().map(MetricSnapshot::Disk);
        let res = disk.map_err(CategoryError::from).and_then(|s| self.emit(&s, None, &at));
        self.record(&mut report, Category::Disk, res);

        // the probe has its own timeout so a hung ping cannot stall the tick
        let ping = self.probe.probe(&self.ping_host, self.ping_timeout).await;

        let net = self.source.sample_network().map(MetricSnapshot::Network);
        let res = net
            .map_err(CategoryError::from)
            .and_then(|s| self.emit(&s, Some(&ping), &at));
        self.record(&mut report, Category::Network, res);

        // ping is summarized on main even when the network row could not be written
        let reach = MetricSnapshot::Reachability(ping.clone());
        if let Err(e) = self.emit(&reach, None, &at) {
            self.record(&mut report, Category::Main, Err(e));
        }
        report.reachability = Some(ping);

        self.ctx.console_separator();
        self.ticks += 1;
        debug!(
            "tick #{} done: {} written, {} failed",
            self.ticks,
            report.written.len(),
            report.failed.len()
        );
        report
    }

    /// Tick every `cfg.interval` until `shutdown` flips to true. The wait between
    /// ticks is the only point where shutdown is observed; a running tick completes.
    pub async fn run(&mut self, cfg: &Config, mut shutdown: watch::Receiver<bool>) {
        self.start(cfg);
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
            if cfg.once {
                break;
            }
            tokio::select! {
                _ = sleep(cfg.interval) => {}
                changed = shutdown.changed() => {
                    // sender dropped counts as shutdown too
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Flush and close every sink.
    pub fn shutdown(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.transition(LoopState::ShuttingDown);
        self.ctx.main(Level::Info, "Monitor stopped");
        self.ctx.close_all();
        self.transition(LoopState::Stopped);
    }
}
