//! Reachability probe: one `ping` per tick, bounded by its own timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::types::ReachabilitySnapshot;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[allow(async_fn_in_trait)]
pub trait Probe {
    /// Never fails: spawn, timeout and I/O problems resolve to the `error` status.
    async fn probe(&self, host: &str, timeout: Duration) -> ReachabilitySnapshot;
}

/// Runs the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
}

impl PingProbe {
    pub fn new() -> Self {
        Self {
            program: "ping".into(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for PingProbe {
    async fn probe(&self, host: &str, limit: Duration) -> ReachabilitySnapshot {
        // -W is ping's own reply wait; the outer timeout bounds the whole subprocess.
        let wait_secs = limit.as_secs().max(1).to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(["-c", "1", "-W", &wait_secs, host])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ReachabilitySnapshot::error(host, e.to_string()),
            Err(_) => {
                return ReachabilitySnapshot::error(
                    host,
                    format!("timed out after {}ms", limit.as_millis()),
                )
            }
        };

        if !output.status.success() {
            debug!("ping {host} exited with {}", output.status);
            return ReachabilitySnapshot::failed(host);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_latency(&stdout) {
            Some(ms) => ReachabilitySnapshot::success(host, ms),
            None => ReachabilitySnapshot::failed(host),
        }
    }
}

/// Find `time=12.3 ms` (or `time<1ms`) in ping output and return the number of milliseconds.
pub fn parse_latency(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let idx = line.find("time=").or_else(|| line.find("time<"))?;
        let rest = &line[idx + 5..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        rest[..end].parse::<f64>().ok()
    })
}
