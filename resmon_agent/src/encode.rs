//! Snapshot encoders: one human-readable line and one CSV row per snapshot.
//!
//! Both encoders follow the same fixed per-category schema. Compound values
//! (per-core lists, process rankings, per-device maps) become one compact JSON
//! cell; absent optional values render as `N/A`.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::EncodeError;
use crate::types::{
    Category, CpuSnapshot, DiskSnapshot, MemorySnapshot, MetricSnapshot, NetworkSnapshot,
    ProcessUsage, ReachabilitySnapshot,
};

pub const SCHEMA_VERSION: u32 = 1;
pub const PLACEHOLDER: &str = "N/A";
pub const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LEVEL_INFO: &str = "INFO";

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CSV column order per category. Main has no CSV file.
pub fn schema(category: Category) -> Option<&'static [&'static str]> {
    match category {
        Category::Main => None,
        Category::Cpu => Some(&[
            "timestamp",
            "level",
            "cpu_percent",
            "cpu_count",
            "per_cpu",
            "top_processes",
        ]),
        Category::Memory => Some(&[
            "timestamp",
            "level",
            "total_gb",
            "used_gb",
            "available_gb",
            "percent",
            "top_processes",
        ]),
        Category::Disk => Some(&[
            "timestamp",
            "level",
            "read_mb",
            "write_mb",
            "read_count",
            "write_count",
            "per_disk_io",
        ]),
        Category::Network => Some(&[
            "timestamp",
            "level",
            "sent_mb",
            "recv_mb",
            "packets_sent",
            "packets_recv",
            "ping_status",
            "ping_latency",
            "ping_host",
        ]),
    }
}

pub fn csv_header(category: Category) -> Option<String> {
    schema(category).map(|cols| cols.join(","))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Two-decimal rendering without trailing zeros: 40.0 -> "40", 12.345 -> "12.35".
pub fn num(v: f64) -> String {
    format!("{}", round2(v))
}

fn mb(bytes: u64) -> f64 {
    round2(bytes as f64 / MB)
}

fn gb(bytes: u64) -> f64 {
    round2(bytes as f64 / GB)
}

#[derive(Serialize)]
struct CpuProcEntry<'a> {
    pid: i32,
    name: &'a str,
    cpu_percent: f64,
}

#[derive(Serialize)]
struct MemProcEntry<'a> {
    pid: i32,
    name: &'a str,
    rss_mb: Option<f64>,
    vms_mb: Option<f64>,
    percent: f64,
}

#[derive(Serialize)]
struct DiskEntry {
    read_mb: f64,
    write_mb: f64,
    read_count: u64,
    write_count: u64,
}

fn cpu_procs_json(procs: &[ProcessUsage]) -> Result<String, EncodeError> {
    let entries: Vec<CpuProcEntry> = procs
        .iter()
        .map(|p| CpuProcEntry {
            pid: p.pid,
            name: &p.name,
            cpu_percent: round2(p.metric_value),
        })
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

fn mem_procs_json(procs: &[ProcessUsage]) -> Result<String, EncodeError> {
    let entries: Vec<MemProcEntry> = procs
        .iter()
        .map(|p| MemProcEntry {
            pid: p.pid,
            name: &p.name,
            rss_mb: p.resident_mb.map(round2),
            vms_mb: p.secondary_value.map(round2),
            percent: round2(p.metric_value),
        })
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

fn per_core_json(cores: &[f64]) -> Result<String, EncodeError> {
    let rounded: Vec<f64> = cores.iter().copied().map(round2).collect();
    Ok(serde_json::to_string(&rounded)?)
}

fn per_disk_json(disk: &DiskSnapshot) -> Result<String, EncodeError> {
    let map: BTreeMap<&str, DiskEntry> = disk
        .per_device
        .iter()
        .map(|(name, io)| {
            (
                name.as_str(),
                DiskEntry {
                    read_mb: mb(io.read_bytes),
                    write_mb: mb(io.write_bytes),
                    read_count: io.read_ops,
                    write_count: io.write_ops,
                },
            )
        })
        .collect();
    Ok(serde_json::to_string(&map)?)
}

fn ping_fields(ping: Option<&ReachabilitySnapshot>) -> [String; 3] {
    match ping {
        Some(p) => [
            p.status.to_string(),
            p.latency_ms.map(num).unwrap_or_else(|| PLACEHOLDER.into()),
            p.target_host.clone(),
        ],
        None => [PLACEHOLDER.into(), PLACEHOLDER.into(), PLACEHOLDER.into()],
    }
}

fn write_csv_row(fields: &[String]) -> Result<String, EncodeError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(fields)?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| EncodeError::Csv(e.into_error().into()))?;
    let mut row = String::from_utf8(bytes).map_err(|_| EncodeError::Utf8)?;
    if row.ends_with('\n') {
        row.pop();
    }
    Ok(row)
}

/// Encoders parameterized by the configured ranking size, which the summaries quote.
#[derive(Debug, Clone, Copy)]
pub struct EncoderSet {
    top_n: usize,
}

impl EncoderSet {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    fn top_segment(&self, first: Option<&ProcessUsage>) -> String {
        match first {
            Some(p) => format!("Top {}: {} ({}%)", self.top_n, p.name, num(p.metric_value)),
            None => format!("Top {}: {PLACEHOLDER}", self.top_n),
        }
    }

    fn cpu_summary(&self, cpu: &CpuSnapshot) -> String {
        format!(
            "CPU Usage: {}% | Cores: {} | {}",
            num(cpu.aggregate_percent),
            cpu.core_count,
            self.top_segment(cpu.top_processes.first())
        )
    }

    fn memory_summary(&self, mem: &MemorySnapshot) -> String {
        format!(
            "Memory: {}/{} GB | {}% | Available: {} GB | {}",
            gb(mem.used_bytes),
            gb(mem.total_bytes),
            num(mem.percent),
            gb(mem.available_bytes),
            self.top_segment(mem.top_processes.first())
        )
    }

    fn disk_summary(disk: &DiskSnapshot) -> String {
        format!(
            "Disk I/O: Read {} MB ({} ops) | Write {} MB ({} ops)",
            mb(disk.read_bytes),
            disk.read_ops,
            mb(disk.write_bytes),
            disk.write_ops
        )
    }

    fn network_summary(net: &NetworkSnapshot) -> String {
        format!(
            "Network: Sent {} MB ({} pkts) | Recv {} MB ({} pkts)",
            mb(net.sent_bytes),
            net.packets_sent,
            mb(net.recv_bytes),
            net.packets_recv
        )
    }

    fn ping_summary(ping: &ReachabilitySnapshot) -> String {
        let shown = ping
            .latency_ms
            .map(num)
            .unwrap_or_else(|| ping.status.to_string());
        format!(
            "Ping to {}: {} ms - {}",
            ping.target_host,
            shown,
            ping.status.as_str().to_ascii_uppercase()
        )
    }

    /// The one-line console/main-channel summary.
    pub fn summarize(&self, snapshot: &MetricSnapshot) -> String {
        match snapshot {
            MetricSnapshot::Cpu(c) => self.cpu_summary(c),
            MetricSnapshot::Memory(m) => self.memory_summary(m),
            MetricSnapshot::Disk(d) => Self::disk_summary(d),
            MetricSnapshot::Network(n) => Self::network_summary(n),
            MetricSnapshot::Reachability(r) => Self::ping_summary(r),
        }
    }

    /// Summary followed by every schema field. `ping` is only consulted for network.
    pub fn encode_human(
        &self,
        snapshot: &MetricSnapshot,
        ping: Option<&ReachabilitySnapshot>,
    ) -> Result<String, EncodeError> {
        let summary = self.summarize(snapshot);
        let line = match snapshot {
            MetricSnapshot::Cpu(c) => format!(
                "{summary} | per_cpu={} | top_processes={}",
                per_core_json(&c.per_core_percent)?,
                cpu_procs_json(&c.top_processes)?
            ),
            MetricSnapshot::Memory(m) => format!(
                "{summary} | top_processes={}",
                mem_procs_json(&m.top_processes)?
            ),
            MetricSnapshot::Disk(d) => format!("{summary} | per_disk_io={}", per_disk_json(d)?),
            MetricSnapshot::Network(_) => {
                let [status, latency, host] = ping_fields(ping);
                format!(
                    "{summary} | ping_status={status} | ping_latency={latency} | ping_host={host}"
                )
            }
            MetricSnapshot::Reachability(r) => match &r.error_detail {
                Some(detail) => format!("{summary} | error={detail}"),
                None => summary,
            },
        };
        Ok(line)
    }

    /// One CSV row in `schema(category)` order, without the trailing newline.
    /// Reachability has no row of its own: it is carried by the network row.
    pub fn encode_csv(
        &self,
        snapshot: &MetricSnapshot,
        ping: Option<&ReachabilitySnapshot>,
        at: &DateTime<Local>,
    ) -> Result<Option<String>, EncodeError> {
        let mut fields = vec![at.format(CSV_TIME_FORMAT).to_string(), LEVEL_INFO.to_string()];
        match snapshot {
            MetricSnapshot::Cpu(c) => fields.extend([
                num(c.aggregate_percent),
                c.core_count.to_string(),
                per_core_json(&c.per_core_percent)?,
                cpu_procs_json(&c.top_processes)?,
            ]),
            MetricSnapshot::Memory(m) => fields.extend([
                gb(m.total_bytes).to_string(),
                gb(m.used_bytes).to_string(),
                gb(m.available_bytes).to_string(),
                num(m.percent),
                mem_procs_json(&m.top_processes)?,
            ]),
            MetricSnapshot::Disk(d) => fields.extend([
                mb(d.read_bytes).to_string(),
                mb(d.write_bytes).to_string(),
                d.read_ops.to_string(),
                d.write_ops.to_string(),
                per_disk_json(d)?,
            ]),
            MetricSnapshot::Network(n) => {
                fields.extend([
                    mb(n.sent_bytes).to_string(),
                    mb(n.recv_bytes).to_string(),
                    n.packets_sent.to_string(),
                    n.packets_recv.to_string(),
                ]);
                fields.extend(ping_fields(ping));
            }
            MetricSnapshot::Reachability(_) => return Ok(None),
        }
        write_csv_row(&fields).map(Some)
    }
}
