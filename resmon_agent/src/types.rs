//! Snapshot types produced once per tick and consumed by the encoders.
//! Keep this module minimal and stable: it defines what ends up on disk.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Output file families. Reachability has no file of its own; it rides on the network row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Main,
    Cpu,
    Memory,
    Disk,
    Network,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Main,
        Category::Cpu,
        Category::Memory,
        Category::Disk,
        Category::Network,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Main => "main",
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Disk => "disk",
            Category::Network => "network",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    Log,
    Csv,
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Log => "log",
            Encoding::Csv => "csv",
        }
    }
}

/// One ranked process entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessUsage {
    pub pid: i32,
    pub name: String,
    // cpu percent, or resident set as percent of total memory
    pub metric_value: f64,
    pub resident_mb: Option<f64>,
    // virtual memory size in MiB
    pub secondary_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuSnapshot {
    pub aggregate_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub core_count: usize,
    pub top_processes: Vec<ProcessUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent: f64,
    pub top_processes: Vec<ProcessUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

// Counters are cumulative since boot, not per-interval deltas; diff consecutive rows for rates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskSnapshot {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub per_device: BTreeMap<String, DeviceIo>,
}

// cumulative totals since boot (consumers should diff to get rates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachStatus {
    Success,
    Failed,
    Error,
}

impl ReachStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReachStatus::Success => "success",
            ReachStatus::Failed => "failed",
            ReachStatus::Error => "error",
        }
    }
}

impl fmt::Display for ReachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilitySnapshot {
    pub status: ReachStatus,
    pub latency_ms: Option<f64>,
    pub target_host: String,
    pub error_detail: Option<String>,
}

impl ReachabilitySnapshot {
    pub fn success(host: &str, latency_ms: f64) -> Self {
        Self {
            status: ReachStatus::Success,
            latency_ms: Some(latency_ms),
            target_host: host.to_string(),
            error_detail: None,
        }
    }

    pub fn failed(host: &str) -> Self {
        Self {
            status: ReachStatus::Failed,
            latency_ms: None,
            target_host: host.to_string(),
            error_detail: None,
        }
    }

    pub fn error(host: &str, detail: impl Into<String>) -> Self {
        Self {
            status: ReachStatus::Error,
            latency_ms: None,
            target_host: host.to_string(),
            error_detail: Some(detail.into()),
        }
    }
}

/// Everything a tick can produce, one variant per category.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSnapshot {
    Cpu(CpuSnapshot),
    Memory(MemorySnapshot),
    Disk(DiskSnapshot),
    Network(NetworkSnapshot),
    Reachability(ReachabilitySnapshot),
}

impl MetricSnapshot {
    /// File family the snapshot is written to. Reachability is summarized on main.
    pub fn category(&self) -> Category {
        match self {
            MetricSnapshot::Cpu(_) => Category::Cpu,
            MetricSnapshot::Memory(_) => Category::Memory,
            MetricSnapshot::Disk(_) => Category::Disk,
            MetricSnapshot::Network(_) => Category::Network,
            MetricSnapshot::Reachability(_) => Category::Main,
        }
    }
}
