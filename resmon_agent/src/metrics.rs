//! Metrics collection using sysinfo (CPU, memory, processes, networks) and
//! /proc/diskstats (disk I/O).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Networks, Process, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};
use tracing::debug;

use crate::diskstats::{read_disk_snapshot, DISKSTATS_PATH};
use crate::error::SampleError;
use crate::ranking::rank_top_n;
use crate::types::{
    Category, CpuSnapshot, DiskSnapshot, MemorySnapshot, NetworkSnapshot, ProcessUsage,
};

const MIB: f64 = 1024.0 * 1024.0;

/// Per-category snapshot providers. Each call reflects the instant it is made.
pub trait MetricsSource {
    /// Establish baselines so the first real CPU sample covers a real interval.
    fn prime(&mut self);
    fn sample_cpu(&mut self, top_n: usize) -> Result<CpuSnapshot, SampleError>;
    fn sample_memory(&mut self, top_n: usize) -> Result<MemorySnapshot, SampleError>;
    fn sample_disk(&mut self) -> Result<DiskSnapshot, SampleError>;
    fn sample_network(&mut self) -> Result<NetworkSnapshot, SampleError>;
}

/// Live provider. Keeps sysinfo handles across ticks so CPU usage is a delta
/// against the previous refresh instead of a blocking measurement.
pub struct SystemSampler {
    sys: System,
    networks: Networks,
    diskstats_path: PathBuf,
}

impl SystemSampler {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            sys: System::new_with_specifics(refresh_kind),
            networks: Networks::new_with_refreshed_list(),
            diskstats_path: PathBuf::from(DISKSTATS_PATH),
        }
    }

    pub fn with_diskstats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.diskstats_path = path.into();
        self
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

// sysinfo may panic on odd /proc contents; confine that to the category.
fn guarded<T>(category: Category, f: impl FnOnce() -> T) -> Result<T, SampleError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|e| {
        let detail = e
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| e.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        SampleError::Panicked { category, detail }
    })
}

// Enumeration sorted by pid so ranking ties resolve by ascending pid.
fn process_table(sys: &System) -> Vec<&Process> {
    let mut procs: Vec<&Process> = sys.processes().values().collect();
    procs.sort_by_key(|p| p.pid());
    procs
}

fn process_name(p: &Process) -> String {
    p.name().to_string_lossy().into_owned()
}

impl MetricsSource for SystemSampler {
    fn prime(&mut self) {
        let primed = guarded(Category::Cpu, || {
            self.sys.refresh_cpu_usage();
            self.sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cpu(),
            );
            self.networks.refresh(true);
        });
        if let Err(e) = primed {
            debug!("priming failed: {e}");
        }
    }

    fn sample_cpu(&mut self, top_n: usize) -> Result<CpuSnapshot, SampleError> {
        let sys = &mut self.sys;
        guarded(Category::Cpu, || {
            sys.refresh_cpu_usage();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cpu(),
            );
        })?;

        let per_core_percent: Vec<f64> =
            sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect();
        if per_core_percent.is_empty() {
            return Err(SampleError::Provider {
                category: Category::Cpu,
                reason: "no cpus reported".into(),
            });
        }
        let top_processes = rank_top_n(process_table(sys), top_n, |p| {
            Some(ProcessUsage {
                pid: p.pid().as_u32() as i32,
                name: process_name(p),
                metric_value: p.cpu_usage() as f64,
                resident_mb: None,
                secondary_value: None,
            })
        });

        Ok(CpuSnapshot {
            aggregate_percent: sys.global_cpu_usage() as f64,
            core_count: per_core_percent.len(),
            per_core_percent,
            top_processes,
        })
    }

    fn sample_memory(&mut self, top_n: usize) -> Result<MemorySnapshot, SampleError> {
        let sys = &mut self.sys;
        guarded(Category::Memory, || {
            sys.refresh_memory();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_memory(),
            );
        })?;

        let total_bytes = sys.total_memory();
        if total_bytes == 0 {
            return Err(SampleError::Provider {
                category: Category::Memory,
                reason: "total memory reported as 0".into(),
            });
        }
        let available_bytes = sys.available_memory();
        let percent =
            total_bytes.saturating_sub(available_bytes) as f64 / total_bytes as f64 * 100.0;

        let top_processes = rank_top_n(process_table(sys), top_n, |p| {
            let rss = p.memory();
            Some(ProcessUsage {
                pid: p.pid().as_u32() as i32,
                name: process_name(p),
                metric_value: rss as f64 / total_bytes as f64 * 100.0,
                resident_mb: Some(rss as f64 / MIB),
                secondary_value: Some(p.virtual_memory() as f64 / MIB),
            })
        });

        Ok(MemorySnapshot {
            total_bytes,
            used_bytes: sys.used_memory(),
            available_bytes,
            percent,
            top_processes,
        })
    }

    fn sample_disk(&mut self) -> Result<DiskSnapshot, SampleError> {
        read_disk_snapshot(&self.diskstats_path)
    }

    fn sample_network(&mut self) -> Result<NetworkSnapshot, SampleError> {
        let networks = &mut self.networks;
        guarded(Category::Network, || networks.refresh(true))?;

        let mut snap = NetworkSnapshot::default();
        for (_, data) in networks.iter() {
            snap.sent_bytes = snap.sent_bytes.saturating_add(data.total_transmitted());
            snap.recv_bytes = snap.recv_bytes.saturating_add(data.total_received());
            snap.packets_sent = snap
                .packets_sent
                .saturating_add(data.total_packets_transmitted());
            snap.packets_recv = snap
                .packets_recv
                .saturating_add(data.total_packets_received());
        }
        Ok(snap)
    }
}
