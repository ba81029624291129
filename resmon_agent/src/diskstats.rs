//! Disk I/O counters from /proc/diskstats.
//!
//! Format: major minor name reads_completed reads_merged sectors_read ms_reading
//! writes_completed writes_merged sectors_written ms_writing ...
//! Sectors are always 512 bytes here, independent of the device's block size.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::SampleError;
use crate::types::{DeviceIo, DiskSnapshot};

pub const DISKSTATS_PATH: &str = "/proc/diskstats";
const SECTOR_BYTES: u64 = 512;

/// Parse diskstats content into per-device cumulative counters.
/// Loop and ram devices are skipped, as are malformed lines.
pub fn parse_diskstats(content: &str) -> BTreeMap<String, DeviceIo> {
    let mut out = BTreeMap::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }
        let device = parts[2];
        if device.starts_with("loop") || device.starts_with("ram") {
            continue;
        }
        let field = |i: usize| parts[i].parse::<u64>().unwrap_or(0);
        out.insert(
            device.to_string(),
            DeviceIo {
                read_ops: field(3),
                read_bytes: field(5).saturating_mul(SECTOR_BYTES),
                write_ops: field(7),
                write_bytes: field(9).saturating_mul(SECTOR_BYTES),
            },
        );
    }
    out
}

/// Fold per-device counters into a snapshot. Totals only count devices for which
/// `is_whole_disk` holds, so partitions are not added twice; if none qualify every
/// device is counted.
pub fn summarize<F>(per_device: BTreeMap<String, DeviceIo>, is_whole_disk: F) -> DiskSnapshot
where
    F: Fn(&str) -> bool,
{
    let whole: Vec<&DeviceIo> = per_device
        .iter()
        .filter(|(name, _)| is_whole_disk(name))
        .map(|(_, io)| io)
        .collect();
    let counted: Vec<&DeviceIo> = if whole.is_empty() {
        per_device.values().collect()
    } else {
        whole
    };

    let mut snap = DiskSnapshot::default();
    for io in counted {
        snap.read_bytes = snap.read_bytes.saturating_add(io.read_bytes);
        snap.write_bytes = snap.write_bytes.saturating_add(io.write_bytes);
        snap.read_ops = snap.read_ops.saturating_add(io.read_ops);
        snap.write_ops = snap.write_ops.saturating_add(io.write_ops);
    }
    snap.per_device = per_device;
    snap
}

// /sys/block lists whole disks only; names with '/' appear there with '!'.
fn sys_block_has(name: &str) -> bool {
    Path::new("/sys/block").join(name.replace('/', "!")).exists()
}

pub fn read_disk_snapshot(path: &Path) -> Result<DiskSnapshot, SampleError> {
    let content = fs::read_to_string(path).map_err(|source| SampleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(summarize(parse_diskstats(&content), sys_block_has))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
   7       0 loop0 57 0 2222 10 0 0 0 0 0 24 10 0 0 0 0 0 0
   8       0 sda 1000 10 20000 500 400 30 8000 900 0 1200 1400 0 0 0 0 0 0
   8       1 sda1 900 10 18000 450 390 30 7800 880 0 1100 1330 0 0 0 0 0 0
 259       0 nvme0n1 50 0 4000 20 10 0 160 5 0 30 25 0 0 0 0 0 0
   1       0 ram0 0 0 0 0 0 0 0 0 0 0 0
short line
";

    #[test]
    fn parses_devices_and_skips_loop_ram() {
        let devs = parse_diskstats(SAMPLE);
        assert_eq!(devs.len(), 3);
        assert!(!devs.contains_key("loop0"));
        let sda = devs["sda"];
        assert_eq!(sda.read_ops, 1000);
        assert_eq!(sda.read_bytes, 20000 * 512);
        assert_eq!(sda.write_ops, 400);
        assert_eq!(sda.write_bytes, 8000 * 512);
    }

    #[test]
    fn totals_skip_partitions() {
        let snap = summarize(parse_diskstats(SAMPLE), |n| n == "sda" || n == "nvme0n1");
        assert_eq!(snap.read_ops, 1050);
        assert_eq!(snap.write_bytes, (8000 + 160) * 512);
        assert_eq!(snap.per_device.len(), 3);
    }

    #[test]
    fn totals_fall_back_to_all_devices() {
        let snap = summarize(parse_diskstats(SAMPLE), |_| false);
        assert_eq!(snap.read_ops, 1950);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_disk_snapshot(Path::new("/nonexistent/diskstats")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/diskstats"));
    }
}
