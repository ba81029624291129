//! Size-rotated append-only line files.
//!
//! Backups follow the `<path>.1 .. <path>.N` convention, `.1` being the newest.
//! Each sink owns its file handle for the lifetime of the process; the handle
//! is only replaced once a rotation has fully succeeded.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SinkError;

pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_BACKLOG: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_size_bytes: u64,
    pub max_backlog_count: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_backlog_count: DEFAULT_MAX_BACKLOG,
        }
    }
}

pub struct RotatingSink {
    path: PathBuf,
    policy: RotationPolicy,
    // written as the first line of every newly created file (CSV sinks)
    header: Option<String>,
    file: File,
    size: u64,
    rotations: u64,
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}

fn write_all_line(file: &mut File, line: &str) -> io::Result<u64> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)?;
    file.flush()?;
    Ok(buf.len() as u64)
}

pub fn backup_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

impl RotatingSink {
    /// Open `path` for appending. A missing or empty file gets `header` first.
    pub fn open(
        path: impl Into<PathBuf>,
        policy: RotationPolicy,
        header: Option<String>,
    ) -> Result<Self, SinkError> {
        let path = path.into();
        let (mut file, mut size) = open_append(&path).map_err(|source| SinkError::Open {
            path: path.clone(),
            source,
        })?;
        if size == 0 {
            if let Some(h) = header.as_deref() {
                size += write_all_line(&mut file, h).map_err(|source| SinkError::Write {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(Self {
            path,
            policy,
            header,
            file,
            size,
            rotations: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Rotations performed by this sink since it was opened.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Append `line` plus a newline, rotating first if the write would push the
    /// file past `max_size_bytes`. An empty file is never rotated.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let incoming = line.len() as u64 + 1;
        if self.size > 0 && self.size + incoming > self.policy.max_size_bytes {
            self.rotate()?;
        }
        let written = write_all_line(&mut self.file, line).map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.size += written;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        let err = |source| SinkError::Rotate {
            path: self.path.clone(),
            source,
        };
        self.file.flush().map_err(err)?;

        let active_exists = match fs::metadata(&self.path) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(err(e)),
        };
        if !active_exists {
            // already moved aside (earlier reopen failed, or moved externally): reopen only
            debug!("{} missing, reopening without shifting backups", self.path.display());
        } else if self.policy.max_backlog_count == 0 {
            self.file.set_len(0).map_err(err)?;
        } else {
            let oldest = backup_path(&self.path, self.policy.max_backlog_count);
            match fs::remove_file(&oldest) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(err(e)),
            }
            for generation in (1..self.policy.max_backlog_count).rev() {
                let from = backup_path(&self.path, generation);
                if from.exists() {
                    fs::rename(&from, backup_path(&self.path, generation + 1)).map_err(err)?;
                }
            }
            fs::rename(&self.path, backup_path(&self.path, 1)).map_err(err)?;
        }

        let (mut file, mut size) = open_append(&self.path).map_err(err)?;
        if let Some(h) = self.header.as_deref() {
            size += write_all_line(&mut file, h).map_err(err)?;
        }
        self.file = file;
        self.size = size;
        self.rotations += 1;
        debug!("rotated {} (#{})", self.path.display(), self.rotations);
        Ok(())
    }

    /// Flush and sync the handle. The sink stays usable afterwards.
    pub fn close(&mut self) -> Result<(), SinkError> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_all())
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "timestamp,level,value";

    fn policy(max_size_bytes: u64, max_backlog_count: usize) -> RotationPolicy {
        RotationPolicy {
            max_size_bytes,
            max_backlog_count,
        }
    }

    #[test]
    fn new_csv_file_gets_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu-test.csv");
        {
            let mut s = RotatingSink::open(&path, policy(1024, 2), Some(HEADER.into())).unwrap();
            s.write_line("a,INFO,1").unwrap();
        }
        {
            // reopening appends, no second header
            let mut s = RotatingSink::open(&path, policy(1024, 2), Some(HEADER.into())).unwrap();
            s.write_line("b,INFO,2").unwrap();
        }
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{HEADER}\na,INFO,1\nb,INFO,2\n"));
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk-test.csv");
        File::create(&path).unwrap();
        let s = RotatingSink::open(&path, policy(1024, 2), Some(HEADER.into())).unwrap();
        assert_eq!(s.size(), HEADER.len() as u64 + 1);
    }

    #[test]
    fn straddling_the_limit_rotates_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net-test.csv");
        // header is 22 bytes, each row 10; the limit holds the header and 4 rows
        let mut s = RotatingSink::open(&path, policy(22 + 40, 3), Some(HEADER.into())).unwrap();
        for i in 0..5 {
            s.write_line(&format!("r{i},INFO,1")).unwrap();
        }
        assert_eq!(s.rotations(), 1);

        let old = fs::read_to_string(backup_path(&path, 1)).unwrap();
        assert_eq!(old.lines().count(), 5);
        let fresh = fs::read_to_string(&path).unwrap();
        let mut lines = fresh.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(lines.next(), Some("r4,INFO,1"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn backlog_is_bounded_and_oldest_dropped_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory-test.log");
        let backlog = 3;
        // every line is 10 bytes; the limit holds exactly one line
        let mut s = RotatingSink::open(&path, policy(10, backlog), None).unwrap();
        let rotations = backlog + 2;
        for i in 0..=rotations {
            s.write_line(&format!("line-{i:04}")).unwrap();
        }
        assert_eq!(s.rotations(), rotations as u64);

        let mut files: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            ["memory-test.log", "memory-test.log.1", "memory-test.log.2", "memory-test.log.3"]
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "line-0005\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "line-0004\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 3)).unwrap(), "line-0002\n");
    }

    #[test]
    fn missing_active_file_reopens_without_touching_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk-test.log");
        let mut s = RotatingSink::open(&path, policy(10, 3), None).unwrap();
        for i in 0..4 {
            s.write_line(&format!("line-{i:04}")).unwrap();
        }
        assert_eq!(s.rotations(), 3);
        fs::rename(&path, dir.path().join("moved.log")).unwrap();

        // every retry must succeed and keep the backlog intact
        for i in 4..9 {
            s.write_line(&format!("line-{i:04}")).unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "line-0008\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "line-0007\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 2)).unwrap(), "line-0006\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 3)).unwrap(), "line-0005\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("moved.log")).unwrap(),
            "line-0003\n"
        );
    }

    #[test]
    fn missing_active_file_reopen_skips_shift() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net-test.log");
        let mut s = RotatingSink::open(&path, policy(10, 3), None).unwrap();
        for i in 0..4 {
            s.write_line(&format!("line-{i:04}")).unwrap();
        }
        fs::remove_file(&path).unwrap();
        s.write_line("line-0004").unwrap();
        assert_eq!(s.rotations(), 4);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line-0004\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "line-0002\n");
        assert_eq!(fs::read_to_string(backup_path(&path, 3)).unwrap(), "line-0000\n");
    }

    #[test]
    fn zero_backlog_truncates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main-test.log");
        let mut s = RotatingSink::open(&path, policy(10, 0), None).unwrap();
        s.write_line("line-0000").unwrap();
        s.write_line("line-0001").unwrap();
        assert_eq!(s.rotations(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line-0001\n");
        assert!(!backup_path(&path, 1).exists());
    }

    #[test]
    fn oversized_line_goes_to_empty_file_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        let mut s = RotatingSink::open(&path, policy(4, 2), None).unwrap();
        s.write_line("much longer than four bytes").unwrap();
        assert_eq!(s.rotations(), 0);
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cpu.csv");
        let err = RotatingSink::open(&path, RotationPolicy::default(), None).err().unwrap();
        assert!(matches!(err, SinkError::Open { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn rotation_failure_is_reported_and_sink_keeps_writing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("locked");
        fs::create_dir(&sub).unwrap();
        let path = sub.join("cpu.log");
        let mut s = RotatingSink::open(&path, policy(10, 2), None).unwrap();
        s.write_line("line-0000").unwrap();

        fs::set_permissions(&sub, fs::Permissions::from_mode(0o500)).unwrap();
        // root ignores directory permissions; nothing to assert there
        if fs::write(sub.join("probe"), b"x").is_ok() {
            fs::set_permissions(&sub, fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }
        let err = s.write_line("line-0001").unwrap_err();
        assert!(matches!(err, SinkError::Rotate { .. }));
        assert_eq!(s.rotations(), 0);

        fs::set_permissions(&sub, fs::Permissions::from_mode(0o700)).unwrap();
        s.write_line("line-0002").unwrap();
        assert_eq!(s.rotations(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line-0002\n");
    }
}
