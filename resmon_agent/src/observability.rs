//! Output plumbing built once at startup: one rotating sink per
//! (category, encoding) pair, the main channel and the console switch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::config::LogFormat;
use crate::encode::{csv_header, CSV_TIME_FORMAT};
use crate::error::SinkError;
use crate::sink::{RotatingSink, RotationPolicy};
use crate::types::{Category, Encoding};

pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
pub const SEPARATOR_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

pub fn sink_path(dir: &Path, category: Category, mode: &str, encoding: Encoding) -> PathBuf {
    dir.join(format!("{category}-{mode}.{}", encoding.extension()))
}

pub struct ObservabilityContext {
    console: bool,
    sinks: BTreeMap<(Category, Encoding), RotatingSink>,
}

impl ObservabilityContext {
    /// Open every sink the format enables. Main only ever gets a `.log` file.
    pub fn open(
        dir: &Path,
        mode: &str,
        format: LogFormat,
        console: bool,
        policy: RotationPolicy,
    ) -> Result<Self, SinkError> {
        let mut sinks = BTreeMap::new();
        for category in Category::ALL {
            for &encoding in format.encodings() {
                let header = match encoding {
                    Encoding::Log => None,
                    Encoding::Csv => match csv_header(category) {
                        Some(h) => Some(h),
                        None => continue,
                    },
                };
                let path = sink_path(dir, category, mode, encoding);
                let sink = RotatingSink::open(path, policy, header)?;
                sinks.insert((category, encoding), sink);
            }
        }
        Ok(Self { console, sinks })
    }

    pub fn console_enabled(&self) -> bool {
        self.console
    }

    pub fn has_sink(&self, category: Category, encoding: Encoding) -> bool {
        self.sinks.contains_key(&(category, encoding))
    }

    pub fn sink(&self, category: Category, encoding: Encoding) -> Option<&RotatingSink> {
        self.sinks.get(&(category, encoding))
    }

    /// Main channel record, mirrored to tracing. A failing main file is only reported to tracing.
    pub fn main(&mut self, level: Level, message: &str) {
        match level {
            Level::Info => info!("{message}"),
            Level::Warning => warn!("{message}"),
            Level::Error => error!("{message}"),
        }
        if let Some(sink) = self.sinks.get_mut(&(Category::Main, Encoding::Log)) {
            let line = format!(
                "{} - {} - {message}",
                Local::now().format(LOG_TIME_FORMAT),
                level.as_str()
            );
            if let Err(e) = sink.write_line(&line) {
                warn!("main channel write failed: {e}");
            }
        }
    }

    /// Human line for a category file, prefixed with the record time.
    pub fn write_log(
        &mut self,
        category: Category,
        at: &DateTime<Local>,
        body: &str,
    ) -> Result<(), SinkError> {
        match self.sinks.get_mut(&(category, Encoding::Log)) {
            Some(sink) => sink.write_line(&format!("{} - {body}", at.format(LOG_TIME_FORMAT))),
            None => Ok(()),
        }
    }

    pub fn write_csv(&mut self, category: Category, row: &str) -> Result<(), SinkError> {
        match self.sinks.get_mut(&(category, Encoding::Csv)) {
            Some(sink) => sink.write_line(row),
            None => Ok(()),
        }
    }

    pub fn console_line(&self, at: &DateTime<Local>, summary: &str) {
        if self.console {
            println!("[{}] {summary}", at.format(CSV_TIME_FORMAT));
        }
    }

    pub fn console_separator(&self) {
        if self.console {
            println!("{}", "-".repeat(SEPARATOR_WIDTH));
        }
    }

    /// Flush and sync every sink; errors are reported, not propagated.
    pub fn close_all(&mut self) {
        for sink in self.sinks.values_mut() {
            if let Err(e) = sink.close() {
                warn!("closing {}: {e}", sink.path().display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn both_formats_open_nine_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ObservabilityContext::open(
            dir.path(),
            "host",
            LogFormat::Both,
            false,
            RotationPolicy::default(),
        )
        .unwrap();
        for category in Category::ALL {
            assert!(ctx.has_sink(category, Encoding::Log));
            assert_eq!(ctx.has_sink(category, Encoding::Csv), category != Category::Main);
        }
        assert!(dir.path().join("main-host.log").exists());
        assert!(!dir.path().join("main-host.csv").exists());
        let header = fs::read_to_string(dir.path().join("disk-host.csv")).unwrap();
        assert_eq!(
            header,
            "timestamp,level,read_mb,write_mb,read_count,write_count,per_disk_io\n"
        );
    }

    #[test]
    fn csv_only_has_no_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ObservabilityContext::open(
            dir.path(),
            "container",
            LogFormat::Csv,
            false,
            RotationPolicy::default(),
        )
        .unwrap();
        ctx.main(Level::Info, "not persisted");
        ctx.write_log(Category::Cpu, &Local::now(), "ignored").unwrap();
        assert!(!dir.path().join("main-container.log").exists());
        assert!(!dir.path().join("cpu-container.log").exists());
        assert!(dir.path().join("cpu-container.csv").exists());
    }

    #[test]
    fn main_records_carry_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ObservabilityContext::open(
            dir.path(),
            "m",
            LogFormat::Log,
            false,
            RotationPolicy::default(),
        )
        .unwrap();
        ctx.main(Level::Error, "memory sampling failed: boom");
        ctx.close_all();
        let text = fs::read_to_string(dir.path().join("main-m.log")).unwrap();
        assert!(text.trim_end().ends_with(" - ERROR - memory sampling failed: boom"));
    }
}
