//! Runtime configuration: environment keys with defaults, then CLI overrides.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::types::Encoding;

pub const DEFAULT_LOG_DIR: &str = "/var/log/monitor";
pub const DEFAULT_MODE: &str = "container";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PING_HOST: &str = "8.8.8.8";
pub const DEFAULT_PROCESS_COUNT: usize = 5;

const MIN_PROBE_TIMEOUT_MS: u64 = 100;
const MAX_PROBE_TIMEOUT_MS: u64 = 3_000;

pub const USAGE: &str = "Usage: resmon_agent [--log-dir DIR|-d DIR] [--interval SECS|-i SECS] [--mode NAME|-m NAME] [--format log|csv|both|-f FMT] [--once]\n\
Environment: LOG_DIR MONITOR_MODE MONITOR_INTERVAL PING_HOST PING_TIMEOUT_MS CONSOLE_OUTPUT PROCESS_COUNT LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Log,
    Csv,
    Both,
}

impl LogFormat {
    pub fn encodings(self) -> &'static [Encoding] {
        match self {
            LogFormat::Log => &[Encoding::Log],
            LogFormat::Csv => &[Encoding::Csv],
            LogFormat::Both => &[Encoding::Log, Encoding::Csv],
        }
    }

    pub fn enables(self, encoding: Encoding) -> bool {
        self.encodings().contains(&encoding)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Log => "log",
            LogFormat::Csv => "csv",
            LogFormat::Both => "both",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(LogFormat::Log),
            "csv" => Ok(LogFormat::Csv),
            "both" => Ok(LogFormat::Both),
            _ => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: s.to_string(),
                reason: "expected one of log, csv, both".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_dir: PathBuf,
    pub mode: String,
    pub interval: Duration,
    pub ping_host: String,
    pub ping_timeout: Duration,
    pub console_output: bool,
    pub process_count: usize,
    pub log_format: LogFormat,
    // run a single tick, then shut down
    pub once: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            mode: DEFAULT_MODE.into(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            ping_host: DEFAULT_PING_HOST.into(),
            ping_timeout: DEFAULT_PROBE_TIMEOUT,
            console_output: true,
            process_count: DEFAULT_PROCESS_COUNT,
            log_format: LogFormat::Both,
            once: false,
        }
    }
}

fn parse_interval(key: &'static str, v: &str) -> Result<Duration, ConfigError> {
    match v.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value: v.into(),
            reason: "must be at least 1 second".into(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: v.into(),
            reason: e.to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &'static str, v: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: v.into(),
        reason: e.to_string(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut cfg = Config::default();
        if let Some(v) = get("LOG_DIR") {
            cfg.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MONITOR_MODE") {
            cfg.mode = v;
        }
        if let Some(v) = get("MONITOR_INTERVAL") {
            cfg.interval = parse_interval("MONITOR_INTERVAL", &v)?;
        }
        if let Some(v) = get("PING_HOST") {
            cfg.ping_host = v;
        }
        if let Some(v) = get("PING_TIMEOUT_MS") {
            let ms: u64 = parse_number("PING_TIMEOUT_MS", &v)?;
            cfg.ping_timeout =
                Duration::from_millis(ms.clamp(MIN_PROBE_TIMEOUT_MS, MAX_PROBE_TIMEOUT_MS));
        }
        if let Some(v) = get("CONSOLE_OUTPUT") {
            cfg.console_output = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("PROCESS_COUNT") {
            cfg.process_count = parse_number("PROCESS_COUNT", &v)?;
        }
        if let Some(v) = get("LOG_FORMAT") {
            cfg.log_format = v.parse()?;
        }
        Ok(cfg)
    }

    /// Apply command-line overrides. Returns `Ok(None)` when help was requested.
    pub fn apply_args<I: IntoIterator<Item = String>>(
        mut self,
        args: I,
    ) -> Result<Option<Self>, ConfigError> {
        let mut it = args.into_iter();
        let _ = it.next(); // program name
        while let Some(arg) = it.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| {
                inline
                    .clone()
                    .or_else(|| it.next())
                    .ok_or_else(|| ConfigError::MissingValue(name.to_string()))
            };
            match flag.as_str() {
                "-h" | "--help" => return Ok(None),
                "--once" => self.once = true,
                "--log-dir" | "-d" => self.log_dir = PathBuf::from(value("--log-dir")?),
                "--mode" | "-m" => self.mode = value("--mode")?,
                "--interval" | "-i" => {
                    self.interval = parse_interval("--interval", &value("--interval")?)?
                }
                "--format" | "-f" => self.log_format = value("--format")?.parse()?,
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }
        Ok(Some(self))
    }
}
