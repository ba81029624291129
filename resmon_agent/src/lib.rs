//! resmon_agent: periodic CPU, memory, disk, network and reachability sampler
//! that persists every category to size-rotated `.log` and `.csv` files.

pub mod config;
pub mod diskstats;
pub mod encode;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod probe;
pub mod ranking;
pub mod sampler;
pub mod sink;
pub mod types;
