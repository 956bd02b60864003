//! Core types, error handling, configuration, and the probe catalogue
//! loader for the Cortex scan execution engine.

pub mod config;
pub mod error;
pub mod probe;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use probe::{LoadStats, Match, Probe, ProbeCatalogue, Protocol};
pub use types::{parse_port_range, Mode, PortState, ScanJob, ScanResult, ScanTask, TaskStatus};
