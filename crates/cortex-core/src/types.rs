//! Shared data model for the scan execution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Result of a single `(host, port)` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    #[serde(rename = "Open|Filtered")]
    OpenFiltered,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Open => "Open",
            PortState::Closed => "Closed",
            PortState::Filtered => "Filtered",
            PortState::OpenFiltered => "Open|Filtered",
        };
        write!(f, "{s}")
    }
}

/// The scan strategy a task is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Connect,
    Syn,
    Udp,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Connect => "connect",
            Mode::Syn => "syn",
            Mode::Udp => "udp",
        };
        write!(f, "{s}")
    }
}

/// Status of a `ScanTask` as it moves through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A single unit of work handed to a worker: one host, one port.
/// Ephemeral; consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJob {
    pub host: String,
    pub port: u16,
}

/// Outcome of probing one `ScanJob`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub host: String,
    pub port: u16,
    pub state: PortState,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub service: String,
}

impl ScanResult {
    pub fn new(host: impl Into<String>, port: u16, state: PortState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            service: String::new(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

/// The unit driven through the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: Uuid,
    pub status: TaskStatus,
    pub hosts: Vec<String>,
    pub ports: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub results: Vec<ScanResult>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error: String,
}

impl ScanTask {
    /// Creates a new task in `pending` state.
    pub fn new(hosts: Vec<String>, ports: impl Into<String>, mode: Mode) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            hosts,
            ports: ports.into(),
            mode,
            results: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            error: String::new(),
        }
    }

    /// `pending -> running`: clears prior results/error/completed_at.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.results.clear();
        self.error.clear();
        self.completed_at = None;
    }

    /// `running -> completed`.
    pub fn complete(&mut self, results: Vec<ScanResult>) {
        self.results = results;
        self.error.clear();
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// `running -> failed` (or `pending -> failed` for a corrupted task).
    pub fn fail(&mut self, error: impl Into<String>) {
        self.results.clear();
        self.error = error.into();
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}

/// Parses a port expression of the form `"<start>-<end>"`.
///
/// Both sides must be decimal integers in `[0, 65535]` with `start <= end`.
/// A bare number (`"80"`) is accepted as a single-port range.
pub fn parse_port_range(expr: &str) -> Result<(u16, u16)> {
    let expr = expr.trim();
    let (start_s, end_s) = match expr.split_once('-') {
        Some((s, e)) => (s.trim(), e.trim()),
        None => (expr, expr),
    };

    let start: u16 = start_s
        .parse()
        .map_err(|_| Error::PortRange(format!("invalid start port: {start_s:?}")))?;
    let end: u16 = end_s
        .parse()
        .map_err(|_| Error::PortRange(format!("invalid end port: {end_s:?}")))?;

    if start > end {
        return Err(Error::PortRange(format!(
            "start port {start} greater than end port {end}"
        )));
    }

    Ok((start, end))
}
