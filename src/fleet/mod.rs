//! Fleet module - Worker and proxy entities and the registry that owns them
//!
//! Provides:
//! - Worker descriptors with lifecycle state and per-worker command queues
//! - The proxy singleton descriptor
//! - The registry funneling all entity and queue mutation

mod proxy;
mod registry;
mod worker;

pub use proxy::*;
pub use registry::*;
pub use worker::*;

use std::fmt;

use thiserror::Error;

use crate::materialize::MaterializeError;
use crate::ports::PortError;

/// Fleet errors
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("unsupported operation: {operation} requires status RUNNING (current: {status})")]
    NotRunning {
        operation: &'static str,
        status: WorkerStatus,
    },

    #[error("no process attached")]
    NoProcess,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("port allocation failed: {0}")]
    Port(#[from] PortError),

    #[error("materialization failed: {0}")]
    Materialize(#[from] MaterializeError),
}

pub type FleetResult<T> = Result<T, FleetError>;

/// Lifecycle states of a managed entity.
///
/// Transitions are monotonic except for re-registration (any state back to
/// `Running`) and teardown (any state to `Stopped`, which also removes the
/// worker from the registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Hibernating,
    Setup,
    Loading,
    Running,
    Stopped,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Hibernating => "HIBERNATING",
            WorkerStatus::Setup => "SETUP",
            WorkerStatus::Loading => "LOADING",
            WorkerStatus::Running => "RUNNING",
            WorkerStatus::Stopped => "STOPPED",
        };
        write!(f, "{}", s)
    }
}

/// Severity of a log entry or operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Wire mapping: 0 is info, 1 is warning, anything else is error.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => LogLevel::Info,
            1 => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}
