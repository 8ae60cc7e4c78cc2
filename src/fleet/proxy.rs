//! Proxy singleton - the front-end routing process all players connect
//! through. Same shape as a worker minus players and port.

use std::path::Path;
use std::time::SystemTime;

use super::{FleetError, FleetResult, LogEntry, WorkerStatus};
use crate::process::ServerProcess;
use crate::protocol::{opcode, Packet};

/// The single front-end routing process.
#[derive(Debug)]
pub struct Proxy {
    pub status: WorkerStatus,
    pub attitude: String,
    pub last_ping: SystemTime,
    pub logs: Vec<LogEntry>,
    pub(crate) outbound: Vec<Packet>,
    process: Option<ServerProcess>,
}

impl Proxy {
    pub fn new() -> Self {
        Self {
            status: WorkerStatus::Hibernating,
            attitude: "Normal".to_string(),
            last_ping: SystemTime::now(),
            logs: Vec::new(),
            outbound: Vec::new(),
            process: None,
        }
    }

    /// Spawn the proxy process in its directory and enter `Loading`.
    pub fn start_up(&mut self, command: &str, dir: &Path) -> FleetResult<()> {
        self.process = Some(ServerProcess::spawn(command, dir)?);
        self.status = WorkerStatus::Loading;
        Ok(())
    }

    /// Write a command line to the proxy process and return the current
    /// contents of its log.
    pub async fn send_command(&mut self, command: &str) -> FleetResult<String> {
        if self.status != WorkerStatus::Running {
            return Err(FleetError::NotRunning {
                operation: "send_command",
                status: self.status,
            });
        }
        let process = self.process.as_mut().ok_or(FleetError::NoProcess)?;
        process.write_line(command).await?;
        Ok(process.read_log()?)
    }

    /// Queue a terminate command, then stop the process directly: the proxy
    /// gets an explicit "end" line and a forced kill rather than waiting
    /// for its next poll.
    pub async fn shutdown(&mut self) -> FleetResult<()> {
        self.outbound.push(Packet::new(opcode::TERMINATE));
        if let Some(process) = self.process.as_mut() {
            process.write_line("end").await?;
            process.terminate().await?;
        }
        Ok(())
    }

    pub fn queued(&self) -> &[Packet] {
        &self.outbound
    }
}

impl Default for Proxy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_proxy() {
        let proxy = Proxy::new();
        assert_eq!(proxy.status, WorkerStatus::Hibernating);
        assert!(proxy.queued().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_without_process_queues_terminate() {
        let mut proxy = Proxy::new();
        proxy.shutdown().await.unwrap();
        assert_eq!(proxy.queued().len(), 1);
        assert_eq!(proxy.queued()[0].opcode(), Some(opcode::TERMINATE));
    }

    #[tokio::test]
    async fn test_send_command_requires_running() {
        let mut proxy = Proxy::new();
        let err = proxy.send_command("alert hello").await.unwrap_err();
        assert!(matches!(err, FleetError::NotRunning { .. }));
    }
}
