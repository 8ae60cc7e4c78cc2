//! Spawned game-server process handle
//!
//! Narrow process-host contract: start a process, obtain a writable command
//! stream and a readable log stream. Anything beyond that is the process's
//! own business.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// Relative path of the log file inside an instance directory.
const LOG_FILE: &str = "logs/latest.log";

/// A running worker or proxy process.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    stdin: ChildStdin,
    log_path: PathBuf,
}

impl ServerProcess {
    /// Launch `command_line` through the shell with `cwd` as its working
    /// directory. Stdout is discarded; the process is expected to write its
    /// log file under `cwd`.
    pub fn spawn(command_line: &str, cwd: &Path) -> io::Result<Self> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "process stdin unavailable")
        })?;

        Ok(Self {
            child,
            stdin,
            log_path: cwd.join(LOG_FILE),
        })
    }

    /// Write one command line, terminated the way the game servers expect.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\r\n").await?;
        self.stdin.flush().await
    }

    /// Current full contents of the process log file.
    pub fn read_log(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.log_path)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub async fn terminate(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawn_write_terminate() {
        let dir = TempDir::new().unwrap();
        let mut process = ServerProcess::spawn("cat > /dev/null", dir.path()).unwrap();
        process.write_line("say hello").await.unwrap();
        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_log() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join(LOG_FILE), "[INFO] Done\n").unwrap();

        let mut process = ServerProcess::spawn("cat > /dev/null", dir.path()).unwrap();
        assert_eq!(process.read_log().unwrap(), "[INFO] Done\n");
        process.terminate().await.unwrap();
    }
}
