//! Blocking wrappers around the instrument's ssh/scp access and ICMP reachability.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

use crate::config::InstrumentConfig;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("failed to launch ping: {0}")]
    Launch(#[source] std::io::Error),
    #[error("host {host} did not answer")]
    Unreachable { host: String },
}

/// Copies one remote file into a local directory.
pub trait FileTransfer: Send + Sync {
    fn fetch(&self, remote_path: &str, local_dir: &Path) -> Result<(), TransferError>;
}

pub trait LivenessProbe: Send + Sync {
    fn probe(&self) -> Result<(), LivenessError>;
}

#[derive(Debug, Clone)]
pub struct ScpTransfer {
    host: String,
    login: String,
    ssh_key: PathBuf,
}

impl ScpTransfer {
    pub fn new(host: impl Into<String>, login: impl Into<String>, ssh_key: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            login: login.into(),
            ssh_key: ssh_key.into(),
        }
    }

    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(&config.host, &config.login, &config.ssh_key)
    }
}

impl FileTransfer for ScpTransfer {
    fn fetch(&self, remote_path: &str, local_dir: &Path) -> Result<(), TransferError> {
        let source = format!("{}@{}:{}", self.login, self.host, remote_path);
        debug!(%source, target = %local_dir.display(), "Running scp");
        let output = Command::new("scp")
            .arg("-o")
            .arg(format!("IdentityFile={}", self.ssh_key.display()))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(&source)
            .arg(local_dir)
            .output()
            .map_err(|source| TransferError::Launch {
                program: "scp",
                source,
            })?;
        check_status("scp", output)
    }
}

#[derive(Debug, Clone)]
pub struct PingProbe {
    host: String,
}

impl PingProbe {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(&config.host)
    }
}

impl LivenessProbe for PingProbe {
    fn probe(&self) -> Result<(), LivenessError> {
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        let status = Command::new("ping")
            .args([count_flag, "1"])
            .arg(&self.host)
            .output()
            .map_err(LivenessError::Launch)?
            .status;
        if status.success() {
            Ok(())
        } else {
            Err(LivenessError::Unreachable {
                host: self.host.clone(),
            })
        }
    }
}

fn check_status(program: &'static str, output: Output) -> Result<(), TransferError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(TransferError::Failed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
