// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Compute process lifecycle management.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use crate::core::error::{BridgeError, Result};

/// Name of the compute process binary.
pub const RUNTIME_BINARY: &str = "simbridge-runtime";

/// How to launch the compute process.
#[derive(Debug, Clone)]
pub struct ComputeProcessConfig {
    /// Binary to run. Defaults to `simbridge-runtime` on `PATH`.
    pub program: PathBuf,
    /// iceoryx2 service prefix for the control channel.
    pub service: String,
    pub log_file: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub shutdown_timeout: Duration,
}

impl ComputeProcessConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from(RUNTIME_BINARY),
            service: service.into(),
            log_file: None,
            home: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The command line `spawn` runs.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("--service").arg(&self.service);
        if let Some(log_file) = &self.log_file {
            command.arg("--log-file").arg(log_file);
        }
        if let Some(home) = &self.home {
            command.arg("--home").arg(home);
        }
        command
    }
}

/// Handle to a running compute process.
///
/// The process ends on its own once the control channel is closed (feed
/// mode) or the rendezvous word reads shutdown (lock mode); `shutdown` only
/// waits for that and kills it if it does not happen in time.
pub struct ComputeProcess {
    child: Child,
    service: String,
    shutdown_timeout: Duration,
}

impl ComputeProcess {
    pub fn spawn(config: &ComputeProcessConfig) -> Result<Self> {
        let child = config.command().spawn().map_err(|e| {
            BridgeError::Configuration(format!(
                "Failed to spawn compute process '{}': {}",
                config.program.display(),
                e
            ))
        })?;

        tracing::info!(
            "Spawned compute process for service '{}' with PID {}",
            config.service,
            child.id()
        );

        Ok(Self {
            child,
            service: config.service.clone(),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            BridgeError::Configuration(format!(
                "Failed to check compute process '{}' status: {}",
                self.service, e
            ))
        })
    }

    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().map_err(|e| {
            BridgeError::Configuration(format!(
                "Failed to wait for compute process '{}': {}",
                self.service, e
            ))
        })
    }

    pub fn kill(&mut self) -> Result<()> {
        tracing::warn!("Force killing compute process '{}'", self.service);
        self.child.kill().map_err(|e| {
            BridgeError::Configuration(format!(
                "Failed to kill compute process '{}': {}",
                self.service, e
            ))
        })
    }

    /// Wait up to the configured timeout for a clean exit, then kill.
    pub fn shutdown(&mut self) -> Result<ExitStatus> {
        let timeout = self.shutdown_timeout;
        let start = Instant::now();

        while start.elapsed() < timeout {
            if let Some(status) = self.try_wait()? {
                tracing::info!(
                    "Compute process '{}' exited with status: {:?}",
                    self.service,
                    status
                );
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::warn!(
            "Compute process '{}' did not exit within {:?}, force killing",
            self.service,
            timeout
        );
        self.kill()?;
        self.wait()
    }
}

impl Drop for ComputeProcess {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!(
                "ComputeProcess for '{}' dropped while still running, killing",
                self.service
            );
            self.kill().ok();
            self.child.wait().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let config = ComputeProcessConfig::new("simbridge/run-1")
            .with_log_file("/tmp/compute.log")
            .with_home("/tmp/home");
        let command = config.command();
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(command.get_program(), RUNTIME_BINARY);
        assert_eq!(
            args,
            vec![
                "--service",
                "simbridge/run-1",
                "--log-file",
                "/tmp/compute.log",
                "--home",
                "/tmp/home"
            ]
        );
    }

    #[test]
    fn test_spawn_missing_binary_is_configuration_error() {
        let config = ComputeProcessConfig::new("svc").with_program("/nonexistent/simbridge-runtime");
        let err = ComputeProcess::spawn(&config).err().unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_kills_after_timeout() {
        let child = Command::new("sh").arg("-c").arg("sleep 30").spawn().unwrap();
        let mut process = ComputeProcess {
            child,
            service: "svc".into(),
            shutdown_timeout: Duration::from_millis(50),
        };
        assert!(process.is_running());
        let status = process.shutdown().unwrap();
        assert!(!status.success());
        assert!(!process.is_running());
    }
}
