//! Tunnel process into the developer environment.
//!
//! The tunnel is an external `localizer` process started under `sudo`. It
//! creates a control socket once it is up and reports stability through its
//! `status` subcommand.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::readiness::TunnelStatus;

/// Settings for launching the tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Tunnel binary.
    #[serde(default = "default_program")]
    pub program: String,
    /// Whether to run the tunnel through `sudo`.
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
    /// Control socket created once the process is up.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

fn default_program() -> String {
    "localizer".to_string()
}

fn default_use_sudo() -> bool {
    true
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/localizer.sock")
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            use_sudo: default_use_sudo(),
            socket_path: default_socket_path(),
        }
    }
}

/// Output of `localizer status --output json`.
#[derive(Debug, Clone, Deserialize)]
struct StatusReport {
    #[serde(default)]
    stable: bool,
}

/// Parses a tunnel status report.
fn parse_status(stdout: &[u8]) -> Result<bool> {
    serde_json::from_slice::<StatusReport>(stdout)
        .map(|r| r.stable)
        .map_err(|e| Error::StatusCheckFailed(format!("invalid status output: {}", e)))
}

/// A running tunnel process.
pub struct Tunnel {
    config: TunnelConfig,
    child: Mutex<Option<Child>>,
}

impl Tunnel {
    /// Runs `sudo true` so the password prompt happens in the foreground.
    pub async fn prewarm_sudo() -> Result<()> {
        let status = Command::new("sudo")
            .arg("true")
            .status()
            .await
            .map_err(|e| Error::Command {
                program: "sudo".to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::Command {
                program: "sudo".to_string(),
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }

    /// Spawns the tunnel process.
    pub async fn start(config: TunnelConfig) -> Result<Self> {
        if config.use_sudo {
            Self::prewarm_sudo().await?;
        }

        tracing::info!(program = %config.program, "starting tunnel");
        let child = Self::command(&config, &[])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Command {
                program: config.program.clone(),
                reason: format!("failed to spawn: {}", e),
            })?;

        Ok(Self {
            config,
            child: Mutex::new(Some(child)),
        })
    }

    fn command(config: &TunnelConfig, args: &[&str]) -> Command {
        let mut cmd = if config.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("--preserve-env").arg(&config.program);
            cmd
        } else {
            Command::new(&config.program)
        };
        cmd.args(args);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Self::command(&self.config, args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Command {
                program: self.config.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Command {
                program: format!("{} {}", self.config.program, args.join(" ")),
                reason: stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl TunnelStatus for Tunnel {
    async fn is_running(&self) -> Result<bool> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Some(status) = child.try_wait()? {
                *guard = None;
                return Err(Error::StatusCheckFailed(format!(
                    "tunnel exited early with {}",
                    status
                )));
            }
        }
        Ok(self.config.socket_path.exists())
    }

    async fn is_stable(&self) -> Result<bool> {
        let stdout = self
            .run(&["status", "--output", "json"])
            .await
            .map_err(|e| Error::StatusCheckFailed(e.to_string()))?;
        parse_status(&stdout)
    }

    async fn shutdown(&self) -> Result<()> {
        let requested = self.run(&["kill"]).await;

        if let Some(mut child) = self.child.lock().await.take() {
            if requested.is_ok() {
                let _ = child.wait().await;
            } else {
                let _ = child.kill().await;
            }
        }

        requested.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_report_parses_stable_flag() {
        assert!(parse_status(br#"{"stable": true}"#).unwrap());
        assert!(!parse_status(br#"{"stable": false, "services": 3}"#).unwrap());
        assert!(!parse_status(b"{}").unwrap());
    }

    #[test]
    fn garbage_status_is_status_check_failure() {
        let err = parse_status(b"not json").unwrap_err();
        assert!(matches!(err, Error::StatusCheckFailed(_)));
    }

    #[test]
    fn tunnel_config_defaults_to_sudo_localizer() {
        let config = TunnelConfig::default();
        assert_eq!(config.program, "localizer");
        assert!(config.use_sudo);
    }

    #[test]
    fn command_wraps_program_in_sudo() {
        let cmd = Tunnel::command(&TunnelConfig::default(), &["kill"]);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "sudo");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["--preserve-env", "localizer", "kill"]);
    }

    #[test]
    fn command_runs_program_directly_without_sudo() {
        let config = TunnelConfig {
            use_sudo: false,
            ..Default::default()
        };
        let cmd = Tunnel::command(&config, &["status"]);
        assert_eq!(cmd.as_std().get_program(), "localizer");
    }
}
