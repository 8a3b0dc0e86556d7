//! Wrapper around the `devenv` provisioning CLI.

use std::collections::HashMap;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::virtual_deps::{FLAGSHIP, FLAGSHIP_ALIAS};

/// Snapshot target used when the flagship is not needed.
pub const BASE_TARGET: &str = "base";

/// Picks the provisioning snapshot for a dependency closure.
pub fn snapshot_target<'a, I>(deps: I) -> &'static str
where
    I: IntoIterator<Item = &'a String>,
{
    if deps.into_iter().any(|d| d == FLAGSHIP) {
        FLAGSHIP_ALIAS
    } else {
        BASE_TARGET
    }
}

#[derive(Debug, Deserialize)]
struct DeployedApp {
    name: String,
}

/// Parses `devenv apps list --output json`.
fn parse_app_list(stdout: &[u8]) -> Option<Vec<String>> {
    serde_json::from_slice::<Vec<DeployedApp>>(stdout)
        .ok()
        .map(|apps| apps.into_iter().map(|a| a.name).collect())
}

/// Client for the `devenv` CLI.
#[derive(Debug, Clone)]
pub struct Devenv {
    /// Path to the devenv binary.
    cli_path: String,
    /// Extra environment for every invocation.
    env: HashMap<String, String>,
}

impl Default for Devenv {
    fn default() -> Self {
        Self::new()
    }
}

impl Devenv {
    /// Creates a client for the `devenv` binary on `PATH`.
    pub fn new() -> Self {
        Self {
            cli_path: "devenv".to_string(),
            env: HashMap::new(),
        }
    }

    /// Uses a custom binary path.
    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = cli_path.into();
        self
    }

    /// Adds environment variables passed to every invocation.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("--skip-update").args(args).envs(&self.env);
        cmd
    }

    /// Runs with inherited stdio; a non-zero exit is an error.
    async fn run_inherited(&self, args: &[&str]) -> Result<()> {
        let status = self
            .command(args)
            .status()
            .await
            .map_err(|e| Error::Command {
                program: self.cli_path.clone(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::Command {
                program: format!("{} {}", self.cli_path, args.join(" ")),
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }

    /// Whether an environment already exists.
    pub async fn exists(&self) -> bool {
        self.command(&["status"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Destroys the current environment, ignoring any failure.
    pub async fn destroy(&self) {
        if let Err(e) = self.command(&["destroy"]).status().await {
            tracing::debug!(error = %e, "devenv destroy failed");
        }
    }

    /// Provisions a fresh environment from `target`.
    pub async fn provision(&self, target: &str) -> Result<()> {
        tracing::info!(target = %target, "provisioning devenv");
        self.run_inherited(&["provision", "--snapshot-target", target])
            .await
    }

    /// Names of deployed applications. Any failure reads as "none".
    pub async fn deployed_apps(&self) -> Vec<String> {
        let output = match self
            .command(&["apps", "list", "--output", "json"])
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(o) if o.status.success() => o,
            _ => return Vec::new(),
        };
        parse_app_list(&output.stdout).unwrap_or_default()
    }

    /// Deploys an application by name, or `.` for the current repository.
    pub async fn deploy(&self, app: &str) -> Result<()> {
        self.run_inherited(&["apps", "deploy", app]).await
    }

    /// Destroys any existing environment, provisions `target`, and deploys
    /// every dependency not already present in the snapshot.
    pub async fn provision_new(&self, deps: &[String], target: &str) -> Result<()> {
        self.destroy().await;
        self.provision(target).await?;

        let deployed = self.deployed_apps().await;
        for dep in deps {
            if deployed.iter().any(|a| a == dep) {
                tracing::info!(app = %dep, "app already deployed, skipping");
                continue;
            }

            tracing::info!(app = %dep, "deploying dependency");
            self.deploy(dep).await?;
        }
        Ok(())
    }
}
