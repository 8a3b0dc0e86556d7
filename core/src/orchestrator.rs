//! End-to-end run orchestration.
//!
//! Sequences a full run: tag scan, dependency resolution, provisioning,
//! deployment, environment configuration, tunnel, and the test script.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::E2EConfig;
use crate::devenv::{snapshot_target, Devenv};
use crate::error::{Error, Result};
use crate::fetcher::{GitFetcher, RemoteFetcher};
use crate::manifest::{self, Manifest};
use crate::readiness::ReadinessPoller;
use crate::resolver::{DependencyResolver, Resolution};
use crate::scan::{self, TEST_TAGS};
use crate::tunnel::Tunnel;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No end-to-end tests were found.
    Skipped,
    /// The test script ran and exited successfully.
    Passed {
        /// Resolved dependency closure.
        dependencies: Vec<String>,
        /// Snapshot target used for provisioning.
        target: String,
    },
}

/// Runs end-to-end tests for one repository.
pub struct E2EOrchestrator {
    config: E2EConfig,
    repo_dir: PathBuf,
}

impl E2EOrchestrator {
    /// Creates an orchestrator for the repository at `repo_dir`.
    pub fn new(config: E2EConfig, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            repo_dir: repo_dir.into(),
        }
    }

    /// Name the repository is known by as a dependency.
    ///
    /// The configured `root_name` wins over the checkout directory name.
    pub fn repo_name(&self) -> String {
        if let Some(name) = self.config.root_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.repo_dir
            .canonicalize()
            .unwrap_or_else(|_| self.repo_dir.clone())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Loads the repository's own manifest. Absence is fatal here.
    pub fn root_manifest(&self) -> Result<Manifest> {
        let (manifest, file) = manifest::load_from(self.repo_dir.as_path())?;
        tracing::debug!(file = %file, "loaded root manifest");
        Ok(manifest)
    }

    /// Resolves the repository's dependency closure.
    pub async fn resolve_dependencies<F: RemoteFetcher>(
        &self,
        resolver: &DependencyResolver<F>,
        cancel: &CancellationToken,
    ) -> Result<(Manifest, Resolution)> {
        let root = self.root_manifest()?;
        tracing::info!("building dependency tree");
        let resolution = resolver.resolve(&self.repo_name(), &root, cancel).await?;
        Ok((root, resolution))
    }

    fn resolver(&self) -> DependencyResolver<GitFetcher> {
        let fetcher = GitFetcher::new(&self.config.source.host, &self.config.source.owner)
            .with_token(self.config.git_token());
        DependencyResolver::new(fetcher, self.config.virtual_table())
    }

    fn devenv(&self) -> Devenv {
        Devenv::new()
            .with_cli_path(&self.config.devenv_path)
            .with_env(self.config.child_env())
    }

    /// Performs a full run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome> {
        if !scan::should_run_e2e(&self.repo_dir)? {
            tracing::info!("found no occurrences of or_e2e build tags, skipping e2e tests");
            return Ok(RunOutcome::Skipped);
        }

        let (root, resolution) = self.resolve_dependencies(&self.resolver(), cancel).await?;
        let dependencies = resolution.to_vec();
        let target = snapshot_target(&dependencies);
        tracing::info!(deps = ?dependencies, target = %target, "provisioning devenv");

        let devenv = self.devenv();
        if self.config.skip_provision {
            tracing::info!("skipping devenv provisioning");
        } else if !devenv.exists().await {
            devenv.provision_new(&dependencies, target).await?;
        } else {
            tracing::info!(
                "re-using existing cluster, this may lead to a non-reproducible failure/success. \
                 To ensure a clean operation, run `devenv destroy` before running tests"
            );
        }

        // Libraries have nothing to deploy.
        if root.service {
            tracing::info!("deploying current application into cluster");
            devenv.deploy(".").await?;
        }

        tracing::info!("running devconfig");
        self.run_script(&self.config.scripts.devconfig, &HashMap::new(), cancel)
            .await?;

        if self.config.skip_localizer {
            self.run_tests(cancel).await?;
        } else {
            let tunnel = Tunnel::start(self.config.tunnel.clone()).await?;
            let mut poller = ReadinessPoller::new(self.config.readiness);
            poller
                .gated(&tunnel, cancel, || self.run_tests(cancel))
                .await?;
        }

        Ok(RunOutcome::Passed {
            dependencies,
            target: target.to_string(),
        })
    }

    async fn run_tests(&self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!("running e2e tests");
        let env = HashMap::from([("TEST_TAGS".to_string(), TEST_TAGS.to_string())]);
        self.run_script(&self.config.scripts.test, &env, cancel).await
    }

    /// Runs a script from the repository root with inherited stdio.
    async fn run_script(
        &self,
        script: &Path,
        env: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let program = script.display().to_string();
        let mut child = Command::new(self.repo_dir.join(script))
            .current_dir(&self.repo_dir)
            .envs(self.config.child_env())
            .envs(env)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Command {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            status = child.wait() => status?,
        };

        if !status.success() {
            return Err(Error::Command {
                program,
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn repo_name_is_directory_name() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("accounts");
        std::fs::create_dir(&repo).unwrap();

        let orchestrator = E2EOrchestrator::new(E2EConfig::default(), &repo);
        assert_eq!(orchestrator.repo_name(), "accounts");
    }

    #[test]
    fn configured_root_name_overrides_directory() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("workspace");
        std::fs::create_dir(&repo).unwrap();

        let config = E2EConfig {
            root_name: Some("accounts".to_string()),
            ..Default::default()
        };
        let orchestrator = E2EOrchestrator::new(config, &repo);
        assert_eq!(orchestrator.repo_name(), "accounts");
    }

    #[tokio::test]
    async fn root_name_excludes_root_from_closure() {
        use crate::fetcher::FetchedSource;
        use crate::virtual_deps::VirtualDependencyTable;
        use async_trait::async_trait;

        struct CycleFetcher;

        #[async_trait]
        impl RemoteFetcher for CycleFetcher {
            async fn fetch(&self, name: &str, _cancel: &CancellationToken) -> Result<FetchedSource> {
                assert_eq!(name, "mint", "unexpected fetch of '{}'", name);
                Ok(FetchedSource::InMemory {
                    name: name.to_string(),
                    files: HashMap::from([(
                        "devenv.yaml".to_string(),
                        "dependencies:\n  required: [accounts]\n".to_string(),
                    )]),
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("workspace");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join("devenv.yaml"), "dependencies:\n  required: [mint]\n").unwrap();

        let config = E2EConfig {
            root_name: Some("accounts".to_string()),
            ..Default::default()
        };
        let orchestrator = E2EOrchestrator::new(config, &repo);
        let resolver = DependencyResolver::new(CycleFetcher, VirtualDependencyTable::new());

        let (_, resolution) = orchestrator
            .resolve_dependencies(&resolver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.to_vec(), vec!["mint"]);
    }

    #[test]
    fn missing_root_manifest_is_fatal() {
        let dir = TempDir::new().unwrap();
        let orchestrator = E2EOrchestrator::new(E2EConfig::default(), dir.path());
        assert!(orchestrator.root_manifest().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn run_skips_repositories_without_e2e_tests() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("devenv.yaml"), "service: true\n").unwrap();
        std::fs::write(dir.path().join("a_test.go"), "package a\n").unwrap();

        let orchestrator = E2EOrchestrator::new(E2EConfig::default(), dir.path());
        let outcome = orchestrator.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
    }

    #[tokio::test]
    async fn failing_script_is_command_error() {
        let dir = TempDir::new().unwrap();
        let orchestrator = E2EOrchestrator::new(E2EConfig::default(), dir.path());

        let err = orchestrator
            .run_script(
                Path::new("does-not-exist.sh"),
                &HashMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }
}
