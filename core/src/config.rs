//! Orchestrator configuration.
//!
//! Settings come from an optional `.e2e.yaml` in the repository root and are
//! then overridden by environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::readiness::ReadinessConfig;
use crate::tunnel::TunnelConfig;
use crate::virtual_deps::{invalid_name_reason, VirtualDependencyTable};

/// Default location of the settings file.
pub const CONFIG_FILE: &str = ".e2e.yaml";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Where dependency repositories live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Git host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Organization owning every dependency repository.
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Environment variable holding an HTTPS access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_host() -> String {
    "github.com".to_string()
}

fn default_owner() -> String {
    "getoutreach".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            owner: default_owner(),
            token_env: default_token_env(),
        }
    }
}

/// Vault endpoints handed to child processes as `VAULT_ADDR`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Address used on developer machines.
    #[serde(default)]
    pub address: Option<String>,
    /// Address used in CI.
    #[serde(default)]
    pub address_ci: Option<String>,
}

/// Scripts run after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Configures the environment for the repository.
    #[serde(default = "default_devconfig")]
    pub devconfig: PathBuf,
    /// Runs the test suite.
    #[serde(default = "default_test")]
    pub test: PathBuf,
}

fn default_devconfig() -> PathBuf {
    PathBuf::from(".bootstrap/shell/devconfig.sh")
}

fn default_test() -> PathBuf {
    PathBuf::from(".bootstrap/shell/test.sh")
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            devconfig: default_devconfig(),
            test: default_test(),
        }
    }
}

/// Top-level orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct E2EConfig {
    /// Dependency source location.
    #[serde(default)]
    pub source: SourceConfig,

    /// Extra or overriding virtual dependency lists.
    #[serde(default)]
    pub virtual_dependencies: HashMap<String, Vec<String>>,

    /// Readiness polling intervals.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Tunnel process settings.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Vault addresses.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Post-provision scripts.
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Name of this repository as a dependency. Defaults to the checkout
    /// directory name, which CI checkouts often do not match.
    #[serde(default)]
    pub root_name: Option<String>,

    /// Path to the devenv binary.
    #[serde(default = "default_devenv_path")]
    pub devenv_path: String,

    /// Skip provisioning entirely (`SKIP_DEVENV_PROVISION`).
    #[serde(default)]
    pub skip_provision: bool,

    /// Skip starting the tunnel (`SKIP_LOCALIZER`).
    #[serde(default)]
    pub skip_localizer: bool,

    /// Running in CI (`CI`).
    #[serde(default)]
    pub ci: bool,
}

fn default_devenv_path() -> String {
    "devenv".to_string()
}

impl Default for E2EConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            virtual_dependencies: HashMap::new(),
            readiness: ReadinessConfig::default(),
            tunnel: TunnelConfig::default(),
            vault: VaultConfig::default(),
            scripts: ScriptsConfig::default(),
            root_name: None,
            devenv_path: default_devenv_path(),
            skip_provision: false,
            skip_localizer: false,
            ci: false,
        }
    }
}

fn is_true(value: Option<String>) -> Option<bool> {
    value.map(|v| v == "true")
}

impl E2EConfig {
    /// Loads settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.as_ref().display(), e)))
    }

    /// Loads settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(skip) = is_true(lookup("SKIP_DEVENV_PROVISION")) {
            self.skip_provision = skip;
        }
        if let Some(skip) = is_true(lookup("SKIP_LOCALIZER")) {
            self.skip_localizer = skip;
        }
        if let Some(ci) = is_true(lookup("CI")) {
            self.ci = ci;
        }
        self
    }

    /// Applies overrides from the process environment.
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Vault address for this run, if configured.
    pub fn vault_addr(&self) -> Option<&str> {
        if self.ci {
            self.vault
                .address_ci
                .as_deref()
                .or(self.vault.address.as_deref())
        } else {
            self.vault.address.as_deref()
        }
    }

    /// Environment passed to every child process.
    pub fn child_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(addr) = self.vault_addr() {
            env.insert("VAULT_ADDR".to_string(), addr.to_string());
        }
        env
    }

    /// Access token for dependency fetches, read from the configured variable.
    pub fn git_token(&self) -> Option<String> {
        std::env::var(&self.source.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    /// Built-in virtual dependencies with configured overrides applied.
    pub fn virtual_table(&self) -> VirtualDependencyTable {
        VirtualDependencyTable::builtin().extended(&self.virtual_dependencies)
    }
}

impl Validate for E2EConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.source.host.trim().is_empty() {
            result.add_error("source.host cannot be empty");
        }
        if self.source.owner.trim().is_empty() {
            result.add_error("source.owner cannot be empty");
        }

        for (name, deps) in &self.virtual_dependencies {
            if name.trim().is_empty() {
                result.add_error("virtual_dependencies contains an empty name");
            }
            if deps.iter().any(|d| d == name) {
                result.add_warning(format!("virtual dependency '{}' lists itself", name));
            }
        }

        if self.readiness.appear_interval.is_zero() || self.readiness.stable_interval.is_zero() {
            result.add_error("readiness intervals must be greater than zero");
        }
        if self.readiness.appear_interval > self.readiness.stable_interval {
            result.add_warning("readiness.appear_interval is longer than stable_interval");
        }
        if self.readiness.cleanup_timeout < Duration::from_secs(1) {
            result.add_warning("readiness.cleanup_timeout under 1 second may leave the tunnel running");
        }

        if let Some(name) = &self.root_name {
            if let Some(reason) = invalid_name_reason(name) {
                result.add_error(format!("root_name '{}': {}", name, reason));
            }
        }

        if self.tunnel.program.trim().is_empty() {
            result.add_error("tunnel.program cannot be empty");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let result = E2EConfig::default().validate();
        assert!(result.is_valid(), "errors: {:?}", result.errors);
    }

    #[test]
    fn config_parses_partial_yaml() {
        let yaml = r#"
source:
  owner: acme
virtual_dependencies:
  flagship: [mint, giraffe]
skip_localizer: true
root_name: accounts
"#;
        let config: E2EConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.root_name.as_deref(), Some("accounts"));
        assert_eq!(config.source.owner, "acme");
        assert_eq!(config.source.host, "github.com");
        assert!(config.skip_localizer);
        assert_eq!(
            config.virtual_table().lookup("outreach").unwrap(),
            &["mint".to_string(), "giraffe".to_string()]
        );
    }

    #[test]
    fn load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = E2EConfig::load_or_default(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, E2EConfig::default());
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "source: [").unwrap();
        assert!(matches!(E2EConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_require_literal_true() {
        let config = E2EConfig::default().with_env_overrides(env_of(&[
            ("SKIP_DEVENV_PROVISION", "true"),
            ("SKIP_LOCALIZER", "1"),
        ]));
        assert!(config.skip_provision);
        assert!(!config.skip_localizer);
    }

    #[test]
    fn vault_addr_prefers_ci_address_in_ci() {
        let mut config = E2EConfig::default();
        config.vault = VaultConfig {
            address: Some("https://vault.local".to_string()),
            address_ci: Some("https://vault.ci".to_string()),
        };
        assert_eq!(config.vault_addr(), Some("https://vault.local"));

        let config = config.with_env_overrides(env_of(&[("CI", "true")]));
        assert_eq!(config.vault_addr(), Some("https://vault.ci"));
        assert_eq!(
            config.child_env().get("VAULT_ADDR").map(String::as_str),
            Some("https://vault.ci")
        );
    }

    #[test]
    fn validate_rejects_empty_owner_and_zero_interval() {
        let mut config = E2EConfig::default();
        config.source.owner = String::new();
        config.readiness.stable_interval = Duration::ZERO;

        let result = config.validate();
        assert_eq!(result.errors.len(), 2);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn validate_rejects_path_like_root_name() {
        let config = E2EConfig {
            root_name: Some("getoutreach/accounts".to_string()),
            ..Default::default()
        };
        assert!(!config.validate().is_valid());
    }
}
