//! devenv-e2e - end-to-end test orchestration for devenv-backed services
//!
//! This library resolves the transitive service dependencies of a repository,
//! provisions a developer environment with them, opens a tunnel into it, and
//! runs the repository's end-to-end test suite.

pub mod config;
pub mod devenv;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod orchestrator;
pub mod readiness;
pub mod resolver;
pub mod scan;
pub mod tunnel;
pub mod virtual_deps;

pub use error::{Error, Result};

pub use config::{E2EConfig, Validate, ValidationResult};
pub use devenv::{snapshot_target, Devenv};
pub use fetcher::{FetchedSource, GitFetcher, RemoteFetcher};
pub use manifest::{Dependencies, Manifest, ManifestSource, MANIFEST_CANDIDATES};
pub use orchestrator::{E2EOrchestrator, RunOutcome};
pub use readiness::{ReadinessConfig, ReadinessPoller, ReadinessState, TunnelStatus};
pub use resolver::{DependencyResolver, Resolution, ResolveWarning};
pub use tunnel::{Tunnel, TunnelConfig};
pub use virtual_deps::VirtualDependencyTable;
