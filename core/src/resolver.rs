//! Transitive dependency resolution.
//!
//! Walks the dependency graph depth-first starting from a root manifest.
//! Edges are discovered lazily: each dependency's children come either from
//! the [`VirtualDependencyTable`] or from the manifest inside its fetched
//! source. A name is marked visited before its children are traversed, so
//! cycles terminate and every name is fetched at most once per run.

use std::collections::{BTreeSet, HashSet};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fetcher::RemoteFetcher;
use crate::manifest::{self, Manifest, MANIFEST_CANDIDATES};
use crate::virtual_deps::{invalid_name_reason, normalize, VirtualDependencyTable};

/// Non-fatal problem encountered while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveWarning {
    /// Dependency the warning is about.
    pub dependency: String,
    /// Human-readable description.
    pub message: String,
}

/// Output of a resolution run.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Every transitively required or optional service, excluding the root.
    pub closure: BTreeSet<String>,
    /// Degradations that did not abort the run.
    pub warnings: Vec<ResolveWarning>,
}

impl Resolution {
    /// Whether `name` is part of the closure.
    pub fn contains(&self, name: &str) -> bool {
        self.closure.contains(normalize(name))
    }

    /// The closure as an owned list.
    pub fn to_vec(&self) -> Vec<String> {
        self.closure.iter().cloned().collect()
    }
}

/// Resolves dependency closures against a remote fetcher.
pub struct DependencyResolver<F: RemoteFetcher> {
    fetcher: F,
    virtual_deps: VirtualDependencyTable,
}

impl<F: RemoteFetcher> DependencyResolver<F> {
    /// Creates a resolver.
    pub fn new(fetcher: F, virtual_deps: VirtualDependencyTable) -> Self {
        Self {
            fetcher,
            virtual_deps,
        }
    }

    /// Returns the fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolves the closure of `root_manifest`.
    ///
    /// `root` is the name of the repository the manifest belongs to; it is
    /// never fetched and never part of the closure, even if some dependency
    /// names it. Any fetch failure aborts the run with no partial result.
    /// A fetched dependency without a usable manifest, and a name that is
    /// not a valid repository name, only produce a [`ResolveWarning`].
    pub async fn resolve(
        &self,
        root: &str,
        root_manifest: &Manifest,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let root = normalize(root).to_string();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.clone());
        let mut warnings = Vec::new();

        // Reversed so the first declared dependency is popped first.
        let mut stack: Vec<String> = root_manifest.all_dependencies().rev().cloned().collect();

        while let Some(name) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let name = normalize(&name).to_string();
            if let Some(reason) = invalid_name_reason(&name) {
                tracing::warn!(dep = ?name, "skipping dependency: {}", reason);
                warnings.push(ResolveWarning {
                    dependency: name,
                    message: reason.to_string(),
                });
                continue;
            }
            if visited.contains(&name) {
                continue;
            }

            let children = self.children_of(&name, cancel, &mut warnings).await?;

            visited.insert(name);
            stack.extend(children.into_iter().rev());
        }

        visited.remove(&root);
        let closure: BTreeSet<String> = visited.into_iter().collect();
        tracing::info!(count = closure.len(), "resolved dependency closure");

        Ok(Resolution { closure, warnings })
    }

    /// Discovers the direct dependencies of `name`.
    async fn children_of(
        &self,
        name: &str,
        cancel: &CancellationToken,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<Vec<String>> {
        if let Some(deps) = self.virtual_deps.lookup(name) {
            tracing::info!(dep = %name, "using virtual dependency list");
            return Ok(deps.to_vec());
        }

        tracing::info!(dep = %name, "resolving dependency");
        let source = self.fetcher.fetch(name, cancel).await?;

        match manifest::load_from(&source) {
            Ok((manifest, file)) => {
                tracing::debug!(dep = %name, file = %file, "loaded dependency manifest");
                Ok(manifest.all_dependencies().cloned().collect())
            }
            Err(e) if e.is_not_found() => {
                let message = format!(
                    "failed to find any of {:?}, will not calculate dependencies of this service",
                    MANIFEST_CANDIDATES
                );
                tracing::warn!(service = %name, "{}", message);
                warnings.push(ResolveWarning {
                    dependency: name.to_string(),
                    message,
                });
                Ok(Vec::new())
            }
            Err(e @ Error::ConfigMalformed { .. }) => {
                let message = format!("{}, will not calculate dependencies of this service", e);
                tracing::warn!(service = %name, "{}", message);
                warnings.push(ResolveWarning {
                    dependency: name.to_string(),
                    message,
                });
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
