//! Dependency manifest loading.
//!
//! A manifest is the `devenv.yaml` (or one of its legacy names) at the root
//! of a repository. Only the service flag and the two dependency lists are
//! read; everything else in the file is ignored.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Manifest filenames, in the order they are tried.
pub const MANIFEST_CANDIDATES: &[&str] = &["devenv.yaml", "noncompat-service.yaml", "service.yaml"];

/// Declared dependencies of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Services this service cannot function without.
    #[serde(default)]
    pub required: Vec<String>,

    /// Services this service can gracefully run without.
    #[serde(default)]
    pub optional: Vec<String>,
}

/// Parsed dependency manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Whether this repository is a deployable service (as opposed to a library).
    #[serde(default)]
    pub service: bool,

    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Dependencies,
}

impl Manifest {
    /// Parses a manifest from YAML text.
    pub fn parse(content: &str, path: impl Into<PathBuf>) -> Result<Self> {
        // An empty document deserializes to unit; treat it as "no dependencies".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::ConfigMalformed {
            path: path.into(),
            reason: e.to_string(),
        })
    }

    /// Loads a single manifest file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Self::parse(&content, path)
    }

    /// Required followed by optional dependencies, in declaration order.
    pub fn all_dependencies(&self) -> impl DoubleEndedIterator<Item = &String> {
        self.dependencies
            .required
            .iter()
            .chain(self.dependencies.optional.iter())
    }
}

/// Something manifest files can be read out of by relative path.
pub trait ManifestSource {
    /// Reads a file, returning `None` when it does not exist.
    fn read_file(&self, relative: &str) -> io::Result<Option<String>>;

    /// Path used in diagnostics for a file inside this source.
    fn display_path(&self, relative: &str) -> PathBuf;
}

impl ManifestSource for Path {
    fn read_file(&self, relative: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.join(relative)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn display_path(&self, relative: &str) -> PathBuf {
        self.join(relative)
    }
}

/// Finds and parses the manifest in `source`.
///
/// Candidates are tried in [`MANIFEST_CANDIDATES`] order and the first one
/// that is present and parses wins. A present but malformed candidate is
/// skipped in favor of later ones; if nothing parses, the first malformed
/// error is returned. If no candidate is present at all, the result is
/// [`Error::ConfigNotFound`].
pub fn load_from<S: ManifestSource + ?Sized>(source: &S) -> Result<(Manifest, &'static str)> {
    let mut malformed = None;

    for candidate in MANIFEST_CANDIDATES {
        let Some(content) = source.read_file(candidate)? else {
            continue;
        };

        match Manifest::parse(&content, source.display_path(candidate)) {
            Ok(manifest) => return Ok((manifest, *candidate)),
            Err(e) => {
                tracing::debug!(file = %candidate, error = %e, "skipping unparseable manifest");
                malformed.get_or_insert(e);
            }
        }
    }

    Err(malformed.unwrap_or_else(|| Error::ConfigNotFound {
        path: source.display_path(MANIFEST_CANDIDATES[0]),
    }))
}
