//! Baked-in dependency lists for services whose manifests are not fetched.

use std::collections::HashMap;

/// Name the flagship service is still referred to by in older manifests.
pub const FLAGSHIP_ALIAS: &str = "flagship";

/// Repository name of the flagship service.
pub const FLAGSHIP: &str = "outreach";

/// Maps the legacy flagship alias to its repository name.
///
/// Every other name is returned unchanged.
pub fn normalize(name: &str) -> &str {
    if name == FLAGSHIP_ALIAS {
        FLAGSHIP
    } else {
        name
    }
}

/// Why `name` cannot be used as a repository name, if it cannot.
///
/// Names go into clone URLs and temporary directory names verbatim, so path
/// separators, whitespace and relative components are refused.
pub fn invalid_name_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("empty dependency name")
    } else if name.contains(['/', '\\']) {
        Some("dependency name contains a path separator")
    } else if name.chars().any(char::is_whitespace) {
        Some("dependency name contains whitespace")
    } else if name == "." || name == ".." {
        Some("dependency name is a relative path")
    } else {
        None
    }
}

/// Read-only table of dependency names resolved without a remote fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualDependencyTable {
    entries: HashMap<String, Vec<String>>,
}

impl VirtualDependencyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the orchestrator.
    ///
    /// The flagship's own dependencies are part of the `flagship` provisioning
    /// snapshot, so it resolves to no children.
    pub fn builtin() -> Self {
        Self::new().with_entry(FLAGSHIP, Vec::<String>::new())
    }

    /// Adds or replaces an entry. The key is normalized.
    pub fn with_entry<I, S>(mut self, name: &str, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            normalize(name).to_string(),
            deps.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Merges `overrides` on top of this table; later entries win.
    pub fn extended(mut self, overrides: &HashMap<String, Vec<String>>) -> Self {
        for (name, deps) in overrides {
            self.entries
                .insert(normalize(name).to_string(), deps.clone());
        }
        self
    }

    /// Returns the baked-in dependency list for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        self.entries.get(normalize(name)).map(Vec::as_slice)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
