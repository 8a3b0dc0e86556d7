//! Detection of end-to-end tests in a Go repository.
//!
//! A repository needs an end-to-end run when any `_test.go` file carries the
//! `or_e2e` build tag in a `//go:build` or `// +build` constraint.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// Build tag marking end-to-end tests.
pub const E2E_TAG: &str = "or_e2e";

/// Tags passed to the test script.
pub const TEST_TAGS: &str = "or_test,or_e2e";

/// Returns true if a build constraint line mentions `tag`.
fn constraint_mentions(line: &str, tag: &str) -> bool {
    let expr = if let Some(rest) = line.strip_prefix("//go:build") {
        rest
    } else if let Some(rest) = line.strip_prefix("// +build") {
        rest
    } else {
        return false;
    };

    expr.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .any(|token| token == tag)
}

/// Whether a Go source file carries `tag` in its build constraints.
///
/// Constraints must precede the package clause, so scanning stops there.
pub fn has_build_tag(content: &str, tag: &str) -> bool {
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("package ") {
            break;
        }
        if constraint_mentions(line, tag) {
            return true;
        }
    }
    false
}

/// Whether any test file under `root` is tagged for end-to-end runs.
///
/// Git submodules (directories with their own `.git`) and symlinks are skipped.
pub fn should_run_e2e(root: &Path) -> Result<bool> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        entry.file_name() != ".git" && !entry.path().join(".git").exists()
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop while scanning"))
        })?;

        if entry.path_is_symlink() || !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with("_test.go") {
            continue;
        }

        let content = std::fs::read_to_string(entry.path())?;
        if has_build_tag(&content, E2E_TAG) {
            tracing::debug!(file = ?entry.path(), "found end-to-end test");
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_go_build_constraint() {
        let src = "//go:build or_test && or_e2e\n\npackage foo_test\n";
        assert!(has_build_tag(src, E2E_TAG));
    }

    #[test]
    fn detects_legacy_plus_build_constraint() {
        let src = "// +build or_e2e\n\npackage foo\n";
        assert!(has_build_tag(src, E2E_TAG));
    }

    #[test]
    fn ignores_similar_tags_and_body_mentions() {
        let src = "//go:build or_e2e_extra\n\npackage foo\n\n//go:build or_e2e\n";
        assert!(!has_build_tag(src, E2E_TAG));
        assert!(!has_build_tag("package foo\n// or_e2e\n", E2E_TAG));
    }

    #[test]
    fn scan_finds_tagged_test_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("internal/api")).unwrap();
        std::fs::write(
            dir.path().join("internal/api/api_test.go"),
            "//go:build or_e2e\n\npackage api\n",
        )
        .unwrap();

        assert!(should_run_e2e(dir.path()).unwrap());
    }

    #[test]
    fn scan_ignores_non_test_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("main.go"),
            "//go:build or_e2e\n\npackage main\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("main_test.go"), "package main\n").unwrap();

        assert!(!should_run_e2e(dir.path()).unwrap());
    }

    #[test]
    fn scan_skips_submodules() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("vendor-sub");
        std::fs::create_dir_all(sub.join(".git")).unwrap();
        std::fs::write(sub.join("x_test.go"), "//go:build or_e2e\n\npackage x\n").unwrap();

        assert!(!should_run_e2e(dir.path()).unwrap());
    }
}
