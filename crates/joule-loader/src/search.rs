//! Candidate paths for an import.

use std::path::{Component, Path, PathBuf};

/// Library roots searched after the importer's own directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    /// Extra roots, searched in order.
    pub jpath: Vec<PathBuf>,
    /// The workspace root. Its `vendor/` directory and the root itself are
    /// searched after `jpath`.
    pub workspace_root: Option<PathBuf>,
}

impl SearchPaths {
    /// Create search paths.
    #[must_use]
    pub const fn new(jpath: Vec<PathBuf>, workspace_root: Option<PathBuf>) -> Self {
        Self {
            jpath,
            workspace_root,
        }
    }

    /// Candidate files for `import` written in `importer`, most specific
    /// first and without duplicates.
    #[must_use]
    pub fn candidates(&self, importer: &Path, import: &str) -> Vec<PathBuf> {
        let import = Path::new(import);
        if import.is_absolute() {
            return vec![normalize(import)];
        }

        let mut roots: Vec<PathBuf> = Vec::new();
        if let Some(dir) = importer.parent() {
            roots.push(dir.to_path_buf());
        }
        roots.extend(self.jpath.iter().cloned());
        if let Some(root) = &self.workspace_root {
            roots.push(root.join("vendor"));
            roots.push(root.clone());
        }

        let mut out: Vec<PathBuf> = Vec::with_capacity(roots.len());
        for root in roots {
            let candidate = normalize(&root.join(import));
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_order() {
        let paths = SearchPaths::new(vec![PathBuf::from("/lib")], Some(PathBuf::from("/w")));
        let candidates = paths.candidates(Path::new("/w/app/main.jsonnet"), "k.libsonnet");
        assert_eq!(
            candidates,
            [
                PathBuf::from("/w/app/k.libsonnet"),
                PathBuf::from("/lib/k.libsonnet"),
                PathBuf::from("/w/vendor/k.libsonnet"),
                PathBuf::from("/w/k.libsonnet"),
            ]
        );
    }

    #[test]
    fn test_absolute_import_is_used_as_is() {
        let paths = SearchPaths::new(vec![PathBuf::from("/lib")], None);
        assert_eq!(
            paths.candidates(Path::new("/w/main.jsonnet"), "/etc/x/../y.jsonnet"),
            [PathBuf::from("/etc/y.jsonnet")]
        );
    }

    #[test]
    fn test_duplicate_roots_collapse() {
        let paths = SearchPaths::new(vec![], Some(PathBuf::from("/w")));
        let candidates = paths.candidates(Path::new("/w/main.jsonnet"), "a.jsonnet");
        assert_eq!(
            candidates,
            [
                PathBuf::from("/w/a.jsonnet"),
                PathBuf::from("/w/vendor/a.jsonnet"),
            ]
        );
    }

    #[test]
    fn test_normalize_parent_components() {
        assert_eq!(
            normalize(Path::new("/w/app/../lib/./a.jsonnet")),
            PathBuf::from("/w/lib/a.jsonnet")
        );
    }
}
