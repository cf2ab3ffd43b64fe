use crate::errors::ArchitectError;
use glob::Pattern;
use std::path::{Component, Path, PathBuf};
use tracing::warn;


/// Root-bound path policy for every tool touching the filesystem.
///
/// All tool paths go through [`Workspace::resolve`], which guarantees the
/// returned absolute path is a descendant of the workspace root. Traversal via
/// `..`, symlinks, or absolute inputs outside the root fails with
/// [`ArchitectError::PathEscape`].
pub struct Workspace {
    root: PathBuf,
    allow_delete: bool,
    sensitive_patterns: Vec<Pattern>,
}

impl Workspace {
    /// Create a workspace rooted at `root`.
    ///
    /// The root is canonicalized so symlink-resolved tool paths compare
    /// against the same representation. Invalid sensitive patterns are
    /// dropped with a warning (config validation catches them earlier).
    pub fn new(root: impl Into<PathBuf>, allow_delete: bool, sensitive_patterns: &[String]) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let sensitive_patterns = sensitive_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("ignoring invalid sensitive pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self {
            root,
            allow_delete,
            sensitive_patterns,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `delete_file` is permitted in this workspace.
    pub fn allow_delete(&self) -> bool {
        self.allow_delete
    }

    /// Resolve a raw tool-supplied path to an absolute path inside the root.
    ///
    /// Relative inputs are joined to the root. The longest existing ancestor
    /// is canonicalized (resolving symlinks), the remainder is normalized
    /// lexically, and the result must stay under the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ArchitectError> {
        let candidate = {
            let p = Path::new(raw);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        };

        let resolved = resolve_symlinks(&candidate);
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(ArchitectError::PathEscape(raw.to_string()))
        }
    }

    /// Workspace-relative form of a resolved path, for display and matching.
    pub fn relative(&self, resolved: &Path) -> PathBuf {
        resolved
            .strip_prefix(&self.root)
            .map_or_else(|_| resolved.to_path_buf(), Path::to_path_buf)
    }

    /// Whether a resolved path matches the sensitive glob set.
    ///
    /// Both the workspace-relative path and the bare file name are matched,
    /// so `*.env` catches `config/.env` and `*secret*` catches
    /// `notes/secrets.txt`.
    pub fn is_sensitive(&self, resolved: &Path) -> bool {
        let relative = self.relative(resolved);
        let relative_str = relative.to_string_lossy();
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.sensitive_patterns
            .iter()
            .any(|p| p.matches(&relative_str) || p.matches(&file_name))
    }
}

/// Resolve symlinks on the longest existing ancestor of `path`, then append
/// the non-existent remainder normalized lexically.
///
/// `canonicalize` alone fails on paths that do not exist yet (the common case
/// for `write_file`), and a purely lexical pass would miss symlink escapes on
/// the existing prefix.
fn resolve_symlinks(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }

    let normalized = lexical_normalize(path);
    let mut existing = normalized.clone();
    let mut remainder = Vec::new();
    while !existing.as_os_str().is_empty() {
        if let Ok(resolved) = existing.canonicalize() {
            let mut result = resolved;
            for component in remainder.iter().rev() {
                result.push(component);
            }
            return result;
        }
        if let Some(name) = existing.file_name() {
            remainder.push(name.to_os_string());
            existing.pop();
        } else {
            break;
        }
    }
    normalized
}

/// Normalize a path lexically (without touching the filesystem).
/// Resolves `.` and `..` components so that `/workspace/../etc/passwd`
/// correctly normalizes to `/etc/passwd` rather than passing through
/// as if it starts with `/workspace`.
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}
