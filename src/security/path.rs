use std::path::{Component, Path, PathBuf};

use crate::error::SecurityError;

/// Confines caller-supplied bridge directories to an allow-listed root.
///
/// Every bridge file operation resolves its directory through
/// [`BridgePathPolicy::validate`] first, so a crafted path (`../..`, a
/// symlink pointing elsewhere) can never move the bridge files outside the
/// per-user root.
#[derive(Debug, Clone)]
pub struct BridgePathPolicy {
    allowed_root: PathBuf,
}

impl BridgePathPolicy {
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
        }
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Canonicalize `candidate` and reject it unless it resolves at or below
    /// the allowed root. The directory does not need to exist yet.
    pub fn validate(&self, candidate: &Path) -> Result<PathBuf, SecurityError> {
        // Block null bytes (can truncate paths in C-backed syscalls)
        if candidate.as_os_str().to_string_lossy().contains('\0') {
            return Err(SecurityError::InvalidPath(
                "path contains a null byte".into(),
            ));
        }
        if candidate.as_os_str().is_empty() {
            return Err(SecurityError::InvalidPath("path is empty".into()));
        }

        let resolved = resolve_lexically(candidate)?;
        let root = resolve_lexically(&self.allowed_root)?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(SecurityError::OutsideAllowedRoot {
                path: resolved,
                root,
            })
        }
    }

    /// Validate and create the bridge directory.
    pub fn ensure_dir(&self, candidate: &Path) -> Result<PathBuf, SecurityError> {
        let resolved = self.validate(candidate)?;
        std::fs::create_dir_all(&resolved).map_err(|e| {
            SecurityError::InvalidPath(format!(
                "cannot create bridge directory {}: {e}",
                resolved.display()
            ))
        })?;
        Ok(resolved)
    }
}

/// Resolve a path that may not exist yet: the deepest existing ancestor is
/// canonicalized (following symlinks), the remaining components are applied
/// lexically with `..` popping.
pub fn resolve_lexically(path: &Path) -> Result<PathBuf, SecurityError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| SecurityError::InvalidPath(format!("no working directory: {e}")))?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut pending: Vec<Component<'_>> = Vec::new();
    let base = loop {
        match existing.canonicalize() {
            Ok(canonical) => break canonical,
            Err(_) => {
                let Some(parent) = existing.parent() else {
                    break PathBuf::from(existing);
                };
                if let Some(last) = existing.components().next_back() {
                    pending.push(last);
                }
                existing = parent;
            }
        }
    };

    let mut resolved = base;
    for component in pending.into_iter().rev() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    Ok(resolved)
}
