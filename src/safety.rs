use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keeps commits inside the project being patched.
///
/// Gradle's own state (the user cache under `~/.gradle`, per-project
/// `.gradle/` and `build/` output) is never a legitimate patch target.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical project root
    workspace_root: PathBuf,
    /// Canonical directories that may not be written
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut candidates = Vec::new();
        if let Some(home) = home::home_dir() {
            candidates.push(home.join(".gradle"));
        }
        candidates.push(workspace_root.join(".gradle"));
        candidates.push(workspace_root.join("build"));

        // Only directories that exist can be canonicalized; the rest cannot
        // contain anything we would write anyway.
        let forbidden_paths = candidates
            .into_iter()
            .filter_map(|dir| dir.canonicalize().ok())
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Resolve `path` against the workspace and check it.
    ///
    /// The file itself need not exist yet, but its parent directory must.
    /// Returns the canonical target path.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let canonical = match absolute.canonicalize() {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let name = absolute
                    .file_name()
                    .ok_or_else(|| SafetyError::NoFileName(absolute.clone()))?;
                let parent = absolute
                    .parent()
                    .ok_or_else(|| SafetyError::NoFileName(absolute.clone()))?;
                parent.canonicalize()?.join(name)
            }
            Err(err) => return Err(err.into()),
        };

        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Check again right before a rename lands on `path`.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        self.validate_path(path)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        if let Some(forbidden) = self
            .forbidden_paths
            .iter()
            .find(|forbidden| canonical.starts_with(forbidden))
        {
            return Err(SafetyError::ForbiddenPath {
                path: canonical.to_path_buf(),
                forbidden: forbidden.clone(),
            });
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_build_script_inside_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        let guard = WorkspaceGuard::new(workspace).unwrap();

        let file = workspace.join("app/build.gradle");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("app/build.gradle").is_ok());
    }

    #[test]
    fn test_new_file_is_validated_through_parent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path()).unwrap();

        let resolved = guard.validate_path("settings.gradle").unwrap();
        assert_eq!(resolved.file_name().unwrap(), "settings.gradle");
        assert!(resolved.starts_with(guard.workspace_root()));

        let missing_parent = guard.validate_path("nowhere/build.gradle");
        assert!(matches!(missing_parent, Err(SafetyError::Canonicalize(_))));
    }

    #[test]
    fn test_outside_workspace_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("project");
        fs::create_dir_all(&workspace).unwrap();
        let guard = WorkspaceGuard::new(&workspace).unwrap();

        let outside = temp_dir.path().join("build.gradle");
        fs::write(&outside, b"").unwrap();

        let result = guard.validate_path(&outside);
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
        let result = guard.validate_path("../build.gradle");
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }

    #[test]
    fn test_gradle_output_dirs_forbidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        fs::create_dir_all(workspace.join("build/generated")).unwrap();
        fs::create_dir_all(workspace.join(".gradle")).unwrap();

        let guard = WorkspaceGuard::new(workspace).unwrap();

        let result = guard.validate_path("build/generated/build.gradle");
        assert!(matches!(result, Err(SafetyError::ForbiddenPath { .. })));
        let result = guard.validate_path(".gradle/cache.gradle");
        assert!(matches!(result, Err(SafetyError::ForbiddenPath { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("project");
        fs::create_dir_all(&workspace).unwrap();

        let outside = temp_dir.path().join("outside.gradle");
        fs::write(&outside, b"").unwrap();
        symlink(&outside, workspace.join("build.gradle")).unwrap();

        let guard = WorkspaceGuard::new(&workspace).unwrap();
        let result = guard.validate_path("build.gradle");
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }
}
