//! Operation applicator: runs every operation of a config against a staged
//! file system and reports a result per operation.
//!
//! Nothing is committed here. Callers inspect the results, preview the
//! staged diff and decide whether to commit or discard.

use crate::config::schema::{OperationConfig, OperationDefinition};
use crate::gradle::{GradleError, GradleFile, Placement};
use crate::vfs::StagedFs;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "OperationResult should be checked for success/failure"]
pub enum OperationResult {
    /// Properties were staged into the file.
    Applied {
        file: PathBuf,
        placement: Placement,
        created: Vec<String>,
    },
    /// Nothing to insert.
    Unchanged { file: PathBuf },
    /// Not attempted because an earlier operation failed.
    Skipped { reason: String },
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Applied {
                file,
                placement,
                created,
            } => {
                let how = match placement {
                    Placement::ExpandInline => "expanded empty block",
                    Placement::AppendBeforeClose => "appended to block",
                    Placement::AppendToDocument => "appended to file",
                };
                write!(f, "Staged {} ({how}", file.display())?;
                if !created.is_empty() {
                    write!(f, ", created {}", created.join(" > "))?;
                }
                write!(f, ")")
            }
            OperationResult::Unchanged { file } => {
                write!(f, "Nothing to inject into {}", file.display())
            }
            OperationResult::Skipped { reason } => write!(f, "Skipped: {}", reason),
        }
    }
}

#[derive(Debug)]
pub enum ApplicationError {
    /// The operation's properties could not be converted.
    InvalidOperation { id: String, reason: String },
    /// The engine rejected or failed the injection.
    Gradle { file: PathBuf, source: GradleError },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::InvalidOperation { id, reason } => {
                write!(f, "operation '{}' is invalid: {}", id, reason)
            }
            ApplicationError::Gradle { file, source } => {
                write!(f, "{}: {}", file.display(), source)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Gradle { source, .. } => Some(source),
            ApplicationError::InvalidOperation { .. } => None,
        }
    }
}

impl ApplicationError {
    /// True when the host lacks the configured grammar helper.
    pub fn is_unresolved_dependency(&self) -> bool {
        matches!(self, ApplicationError::Gradle { source, .. } if source.is_unresolved_dependency())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Continue with later operations after a failure.
    pub keep_going: bool,
}

/// Apply every operation in order, staging results in `fs`.
///
/// Each operation writes all of its change or none of it. Without
/// `keep_going`, the first failure marks every later operation as skipped.
pub async fn apply_operations(
    config: &OperationConfig,
    fs: Arc<dyn StagedFs>,
    options: ApplyOptions,
) -> Vec<(String, Result<OperationResult, ApplicationError>)> {
    let parser = config.meta.parser.build();
    let plan_options = config.plan_options();

    let mut results = Vec::with_capacity(config.operations.len());
    let mut failed: Option<String> = None;

    for operation in &config.operations {
        if let Some(failed_id) = &failed {
            results.push((
                operation.id.clone(),
                Ok(OperationResult::Skipped {
                    reason: format!("operation '{failed_id}' failed"),
                }),
            ));
            continue;
        }

        let file = GradleFile::new(&operation.file, fs.clone())
            .with_parser(parser.clone())
            .with_options(plan_options.clone());
        let result = apply_operation(&file, operation).await;

        match &result {
            Ok(outcome) => info!(id = %operation.id, "{outcome}"),
            Err(err) => {
                warn!(id = %operation.id, error = %err, "operation failed");
                if !options.keep_going {
                    failed = Some(operation.id.clone());
                }
            }
        }
        results.push((operation.id.clone(), result));
    }

    results
}

async fn apply_operation(
    file: &GradleFile,
    operation: &OperationDefinition,
) -> Result<OperationResult, ApplicationError> {
    let properties =
        operation
            .descriptors()
            .map_err(|reason| ApplicationError::InvalidOperation {
                id: operation.id.clone(),
                reason,
            })?;

    let plan = file
        .inject_properties(&operation.target, &properties)
        .await
        .map_err(|source| ApplicationError::Gradle {
            file: file.path().to_path_buf(),
            source,
        })?;

    let path = file.path().to_path_buf();
    Ok(match plan.placement {
        Some(placement) => OperationResult::Applied {
            file: path,
            placement,
            created: plan.created,
        },
        None => OperationResult::Unchanged { file: path },
    })
}

/// Paths of every file the config touches, relative to the project root.
pub fn target_files(config: &OperationConfig) -> Vec<&Path> {
    let mut files: Vec<&Path> = Vec::new();
    for operation in &config.operations {
        let path = Path::new(&operation.file);
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;
    use crate::vfs::Vfs;
    use std::fs;

    const CONFIG: &str = r#"
[meta]
name = "deps"

[[operations]]
id = "broken"
file = "missing.gradle"
target = { dependencies = {} }

[[operations.properties]]
name = "implementation"
value = "'a:b:1'"
form = "statement"

[[operations]]
id = "ok"
file = "build.gradle"
target = { dependencies = {} }

[[operations.properties]]
name = "implementation"
value = "'a:b:1'"
form = "statement"
"#;

    fn workspace() -> (tempfile::TempDir, Arc<Vfs>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.gradle"), "dependencies {}\n").unwrap();
        let vfs = Arc::new(Vfs::new(dir.path()).unwrap());
        (dir, vfs)
    }

    #[tokio::test]
    async fn test_failure_skips_later_operations() {
        let config = load_from_str(CONFIG).unwrap();
        let (_dir, vfs) = workspace();

        let results = apply_operations(&config, vfs.clone(), ApplyOptions::default()).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_err());
        assert!(matches!(
            results[1].1,
            Ok(OperationResult::Skipped { .. })
        ));
        assert!(vfs.staged().await.is_empty());
    }

    #[tokio::test]
    async fn test_keep_going_isolates_failures() {
        let config = load_from_str(CONFIG).unwrap();
        let (_dir, vfs) = workspace();

        let results =
            apply_operations(&config, vfs.clone(), ApplyOptions { keep_going: true }).await;
        assert!(results[0].1.is_err());
        match &results[1].1 {
            Ok(OperationResult::Applied { placement, .. }) => {
                assert_eq!(*placement, Placement::ExpandInline)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(vfs.staged().await.len(), 1);
    }

    #[test]
    fn test_operation_result_display() {
        let result = OperationResult::Applied {
            file: PathBuf::from("build.gradle"),
            placement: Placement::AppendBeforeClose,
            created: vec!["android".to_string(), "defaultConfig".to_string()],
        };
        assert_eq!(
            result.to_string(),
            "Staged build.gradle (appended to block, created android > defaultConfig)"
        );
    }

    #[test]
    fn test_target_files_deduplicates() {
        let config = load_from_str(CONFIG).unwrap();
        let files = target_files(&config);
        assert_eq!(
            files,
            vec![Path::new("missing.gradle"), Path::new("build.gradle")]
        );
    }
}
