//! Staged file system.
//!
//! Engines never touch disk directly: they read and write through a
//! [`StagedFs`]. [`Vfs`] keeps every write in memory until
//! [`Vfs::commit_all`], which lands all staged files together.

use crate::safety::{SafetyError, WorkspaceGuard};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not valid UTF-8: {}", .0.display())]
    NotUtf8(PathBuf),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("commit task failed: {0}")]
    Task(String),
}

impl VfsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::InvalidData => VfsError::NotUtf8(path.to_path_buf()),
            _ => VfsError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Read/write seam between engines and storage.
#[async_trait]
pub trait StagedFs: Send + Sync {
    /// Current content: the staged version if there is one, else disk.
    async fn read(&self, path: &Path) -> Result<String, VfsError>;

    /// Stage `content` for `path`. Nothing reaches disk until commit.
    async fn write(&self, path: &Path, content: String) -> Result<(), VfsError>;
}

#[derive(Debug, Clone)]
struct Entry {
    /// Disk content when first loaded; `None` for files created here.
    original: Option<String>,
    current: String,
}

impl Entry {
    fn is_dirty(&self) -> bool {
        self.original.as_deref() != Some(self.current.as_str())
    }
}

/// A staged file that differs from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub path: PathBuf,
    pub original: Option<String>,
    pub content: String,
}

/// In-memory overlay over a project directory.
#[derive(Debug)]
pub struct Vfs {
    guard: WorkspaceGuard,
    entries: Mutex<BTreeMap<PathBuf, Entry>>,
}

impl Vfs {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, VfsError> {
        Ok(Self {
            guard: WorkspaceGuard::new(root)?,
            entries: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.workspace_root()
    }

    /// Absolute, lexically normalized key for `path`.
    fn key(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        };
        let mut out = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    /// Files whose staged content differs from disk, in path order.
    pub async fn staged(&self) -> Vec<StagedChange> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.is_dirty())
            .map(|(path, entry)| StagedChange {
                path: path.clone(),
                original: entry.original.clone(),
                content: entry.current.clone(),
            })
            .collect()
    }

    /// Drop every staged write.
    pub async fn discard(&self) {
        let mut entries = self.entries.lock().await;
        let dropped = entries.values().filter(|e| e.is_dirty()).count();
        entries.clear();
        debug!(dropped, "discarded staged writes");
    }

    /// Write every staged change to disk.
    ///
    /// All targets are validated and written to temporary files next to
    /// them first; only when every temporary file is synced are they renamed
    /// into place. A failure before the rename phase leaves disk untouched.
    /// Returns the committed paths.
    pub async fn commit_all(&self) -> Result<Vec<PathBuf>, VfsError> {
        let mut entries = self.entries.lock().await;
        let pending: Vec<(PathBuf, String)> = entries
            .iter()
            .filter(|(_, entry)| entry.is_dirty())
            .map(|(path, entry)| (path.clone(), entry.current.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let guard = self.guard.clone();
        let committed = tokio::task::spawn_blocking(move || commit_blocking(&guard, pending))
            .await
            .map_err(|err| VfsError::Task(err.to_string()))??;

        for entry in entries.values_mut() {
            entry.original = Some(entry.current.clone());
        }
        info!(files = committed.len(), "committed staged files");
        Ok(committed)
    }
}

fn commit_blocking(
    guard: &WorkspaceGuard,
    pending: Vec<(PathBuf, String)>,
) -> Result<Vec<PathBuf>, VfsError> {
    let mut prepared = Vec::with_capacity(pending.len());
    for (path, content) in pending {
        let target = guard.validate_path(&path)?;
        let parent = target
            .parent()
            .ok_or_else(|| VfsError::NotFound(target.clone()))?;
        let mut temp =
            tempfile::NamedTempFile::new_in(parent).map_err(|err| VfsError::io(parent, err))?;
        temp.write_all(content.as_bytes())
            .map_err(|err| VfsError::io(&target, err))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| VfsError::io(&target, err))?;
        prepared.push((target, temp));
    }

    let mut committed = Vec::with_capacity(prepared.len());
    for (target, temp) in prepared {
        guard.revalidate(&target)?;
        temp.persist(&target)
            .map_err(|err| VfsError::io(&target, err.error))?;
        filetime::set_file_mtime(&target, filetime::FileTime::now())
            .map_err(|err| VfsError::io(&target, err))?;
        debug!(path = %target.display(), "committed");
        committed.push(target);
    }
    Ok(committed)
}

#[async_trait]
impl StagedFs for Vfs {
    async fn read(&self, path: &Path) -> Result<String, VfsError> {
        let key = self.key(path);
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&key) {
            return Ok(entry.current.clone());
        }
        let content = tokio::fs::read_to_string(&key)
            .await
            .map_err(|err| VfsError::io(&key, err))?;
        entries.insert(
            key,
            Entry {
                original: Some(content.clone()),
                current: content.clone(),
            },
        );
        Ok(content)
    }

    async fn write(&self, path: &Path, content: String) -> Result<(), VfsError> {
        let key = self.key(path);
        self.guard.validate_path(&key)?;

        let mut entries = self.entries.lock().await;
        match entries.get_mut(&key) {
            Some(entry) => entry.current = content,
            None => {
                let original = match tokio::fs::read_to_string(&key).await {
                    Ok(text) => Some(text),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                    Err(err) => return Err(VfsError::io(&key, err)),
                };
                entries.insert(
                    key.clone(),
                    Entry {
                        original,
                        current: content,
                    },
                );
            }
        }
        debug!(path = %key.display(), "staged write");
        Ok(())
    }
}
