//! Gradle Patcher: lossless structural patching of Gradle build scripts
//!
//! Injects statements into Groovy-DSL build scripts (`build.gradle`) by
//! block path, creating missing blocks on the way, without reformatting any
//! byte it did not insert.
//!
//! # Architecture
//!
//! All edits compile down to a single primitive: [`Edit`], a verified
//! byte-span replacement. Intelligence lives in span acquisition (the
//! [`gradle`] scanner, tree builder and planner), not in the application
//! logic.
//!
//! Engines read and write through the [`vfs::StagedFs`] seam. The [`Vfs`]
//! overlay holds every write in memory until an explicit, all-or-nothing
//! commit.
//!
//! # Safety
//!
//! - All edits verify expected before-text before applying
//! - Spliced output is re-parsed before it is staged
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use gradle_patcher::gradle::{GradleFile, Pattern, PropertyDescriptor};
//! use gradle_patcher::Vfs;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let vfs = Arc::new(Vfs::new("android")?);
//! let build = GradleFile::new("app/build.gradle", vfs.clone());
//!
//! build
//!     .inject_properties(
//!         &Pattern::from_path(["dependencies"]),
//!         &[PropertyDescriptor::statement("implementation", "'com.example:lib:1.0'")],
//!     )
//!     .await?;
//!
//! vfs.commit_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod gradle;
pub mod safety;
pub mod vfs;

// Re-exports
pub use config::{
    apply_operations, load_from_path, load_from_str, ApplicationError, ConfigError,
    OperationConfig, OperationResult,
};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use gradle::{GradleError, GradleFile, Pattern, PropertyDescriptor};
pub use safety::{SafetyError, WorkspaceGuard};
pub use vfs::{StagedFs, StagedChange, Vfs, VfsError};
