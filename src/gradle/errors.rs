use crate::edit::EditError;
use crate::vfs::VfsError;
use std::path::PathBuf;
use thiserror::Error;

/// Line/column of a byte offset, 1-based, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn locate(source: &str, offset: usize) -> Self {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|b| **b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let column = source[line_start..offset].chars().count() + 1;
        Self {
            offset,
            line,
            column,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug)]
pub enum GradleError {
    #[error("lex error at {position}: {message}")]
    Lex { position: Position, message: String },

    #[error("parse error at {position}: {message}")]
    Parse { position: Position, message: String },

    #[error("grammar helper '{helper}' is unavailable: {reason}")]
    UnresolvedDependency { helper: String, reason: String },

    #[error("grammar helper '{helper}' failed: {message}")]
    HelperFailed { helper: String, message: String },

    #[error("invalid pattern: {message}")]
    InvalidPattern { message: String },

    #[error("invalid property '{name}': {message}")]
    InvalidProperty { name: String, message: String },

    #[error("injection would leave {file} unparseable: {message}")]
    PostEditParse { file: PathBuf, message: String },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),

    #[error("staged file error: {0}")]
    Vfs(#[from] VfsError),
}

impl GradleError {
    /// True for errors caused by the file's own syntax, as opposed to the
    /// host missing a helper or an I/O problem.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, GradleError::Lex { .. } | GradleError::Parse { .. })
    }

    pub fn is_unresolved_dependency(&self) -> bool {
        matches!(self, GradleError::UnresolvedDependency { .. })
    }

    pub(crate) fn lex(source: &str, offset: usize, message: impl Into<String>) -> Self {
        GradleError::Lex {
            position: Position::locate(source, offset),
            message: message.into(),
        }
    }

    pub(crate) fn parse(source: &str, offset: usize, message: impl Into<String>) -> Self {
        GradleError::Parse {
            position: Position::locate(source, offset),
            message: message.into(),
        }
    }
}
