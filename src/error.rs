//! Error taxonomy (§7): a single top-level [`VfsError`], expressed with
//! `thiserror` instead of hand-rolled `Display`/`Error` impls, that
//! classifies into five kinds.

use thiserror::Error;

/// One of the five error kinds named by §7. Every [`VfsError`] variant maps to
/// exactly one kind via [`VfsError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	Conflict,
	Format,
	External,
	Usage,
}

#[derive(Debug, Error)]
pub enum VfsError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("overlay not found: {0}")]
	OverlayNotFound(String),

	#[error("path `{path}` is ambiguous across overlays: {candidates:?}")]
	Conflict {
		path: String,
		candidates: Vec<String>,
	},

	#[error("{0}")]
	Format(String),

	#[error("external error: {0}")]
	External(String),

	#[error("usage: {0}")]
	Usage(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl VfsError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			VfsError::NotFound(_) | VfsError::OverlayNotFound(_) => ErrorKind::NotFound,
			VfsError::Conflict { .. } => ErrorKind::Conflict,
			VfsError::Format(_) => ErrorKind::Format,
			VfsError::External(_) => ErrorKind::External,
			VfsError::Usage(_) => ErrorKind::Usage,
			VfsError::Io(_) => ErrorKind::External,
		}
	}

	/// The single-line `error: ...` diagnostic the REPL prints for every
	/// non-fatal kind (§7).
	pub fn diagnostic(&self) -> String {
		format!("error: {self}")
	}

	pub fn not_found(path: impl Into<String>) -> Self {
		VfsError::NotFound(path.into())
	}

	pub fn format(msg: impl Into<String>) -> Self {
		VfsError::Format(msg.into())
	}

	pub fn usage(msg: impl Into<String>) -> Self {
		VfsError::Usage(msg.into())
	}

	pub fn external(msg: impl Into<String>) -> Self {
		VfsError::External(msg.into())
	}
}

pub type VfsResult<T> = Result<T, VfsError>;
