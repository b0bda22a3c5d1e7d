//! Maps a requested filename to a path under the server's storage root.
//! The request parser calls through here; escape attempts are rejected
//! here rather than upstream, so every caller gets the same treatment.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::tftp::codec::ErrorCode;
use crate::tftp::consts;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("path escapes the storage root")]
	Traversal,
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
}

impl StorageError {
	pub fn wire_code(&self) -> Option<ErrorCode> {
		Some(match self {
			StorageError::Traversal => ErrorCode::IllegalOperation,
			StorageError::Io(_) => ErrorCode::Undefined,
		})
	}
}

#[derive(Clone)]
pub struct StorageRoot {
	root: PathBuf,
}

impl StorageRoot {
	/// Creates the root directory if it doesn't already exist.
	pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
		let root = root.into();
		std::fs::create_dir_all(&root)?;
		Ok(Self { root })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolves a requested name against the root. Truncates to
	/// [`consts::FILENAME_MAX`] characters; rejects `..`, absolute paths,
	/// and any other component that isn't a plain path segment.
	pub fn resolve(&self, requested: &str) -> Result<PathBuf, StorageError> {
		let truncated: String = requested.chars().take(consts::FILENAME_MAX).collect();
		if truncated.is_empty() {
			return Err(StorageError::Traversal);
		}

		let mut resolved = self.root.clone();
		for component in Path::new(&truncated).components() {
			match component {
				Component::Normal(part) => resolved.push(part),
				_ => return Err(StorageError::Traversal),
			}
		}
		Ok(resolved)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_plain_filename() {
		let tmp = tempfile::tempdir().unwrap();
		let root = StorageRoot::new(tmp.path()).unwrap();
		let resolved = root.resolve("file.bin").unwrap();
		assert_eq!(resolved, tmp.path().join("file.bin"));
	}

	#[test]
	fn rejects_parent_dir_traversal() {
		let tmp = tempfile::tempdir().unwrap();
		let root = StorageRoot::new(tmp.path()).unwrap();
		assert!(matches!(root.resolve("../etc/passwd"), Err(StorageError::Traversal)));
	}

	#[test]
	fn rejects_absolute_path() {
		let tmp = tempfile::tempdir().unwrap();
		let root = StorageRoot::new(tmp.path()).unwrap();
		assert!(matches!(root.resolve("/etc/passwd"), Err(StorageError::Traversal)));
	}

	#[test]
	fn truncates_long_filenames() {
		let tmp = tempfile::tempdir().unwrap();
		let root = StorageRoot::new(tmp.path()).unwrap();
		let long_name: String = "a".repeat(500);
		let resolved = root.resolve(&long_name).unwrap();
		assert_eq!(resolved.file_name().unwrap().len(), consts::FILENAME_MAX);
	}
}
