//! Immutable blob descriptors.

use crate::ids::FileId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
	InputImage,
	Screenshot,
	GeneratedDocument,
}

/// A write-once blob descriptor, referenced by SHA-256 and storage path
/// (spec.md §3 "Lifecycle": "Files are write-once").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
	pub id: FileId,
	pub kind: FileKind,
	pub mime: String,
	pub storage_path: String,
	pub sha256: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
}

impl File {
	/// Hex-encoded SHA-256 of `bytes`, used both to name the file
	/// (`screenshot_<request_id>_<index>.png`, spec.md §4.3) and to detect
	/// idempotent collisions on identical content (spec.md §5 "Filesystem").
	pub fn content_hash(bytes: &[u8]) -> String {
		let mut hasher = Sha256::new();
		hasher.update(bytes);
		hex::encode(hasher.finalize())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_content_hashes_identically() {
		let a = File::content_hash(b"same bytes");
		let b = File::content_hash(b"same bytes");
		assert_eq!(a, b);
	}

	#[test]
	fn different_content_hashes_differently() {
		assert_ne!(File::content_hash(b"a"), File::content_hash(b"b"));
	}
}
