//! Content-addressed filesystem writes for screenshots captured during
//! candidate probing, mirroring `quote_vehicle::evidence`'s direct
//! `tokio::fs::write` rather than routing bytes through `StorageService`
//! (spec.md §6 "persisted state layout": blob directories keyed by content
//! hash).

use quote_storage::{StorageError, StorageService};
use quote_types::{File, FileId, FileKind, StorageKey};
use std::path::{Path, PathBuf};

/// Writes `bytes` under `storage_dir/screenshots/`, records a `File`
/// descriptor in storage, and returns it (spec.md §4.3 "screenshot capture").
pub async fn save_screenshot(storage: &StorageService, storage_dir: &Path, request_id: &str, bytes: &[u8]) -> Result<File, StorageError> {
	let id = FileId::new();
	let sha256 = File::content_hash(bytes);
	let filename = format!("screenshot_{request_id}_{}.png", id.0.simple());
	let dir = storage_dir.join("screenshots");
	tokio::fs::create_dir_all(&dir).await.map_err(|e| StorageError::Backend(e.to_string()))?;
	let path: PathBuf = dir.join(&filename);
	tokio::fs::write(&path, bytes).await.map_err(|e| StorageError::Backend(e.to_string()))?;

	let file = File {
		id,
		kind: FileKind::Screenshot,
		mime: "image/png".to_string(),
		storage_path: path.to_string_lossy().to_string(),
		sha256,
		created_at: chrono::Utc::now(),
	};
	storage.store(StorageKey::Files.as_str(), &file.id.to_string(), &file, None).await?;
	Ok(file)
}
