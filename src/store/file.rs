//! Durable file-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
};

/// Slot value plus the instant it was last written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSlot {
	/// Stored string.
	pub value: String,
	/// Instant of the last write.
	pub updated_at: OffsetDateTime,
}

/// Persists slots to a JSON file after each mutation (write-then-rename).
///
/// Disk writes run on Tokio's blocking pool and are serialized by an async writer lock; the
/// in-memory map is only updated once the new snapshot is on disk, so readers never block on IO
/// and never observe a value that failed to persist.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, StoredSlot>>>,
	writer: Arc<tokio::sync::Mutex<()>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self {
			path,
			inner: Arc::new(RwLock::new(snapshot)),
			writer: Arc::new(tokio::sync::Mutex::new(())),
		})
	}

	/// Returns when `key` was last written, if it exists.
	pub fn updated_at(&self, key: &str) -> Option<OffsetDateTime> {
		self.inner.read().get(key).map(|slot| slot.updated_at)
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, StoredSlot>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(path: &Path, contents: &HashMap<String, StoredSlot>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = path.to_path_buf();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().get(key).map(|slot| slot.value.clone())) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let _writer = self.writer.lock().await;
			let slot = StoredSlot { value, updated_at: OffsetDateTime::now_utc() };
			let mut snapshot = self.inner.read().clone();

			snapshot.insert(key.to_owned(), slot.clone());

			let path = self.path.clone();

			tokio::task::spawn_blocking(move || Self::persist(&path, &snapshot))
				.await
				.map_err(|e| StoreError::Backend {
					message: format!("Store writer task failed: {e}"),
				})??;

			self.inner.write().insert(key.to_owned(), slot);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"token_interceptor_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.set("hashToken", "T1".into()))
			.expect("Failed to save fixture token to file store.");
		rt.block_on(store.set("hashToken", "T2".into()))
			.expect("Failed to overwrite fixture token in file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.get("hashToken"))
			.expect("Failed to fetch fixture token from file store.");

		assert_eq!(fetched.as_deref(), Some("T2"));
		assert!(reopened.updated_at("hashToken").is_some());
		assert!(reopened.updated_at("missing").is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_writes_all_reach_disk() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let mut tasks = tokio::task::JoinSet::new();

		for i in 0..8 {
			let store = store.clone();

			tasks.spawn(async move { store.set(&format!("slot-{i}"), format!("T{i}")).await });
		}

		while let Some(joined) = tasks.join_next().await {
			joined.expect("Writer task should not panic.").expect("Write should persist.");
		}

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		for i in 0..8 {
			let key = format!("slot-{i}");

			assert_eq!(
				reopened.get(&key).await.expect("Read should succeed.").as_deref(),
				store.get(&key).await.expect("Read should succeed.").as_deref(),
			);
		}

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn failed_writes_keep_the_previous_value() {
		let dir = temp_path();

		fs::create_dir_all(&dir).expect("Failed to create store directory fixture.");

		let path = dir.join("tokens.json");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.set("hashToken", "T1".into()).await.expect("First write should persist.");

		// A directory squatting on the temp file path makes the next write fail.
		fs::create_dir_all(dir.join("tokens.tmp")).expect("Failed to block the temp file path.");

		let err = store
			.set("hashToken", "T2".into())
			.await
			.expect_err("Writes should fail while the temp path is blocked.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert_eq!(
			store.get("hashToken").await.expect("Read should succeed.").as_deref(),
			Some("T1")
		);

		fs::remove_dir_all(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove temporary store directory {}: {e}", dir.display())
		});
	}

	#[test]
	fn corrupt_snapshot_is_reported() {
		let path = temp_path();

		fs::write(&path, b"not json").expect("Failed to write corrupt snapshot fixture.");

		let err = FileStore::open(&path).expect_err("Corrupt snapshots should fail to load.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
