//! JSON file storage port for the session.
//!
//! All keys live in one JSON object. Every read goes to disk, so a session
//! written by another `fk` invocation is visible to the next operation of
//! this one. Writes replace the file atomically.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use fetchkit::{Error, Result, StorageListener, StoragePort, Subscription};
use parking_lot::Mutex;

type Entries = BTreeMap<String, String>;

#[derive(Debug)]
pub struct FileStorage {
	path: PathBuf,
	/// Serializes read-modify-write cycles within this process.
	lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(&self) -> Result<Entries> {
		match fs::read_to_string(&self.path) {
			Ok(content) if content.trim().is_empty() => Ok(Entries::new()),
			Ok(content) => serde_json::from_str(&content).or_else(|err| {
				tracing::warn!(path = %self.path.display(), error = %err, "session file unreadable, starting empty");
				Ok(Entries::new())
			}),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
			Err(err) => Err(storage_error(&self.path, err)),
		}
	}

	fn save(&self, entries: &Entries) -> Result<()> {
		if entries.is_empty() {
			return match fs::remove_file(&self.path) {
				Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(storage_error(&self.path, err)),
				_ => Ok(()),
			};
		}

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(|err| storage_error(parent, err))?;
		}
		let tmp = self.path.with_extension("json.tmp");
		let content = serde_json::to_string_pretty(entries)?;
		fs::write(&tmp, content).map_err(|err| storage_error(&tmp, err))?;
		restrict_permissions(&tmp)?;
		fs::rename(&tmp, &self.path).map_err(|err| storage_error(&self.path, err))
	}

	fn update(&self, f: impl FnOnce(&mut Entries) -> bool) -> Result<()> {
		let _guard = self.lock.lock();
		let mut entries = self.load()?;
		if f(&mut entries) {
			self.save(&entries)?;
		}
		Ok(())
	}
}

fn storage_error(path: &Path, err: std::io::Error) -> Error {
	Error::Storage(format!("{}: {err}", path.display()))
}

/// The file holds a bearer token; keep it private to the user.
fn restrict_permissions(path: &Path) -> Result<()> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|err| storage_error(path, err))?;
	}
	#[cfg(not(unix))]
	let _ = path;
	Ok(())
}

impl StoragePort for FileStorage {
	fn read(&self, key: &str) -> Result<Option<String>> {
		let _guard = self.lock.lock();
		Ok(self.load()?.remove(key))
	}

	fn write(&self, key: &str, value: &str) -> Result<()> {
		self.update(|entries| {
			entries.insert(key.to_string(), value.to_string());
			true
		})
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.update(|entries| entries.remove(key).is_some())
	}

	/// Other processes are only observed through fresh reads.
	fn on_external_change(&self, _listener: StorageListener) -> Subscription {
		Subscription::inert()
	}
}
