//! File system backed durable store.
//!
//! Each key is a file in the store directory. Writes follow the
//! write-to-temp-then-rename pattern so readers always see either the old
//! value or the new one, never a torn write:
//!
//! 1. Write the value to `.<key>.tmp` in the same directory
//! 2. `fsync` the temporary file
//! 3. Rename it over `<key>`
//! 4. `fsync` the directory so the rename itself is durable
//!
//! All file system work runs on Tokio's blocking pool.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{is_valid_key, KeyValueStore, StoreError, StoreResult};

const WRITE_CHECK_FILENAME: &str = ".write-check";

fn io_failure(context: impl std::fmt::Display, err: &std::io::Error) -> StoreError {
    StoreError::Failure(format!("{context}: {err}"))
}

/// Durable [`KeyValueStore`] keeping one file per key.
///
/// The directory is this store's namespace: [`KeyValueStore::clear`] removes
/// every entry in it, subdirectories included, not just the keys this
/// crate writes.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `directory` and checks
    /// that it is writable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the directory cannot be created
    /// or written.
    pub fn open(directory: impl AsRef<Path>) -> StoreResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|err| {
            StoreError::Unavailable(format!(
                "cannot create store directory '{}': {err}",
                directory.display()
            ))
        })?;

        let marker = directory.join(WRITE_CHECK_FILENAME);
        fs::write(&marker, b"").and_then(|()| fs::remove_file(&marker)).map_err(|err| {
            StoreError::Unavailable(format!(
                "store directory '{}' is not writable: {err}",
                directory.display()
            ))
        })?;

        Ok(Self { directory })
    }

    /// The directory backing this store.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> StoreResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(StoreError::Failure(format!("invalid store key '{key}'")));
        }
        Ok(self.directory.join(key))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!(".{key}.tmp"))
    }

    fn sync_directory(&self) -> StoreResult<()> {
        #[cfg(unix)]
        {
            let dir = File::open(&self.directory)
                .map_err(|err| io_failure("failed to open store directory for sync", &err))?;
            dir.sync_all()
                .map_err(|err| io_failure("failed to fsync store directory", &err))?;
        }
        Ok(())
    }

    fn write_atomic(&self, key: &str, value: &str) -> StoreResult<()> {
        let final_path = self.entry_path(key)?;
        let temp_path = self.temp_path(key);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|err| {
                io_failure(format!("failed to create '{}'", temp_path.display()), &err)
            })?;
        file.write_all(value.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|err| io_failure(format!("failed to write '{}'", temp_path.display()), &err))?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|err| {
            let _ = fs::remove_file(&temp_path);
            io_failure(
                format!(
                    "failed to rename '{}' to '{}'",
                    temp_path.display(),
                    final_path.display()
                ),
                &err,
            )
        })?;

        self.sync_directory()
    }

    fn ensure_present(&self) -> StoreResult<()> {
        if self.directory.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "store directory '{}' is missing",
                self.directory.display()
            )))
        }
    }

    fn read_entry(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_failure(format!("failed to read '{}'", path.display()), &err)),
        }
    }

    fn remove_entry(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_failure(format!("failed to delete '{}'", path.display()), &err)),
        }
    }

    fn remove_all(&self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.directory)
            .map_err(|err| io_failure("failed to list store directory", &err))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_failure("failed to list store directory", &err))?;
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(|err| io_failure(format!("failed to stat '{}'", path.display()), &err))?
                .is_dir();
            let removed = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed
                .map_err(|err| io_failure(format!("failed to delete '{}'", path.display()), &err))?;
        }
        self.sync_directory()
    }

    /// Runs `op` on the blocking pool against a handle to the same directory.
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Self) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.ensure_present()?;
            op(&store)
        })
        .await
        .map_err(|err| StoreError::Failure(format!("store task failed: {err}")))?
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let (key, value) = (key.to_owned(), value.to_owned());
        self.blocking(move |store| store.write_atomic(&key, &value)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_owned();
        self.blocking(move |store| store.read_entry(&key)).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_owned();
        self.blocking(move |store| store.remove_entry(&key)).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.blocking(Self::remove_all).await
    }
}
