//! Sidecar-file attribute backend.
//!
//! Layout next to a node's internal path `p`:
//!
//! ```text
//! p          node placeholder (directory or empty file)
//! p.meta     bincode record: BTreeMap<String, Vec<u8>>
//! p.mlock    advisory lock file
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::{with_suffix, Attributes, LockMode, LockOptions, MetadataBackend, NodeLock, Result, XattrError};

pub const METADATA_SUFFIX: &str = ".meta";
pub const LOCK_SUFFIX: &str = ".mlock";

#[derive(Debug, Clone, Default)]
pub struct SidecarBackend {
    lock_options: LockOptions,
}

impl SidecarBackend {
    pub fn new(lock_options: LockOptions) -> Self {
        Self { lock_options }
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    fn read_record(&self, path: &Path) -> Result<Attributes> {
        let meta = self.metadata_path(path);
        let file = match File::open(&meta) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(XattrError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }

    /// Replace the record atomically using temp file + rename
    fn write_record(&self, path: &Path, attrs: &Attributes) -> Result<()> {
        let meta = self.metadata_path(path);
        if let Some(parent) = meta.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = bincode::serialize(attrs)?;
        // Unique temp name: concurrent writers of different records share directories
        let temp_path = with_suffix(
            &meta,
            &format!(
                ".{}.{:?}.tmp",
                std::process::id(),
                std::thread::current().id()
            ),
        );
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        if let Err(e) = fs::rename(&temp_path, &meta) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Load the record, or an empty one when none exists yet
    fn read_or_default(&self, path: &Path) -> Result<Attributes> {
        match self.read_record(path) {
            Err(XattrError::NotFound { .. }) => Ok(Attributes::new()),
            other => other,
        }
    }

    fn update(
        &self,
        path: &Path,
        acquire_lock: bool,
        apply: impl FnOnce(&mut Attributes) -> Result<()>,
    ) -> Result<()> {
        let _lock = if acquire_lock {
            Some(self.lock(path, LockMode::Exclusive)?)
        } else {
            None
        };
        let mut record = self.read_or_default(path)?;
        apply(&mut record)?;
        self.write_record(path, &record)
    }
}

impl MetadataBackend for SidecarBackend {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    #[instrument(skip(self), level = "debug")]
    fn get(&self, path: &Path, key: &str) -> Result<Vec<u8>> {
        let mut record = self.read_record(path)?;
        record.remove(key).ok_or_else(|| XattrError::AttrUnset {
            path: path.to_path_buf(),
            key: key.to_string(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn all(&self, path: &Path) -> Result<Attributes> {
        self.read_record(path)
    }

    #[instrument(skip(self, attrs), fields(count = attrs.len()), level = "debug")]
    fn set_multiple(&self, path: &Path, attrs: Attributes, acquire_lock: bool) -> Result<()> {
        self.update(path, acquire_lock, |record| {
            record.merge(attrs);
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn remove(&self, path: &Path, key: &str, acquire_lock: bool) -> Result<()> {
        self.update(path, acquire_lock, |record| {
            record
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| XattrError::AttrUnset {
                    path: path.to_path_buf(),
                    key: key.to_string(),
                })
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.metadata_path(path).is_file()
    }

    #[instrument(skip(self), level = "debug")]
    fn purge(&self, path: &Path) -> Result<()> {
        match fs::remove_file(self.metadata_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn rename(&self, old: &Path, new: &Path) -> Result<()> {
        let target = self.metadata_path(new);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.metadata_path(old), target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => XattrError::NotFound {
                path: old.to_path_buf(),
            },
            _ => e.into(),
        })?;

        // the lock file is recreated on demand, moving it is best effort
        let old_lock = self.lockfile_path(old);
        if old_lock.exists() {
            let _ = fs::rename(old_lock, self.lockfile_path(new));
        }
        Ok(())
    }

    fn metadata_path(&self, path: &Path) -> PathBuf {
        with_suffix(path, METADATA_SUFFIX)
    }

    fn lockfile_path(&self, path: &Path) -> PathBuf {
        with_suffix(path, LOCK_SUFFIX)
    }

    fn lock(&self, path: &Path, mode: LockMode) -> Result<NodeLock> {
        NodeLock::acquire(&self.lockfile_path(path), mode, &self.lock_options)
    }
}
