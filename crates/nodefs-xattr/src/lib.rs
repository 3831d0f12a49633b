//! # nodefs-xattr
//!
//! Key/value metadata attached to a node's on-disk location.
//!
//! The rest of nodefs only talks to [`MetadataBackend`]; the backend decides
//! where the record physically lives. [`SidecarBackend`] keeps one bincode
//! record file next to each node.
//!
//! ## Contract
//!
//! - `set_multiple` is atomic per node: a concurrent reader observes either
//!   the previous or the new full record, never a mix.
//! - Writers hold an exclusive [`NodeLock`] on the node; readers that need
//!   several attributes to agree take a shared one.

pub mod keys;
pub mod lock;
pub mod sidecar;

pub use lock::{LockMode, LockOptions, NodeLock};
pub use sidecar::SidecarBackend;

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during attribute operations
#[derive(Error, Debug)]
pub enum XattrError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Record encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("No metadata record for {path}")]
    NotFound { path: PathBuf },

    #[error("Attribute {key} not set on {path}")]
    AttrUnset { path: PathBuf, key: String },

    #[error("Attribute {key} holds an invalid value: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to acquire lock on {path} after {retries} retries")]
    LockTimeout { path: PathBuf, retries: u32 },

    #[error("Lock held on {actual} does not cover {expected}")]
    LockMismatch { expected: PathBuf, actual: PathBuf },
}

impl XattrError {
    /// True when the record or the requested key does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            XattrError::NotFound { .. } | XattrError::AttrUnset { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, XattrError>;

/// Full attribute record of one node, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, Vec<u8>>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: &str) {
        self.set(key, value.as_bytes());
    }

    /// Integers are stored as decimal strings
    pub fn set_int64(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string().into_bytes());
    }

    /// Lossy UTF-8 view of `key`
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn int64(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_int64(key, raw).map(Some),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keys starting with `prefix`
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        self.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// Copy of this record restricted to keys accepted by `filter`
    pub fn filtered(&self, filter: impl Fn(&str) -> bool) -> Attributes {
        self.0
            .iter()
            .filter(|(k, _)| filter(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Overwrite keys of `self` with the ones from `other`
    pub fn merge(&mut self, other: Attributes) {
        self.0.extend(other.0);
    }
}

impl FromIterator<(String, Vec<u8>)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Vec<u8>);
    type IntoIter = btree_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

pub(crate) fn parse_int64(key: &str, raw: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(raw).map_err(|e| XattrError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    text.trim().parse().map_err(|e: std::num::ParseIntError| XattrError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Storage of node attribute records.
///
/// `path` is always a node's internal path (see `nodefs-tree`); backends derive
/// their own record and lock file locations from it.
pub trait MetadataBackend: Send + Sync {
    /// Short backend identifier for logs and the CLI
    fn name(&self) -> &'static str;

    /// Read one attribute
    fn get(&self, path: &Path, key: &str) -> Result<Vec<u8>>;

    /// Read one attribute holding a decimal integer
    fn get_int64(&self, path: &Path, key: &str) -> Result<i64> {
        let raw = self.get(path, key)?;
        parse_int64(key, &raw)
    }

    /// Read the full record
    fn all(&self, path: &Path) -> Result<Attributes>;

    /// Set one attribute under an exclusive lock
    fn set(&self, path: &Path, key: &str, value: &[u8]) -> Result<()> {
        let mut attrs = Attributes::new();
        attrs.set(key, value);
        self.set_multiple(path, attrs, true)
    }

    /// Merge `attrs` into the record as one atomic write.
    ///
    /// With `acquire_lock == false` the caller must already hold an exclusive
    /// lock on `path`.
    fn set_multiple(&self, path: &Path, attrs: Attributes, acquire_lock: bool) -> Result<()>;

    /// Remove one attribute, `AttrUnset` when it is not present
    fn remove(&self, path: &Path, key: &str, acquire_lock: bool) -> Result<()>;

    /// True when a record exists for `path`
    fn exists(&self, path: &Path) -> bool;

    /// Delete the record. Missing records are not an error.
    fn purge(&self, path: &Path) -> Result<()>;

    /// Move the record of `old` to `new`
    fn rename(&self, old: &Path, new: &Path) -> Result<()>;

    /// File holding the record of `path`
    fn metadata_path(&self, path: &Path) -> PathBuf;

    /// File used for advisory locks on `path`
    fn lockfile_path(&self, path: &Path) -> PathBuf;

    /// Lock the record of `path`
    fn lock(&self, path: &Path, mode: LockMode) -> Result<NodeLock>;
}

/// `path` with `suffix` appended to its final component
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
