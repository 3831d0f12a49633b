//! In-memory view of one node record.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use nodefs_config::{log_node_debug, log_node_warn};
use nodefs_xattr::{keys, Attributes, LockMode, XattrError};
use parking_lot::Mutex;
use tracing::instrument;

use crate::error::{Result, TreeError};
use crate::lookup::Lookup;
use crate::pathify;
use crate::resource::{Owner, ResourceId, ResourceType};

/// `parentid` of every space root
pub const ROOT_PARENT_ID: &str = "root";

/// One file, directory, symlink or reference.
///
/// Nodes are snapshots: they are rebuilt from the backend on demand and never
/// shared through a central cache. The attribute record read while loading is
/// kept until the node itself writes through [`Node::set_xattrs`].
pub struct Node {
    lookup: Lookup,
    pub space_id: String,
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub blob_id: String,
    pub blobsize: i64,
    /// False for the would-be node returned by create-style walks
    pub exists: bool,
    pub space_root_id: String,
    node_type: ResourceType,
    attrs: Mutex<Option<Attributes>>,
}

impl Node {
    /// Load `(space_id, node_id)`.
    ///
    /// Fails with `NotFound` when no record exists and with `IncompleteNode`
    /// when one of type, parent id or name is missing. An unparsable type
    /// yields [`ResourceType::Invalid`] instead of an error.
    pub fn read(lookup: &Lookup, space_id: &str, node_id: &str) -> Result<Node> {
        let node = Self::read_unchecked(lookup, space_id, node_id)?;
        if !node.is_space_root() && !lookup.metadata_backend().exists(&node.parent_path()) {
            log_node_warn!(
                "Parent of node is gone",
                node_id = node_id,
                parent_id = node.parent_id.as_str(),
            );
            return Err(TreeError::NotFound(node.parent_id.clone()));
        }
        Ok(node)
    }

    /// Load a node without checking that its parent still exists
    #[instrument(skip(lookup), level = "debug")]
    pub(crate) fn read_unchecked(lookup: &Lookup, space_id: &str, node_id: &str) -> Result<Node> {
        let internal = lookup.internal_path(space_id, node_id);
        let attrs = lookup
            .metadata_backend()
            .all(&internal)
            .map_err(|e| match e {
                XattrError::NotFound { .. } => TreeError::NotFound(node_id.to_string()),
                other => other.into(),
            })?;

        let mandatory = |key: &str| {
            attrs.string(key).ok_or_else(|| TreeError::IncompleteNode {
                node_id: node_id.to_string(),
                attribute: key.to_string(),
            })
        };
        let name = mandatory(keys::NAME)?;
        let parent_id = mandatory(keys::PARENT_ID)?;
        let node_type = match attrs.int64(keys::TYPE) {
            Ok(Some(value)) => ResourceType::from_i64(value),
            Ok(None) => {
                return Err(TreeError::IncompleteNode {
                    node_id: node_id.to_string(),
                    attribute: keys::TYPE.to_string(),
                })
            }
            Err(e) => {
                log_node_warn!(
                    "Unreadable node type",
                    node_id = node_id,
                    error = e.to_string().as_str(),
                );
                ResourceType::Invalid
            }
        };

        let blob_id = attrs.string(keys::BLOB_ID).unwrap_or_default();
        let blobsize = if blob_id.is_empty() {
            0
        } else {
            attrs.int64(keys::BLOB_SIZE)?.unwrap_or(0)
        };

        Ok(Node {
            lookup: lookup.clone(),
            space_id: space_id.to_string(),
            id: node_id.to_string(),
            parent_id,
            name,
            blob_id,
            blobsize,
            exists: true,
            space_root_id: space_id.to_string(),
            node_type,
            attrs: Mutex::new(Some(attrs)),
        })
    }

    /// Would-be node named `name` below `parent_id`, used as a create target
    pub fn placeholder(lookup: &Lookup, space_id: &str, parent_id: &str, name: &str) -> Node {
        Node {
            lookup: lookup.clone(),
            space_id: space_id.to_string(),
            id: String::new(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            blob_id: String::new(),
            blobsize: 0,
            exists: false,
            space_root_id: space_id.to_string(),
            node_type: ResourceType::Invalid,
            attrs: Mutex::new(None),
        }
    }

    /// Would-be child of this node
    pub fn new_child(&self, name: &str) -> Node {
        Node::placeholder(&self.lookup, &self.space_id, &self.id, name)
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.space_id, &self.id)
    }

    pub fn node_type(&self) -> ResourceType {
        self.node_type
    }

    pub fn is_dir(&self) -> bool {
        self.node_type == ResourceType::Container
    }

    pub fn is_space_root(&self) -> bool {
        self.exists && self.space_id == self.id
    }

    pub fn internal_path(&self) -> PathBuf {
        self.lookup.internal_path(&self.space_id, &self.id)
    }

    pub fn parent_path(&self) -> PathBuf {
        self.lookup.internal_path(&self.space_id, &self.parent_id)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.lookup
            .metadata_backend()
            .lockfile_path(&self.internal_path())
    }

    /// Resolve the directory entry `name` below this node
    pub fn child(&self, name: &str) -> Result<Node> {
        if !self.exists || !self.is_dir() {
            return Err(TreeError::NotFound(name.to_string()));
        }
        let child_id = self.lookup.node_id_from_parent_and_name(self, name)?;
        match Node::read_unchecked(&self.lookup, &self.space_id, &child_id) {
            Err(TreeError::NotFound(_)) => {
                log_node_warn!(
                    "Directory entry points at a missing node",
                    name = name,
                    child_id = child_id.as_str(),
                );
                Err(TreeError::NotFound(name.to_string()))
            }
            other => other,
        }
    }

    /// Parent node, `NotFound` for space roots
    pub fn parent(&self) -> Result<Node> {
        if self.is_space_root() || self.parent_id == ROOT_PARENT_ID || self.parent_id.is_empty() {
            return Err(TreeError::NotFound(format!("parent of {}", self.id)));
        }
        Node::read_unchecked(&self.lookup, &self.space_id, &self.parent_id)
    }

    /// Full attribute record, cached after the first read
    pub fn xattrs(&self) -> Result<Attributes> {
        let mut cached = self.attrs.lock();
        if let Some(attrs) = cached.as_ref() {
            return Ok(attrs.clone());
        }
        let attrs = self.lookup.metadata_backend().all(&self.internal_path())?;
        *cached = Some(attrs.clone());
        Ok(attrs)
    }

    pub fn xattr(&self, key: &str) -> Result<Vec<u8>> {
        let attrs = self.xattrs()?;
        attrs
            .get(key)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| TreeError::NotFound(format!("{key} on {}", self.id)))
    }

    pub fn xattr_string(&self, key: &str) -> Result<String> {
        let raw = self.xattr(key)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn set_xattr(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut attrs = Attributes::new();
        attrs.set(key, value);
        self.set_xattrs(attrs, true)
    }

    pub fn set_xattrs(&self, attrs: Attributes, acquire_lock: bool) -> Result<()> {
        log_node_debug!("Writing attributes", node_id = self.id.as_str(), count = attrs.len());
        let result = self
            .lookup
            .metadata_backend()
            .set_multiple(&self.internal_path(), attrs, acquire_lock);
        self.invalidate();
        Ok(result?)
    }

    pub fn remove_xattr(&self, key: &str) -> Result<()> {
        let result = self
            .lookup
            .metadata_backend()
            .remove(&self.internal_path(), key, true);
        self.invalidate();
        Ok(result?)
    }

    pub(crate) fn invalidate(&self) {
        *self.attrs.lock() = None;
    }

    /// Owner of the space this node lives in
    pub fn owner(&self) -> Result<Owner> {
        let backend = self.lookup.metadata_backend();
        let root = self.lookup.internal_path(&self.space_id, &self.space_id);
        let read = |key: &str| match backend.get(&root, key) {
            Ok(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
            Err(XattrError::AttrUnset { .. }) => Ok(String::new()),
            Err(e) => Err(TreeError::from(e)),
        };
        Ok(Owner::new(read(keys::OWNER_ID)?, read(keys::OWNER_IDP)?))
    }

    pub fn mtime(&self) -> Result<DateTime<Utc>> {
        self.time_attr(keys::MTIME)
    }

    pub fn ctime(&self) -> Result<DateTime<Utc>> {
        self.time_attr(keys::CTIME)
    }

    fn time_attr(&self, key: &str) -> Result<DateTime<Utc>> {
        let raw = self.xattr_string(key)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| TreeError::Internal(format!("invalid {key} on {}: {e}", self.id)))
    }

    pub fn set_mtime(&self, mtime: DateTime<Utc>) -> Result<()> {
        self.set_xattr(keys::MTIME, format_time(mtime).as_bytes())
    }

    /// Hex BLAKE3 over node id and mtime, changes whenever the node is touched
    pub fn etag(&self) -> Result<String> {
        let mtime = self.xattr_string(keys::MTIME).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id.as_bytes());
        hasher.update(mtime.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Target of a reference node
    pub fn reference_target(&self) -> Result<ResourceId> {
        let raw = self
            .xattr_string(keys::REFERENCE)
            .map_err(|e| match e {
                TreeError::NotFound(_) => {
                    TreeError::InvalidReference(format!("{} carries no target", self.id))
                }
                other => other,
            })?;
        ResourceId::from_reference_attr(&raw)
    }

    pub fn symlink_target(&self) -> Result<String> {
        self.xattr_string(keys::SYMLINK_TARGET)
    }

    /// Names of the directory entries below this node
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.internal_path())? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log_node_warn!(
                    "Skipping non UTF-8 entry",
                    node_id = self.id.as_str(),
                    name = &*raw.to_string_lossy(),
                ),
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn has_children(&self) -> Result<bool> {
        match fs::read_dir(self.internal_path()) {
            Ok(mut entries) => Ok(entries.next().is_some()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Advisory lock on this node's record
    pub fn lock(&self, mode: LockMode) -> Result<nodefs_xattr::NodeLock> {
        Ok(self.lookup.metadata_backend().lock(&self.internal_path(), mode)?)
    }

    /// Directory entry of this node inside its parent
    pub(crate) fn entry_path(&self) -> PathBuf {
        self.parent_path().join(&self.name)
    }

    pub(crate) fn link_target(&self) -> PathBuf {
        pathify::link_target(&self.id)
    }
}

/// RFC3339 with nanoseconds, the on-disk timestamp format
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node {
            lookup: self.lookup.clone(),
            space_id: self.space_id.clone(),
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            name: self.name.clone(),
            blob_id: self.blob_id.clone(),
            blobsize: self.blobsize,
            exists: self.exists,
            space_root_id: self.space_root_id.clone(),
            node_type: self.node_type,
            attrs: Mutex::new(self.attrs.lock().clone()),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("space_id", &self.space_id)
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("type", &self.node_type)
            .field("exists", &self.exists)
            .finish()
    }
}
