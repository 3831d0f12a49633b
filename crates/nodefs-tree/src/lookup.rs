//! Path ⇄ node translation.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nodefs_ace::Permissions;
use nodefs_config::path::expand_tilde;
use nodefs_config::{log_lookup_debug, log_lookup_warn, Config};
use nodefs_xattr::{keys, LockMode, LockOptions, MetadataBackend, NodeLock, SidecarBackend};
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::pathify;
use crate::resource::{Reference, ResourceId, ResourceType, User};

/// Settings injected into [`Lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOptions {
    /// Storage root holding `spaces/`
    pub root: PathBuf,
    /// Grant cap per node, `None` for unlimited
    pub max_grants_per_node: Option<usize>,
    /// Worker threads for folder listings, 0 uses the global rayon pool
    pub list_concurrency: usize,
}

impl LookupOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_grants_per_node: Some(nodefs_config::DEFAULT_MAX_GRANTS_PER_NODE),
            list_concurrency: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: expand_tilde(&config.storage.root),
            max_grants_per_node: config.acl.grant_limit(),
            list_concurrency: config.tree.list_concurrency,
        }
    }
}

struct LookupInner {
    options: LookupOptions,
    backend: Arc<dyn MetadataBackend>,
    clock: Arc<dyn Clock>,
}

/// Resolver over one storage root.
///
/// Cheap to clone; every [`Node`] carries one so it can reach the backend.
#[derive(Clone)]
pub struct Lookup {
    inner: Arc<LookupInner>,
}

impl Lookup {
    pub fn new(
        options: LookupOptions,
        backend: Arc<dyn MetadataBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(LookupInner {
                options,
                backend,
                clock,
            }),
        }
    }

    /// Sidecar backend and wall clock configured from `config`
    pub fn from_config(config: &Config) -> Self {
        let lock_options = LockOptions::new(config.lock.max_retries, config.lock.initial_delay_ms);
        Self::new(
            LookupOptions::from_config(config),
            Arc::new(SidecarBackend::new(lock_options)),
            Arc::new(SystemClock),
        )
    }

    pub fn options(&self) -> &LookupOptions {
        &self.inner.options
    }

    pub fn internal_root(&self) -> &Path {
        &self.inner.options.root
    }

    pub fn internal_path(&self, space_id: &str, node_id: &str) -> PathBuf {
        pathify::internal_path(&self.inner.options.root, space_id, node_id)
    }

    pub fn metadata_backend(&self) -> &dyn MetadataBackend {
        self.inner.backend.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Load a node by id; an empty opaque id addresses the space root
    pub fn node_from_id(&self, id: &ResourceId) -> Result<Node> {
        if id.opaque_id.is_empty() {
            return self.node_from_space_id(&id.space_id);
        }
        Node::read(self, &id.space_id, &id.opaque_id)
    }

    /// Root node of `space_id`
    pub fn node_from_space_id(&self, space_id: &str) -> Result<Node> {
        let mut node = Node::read(self, space_id, space_id)?;
        node.space_root_id = node.id.clone();
        Ok(node)
    }

    /// Resolve a resource id plus optional relative path
    #[instrument(skip(self), level = "debug")]
    pub fn node_from_resource(&self, reference: &Reference) -> Result<Node> {
        self.resolve_reference(reference, false)
    }

    /// Like [`Lookup::node_from_resource`], but a missing final segment
    /// yields a non-existing placeholder node
    #[instrument(skip(self), level = "debug")]
    pub fn node_from_resource_for_create(&self, reference: &Reference) -> Result<Node> {
        self.resolve_reference(reference, true)
    }

    fn resolve_reference(&self, reference: &Reference, for_create: bool) -> Result<Node> {
        let id = reference
            .resource_id
            .as_ref()
            .ok_or_else(|| TreeError::InvalidReference("missing resource id".to_string()))?;
        let root = self.node_from_id(id)?;
        if clean_segments(&reference.path).is_empty() {
            return Ok(root);
        }
        let no_check = |_: &Node| Ok(());
        if for_create {
            self.walk_path_for_create(&root, &reference.path, true, no_check)
        } else {
            self.walk_path(&root, &reference.path, true, no_check)
        }
    }

    /// Walk `path` below `root`, one directory entry per segment.
    ///
    /// Every segment must exist. `per_segment` sees each resolved node after
    /// references were followed; an error from it aborts the walk.
    pub fn walk_path<F>(&self, root: &Node, path: &str, follow_references: bool, per_segment: F) -> Result<Node>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        self.walk(root, path, follow_references, false, per_segment)
    }

    /// Walk `path` below `root` for a create: a missing final segment below
    /// an existing container yields a placeholder with `exists == false`
    pub fn walk_path_for_create<F>(
        &self,
        root: &Node,
        path: &str,
        follow_references: bool,
        per_segment: F,
    ) -> Result<Node>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        self.walk(root, path, follow_references, true, per_segment)
    }

    fn walk<F>(
        &self,
        root: &Node,
        path: &str,
        follow_references: bool,
        for_create: bool,
        mut per_segment: F,
    ) -> Result<Node>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        let segments = clean_segments(path);
        let mut current = root.clone();
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            let mut next = match current.child(segment) {
                Ok(node) => node,
                Err(TreeError::NotFound(_)) if is_last && for_create && current.is_dir() => {
                    log_lookup_debug!("Resolved create target", name = *segment);
                    return Ok(current.new_child(segment));
                }
                Err(TreeError::NotFound(_)) => {
                    return Err(TreeError::NotFound(segment.to_string()));
                }
                Err(e) => return Err(e),
            };

            if follow_references && next.node_type() == ResourceType::Reference {
                next = self.follow_reference(&next)?;
            }
            if next.is_space_root() {
                next.space_root_id = next.id.clone();
            }
            per_segment(&next)?;
            current = next;
        }
        Ok(current)
    }

    /// Node a reference node points at
    pub fn follow_reference(&self, node: &Node) -> Result<Node> {
        let target = node.reference_target()?;
        log_lookup_debug!(
            "Following reference",
            node_id = node.id.as_str(),
            target = target.to_string().as_str(),
        );
        self.node_from_id(&target)
    }

    /// Rebuild the path of `node` up to its space root.
    ///
    /// Ascent stops before the first ancestor for which `has_permission`
    /// returns false, so the result never names an ancestor the caller
    /// cannot see.
    pub fn path<F>(&self, node: &Node, mut has_permission: F) -> Result<String>
    where
        F: FnMut(&Node) -> bool,
    {
        let mut segments = Vec::new();
        let mut visited = HashSet::new();
        let mut current = node.clone();
        while current.id != node.space_root_id && !current.is_space_root() {
            if !visited.insert(current.id.clone()) {
                return Err(TreeError::Internal(format!(
                    "parent cycle through {}",
                    current.id
                )));
            }
            segments.push(current.name.clone());
            let parent = current.parent().map_err(|e| match e {
                TreeError::NotFound(_) => TreeError::NotFound(current.parent_id.clone()),
                other => other,
            })?;
            if !has_permission(&parent) {
                log_lookup_debug!(
                    "Path truncated at permission boundary",
                    node_id = node.id.as_str(),
                );
                break;
            }
            current = parent;
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Child id encoded in the directory entry `name` of `parent`
    pub fn node_id_from_parent_and_name(&self, parent: &Node, name: &str) -> Result<String> {
        let entry = parent.internal_path().join(name);
        let target = fs::read_link(&entry).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TreeError::NotFound(name.to_string()),
            _ => TreeError::Io(e),
        })?;
        let id = pathify::node_id_from_link(&target);
        if id.is_empty() {
            return Err(TreeError::Internal(format!(
                "empty directory entry {}",
                entry.display()
            )));
        }
        Ok(id)
    }

    /// Node type stored at `path`, `Invalid` when unreadable
    pub fn type_from_path(&self, path: &Path) -> ResourceType {
        match self.metadata_backend().get_int64(path, keys::TYPE) {
            Ok(value) => ResourceType::from_i64(value),
            Err(e) => {
                log_lookup_warn!(
                    "Could not read node type",
                    path = path.display().to_string().as_str(),
                    error = e.to_string().as_str(),
                );
                ResourceType::Invalid
            }
        }
    }

    pub fn read_blob_id_attr(&self, path: &Path) -> Result<String> {
        let raw = self.metadata_backend().get(path, keys::BLOB_ID)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn read_blob_size_attr(&self, path: &Path) -> Result<i64> {
        Ok(self.metadata_backend().get_int64(path, keys::BLOB_SIZE)?)
    }

    /// Copy the attributes of `src` accepted by `filter` onto `dst`.
    ///
    /// Holds a shared lock on `src` while reading.
    pub fn copy_metadata<F>(&self, src: &Path, dst: &Path, filter: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let lock = self.metadata_backend().lock(src, LockMode::Shared)?;
        self.copy_metadata_with_source_lock(src, dst, filter, &lock)
    }

    /// [`Lookup::copy_metadata`] for callers already holding a lock on `src`.
    ///
    /// The destination is locked exclusively for the write.
    pub fn copy_metadata_with_source_lock<F>(
        &self,
        src: &Path,
        dst: &Path,
        filter: F,
        source_lock: &NodeLock,
    ) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let backend = self.metadata_backend();
        source_lock.ensure_covers(&backend.lockfile_path(src))?;
        if src == dst {
            return Ok(());
        }
        let attrs = backend.all(src)?.filtered(filter);
        backend.set_multiple(dst, attrs, true)?;
        Ok(())
    }

    /// Effective permissions of `user` on `node`.
    ///
    /// Grants are collected bottom-up to the space root. A matching deny on
    /// any level empties the set.
    pub fn assemble_permissions(&self, node: &Node, user: &User) -> Result<Permissions> {
        let owner = node.owner()?;
        if !owner.id.is_empty() && owner.id == user.id {
            return Ok(Permissions::all());
        }

        let mut permissions = Permissions::empty();
        let mut visited = HashSet::new();
        let mut current = if node.exists {
            node.clone()
        } else {
            Node::read_unchecked(self, &node.space_id, &node.parent_id)?
        };
        loop {
            if !visited.insert(current.id.clone()) {
                return Err(TreeError::Internal(format!(
                    "parent cycle through {}",
                    current.id
                )));
            }
            let decision = current.read_user_permissions(user)?;
            if decision.denied {
                return Ok(Permissions::empty());
            }
            permissions |= decision.permissions;
            if current.is_space_root() {
                break;
            }
            current = current.parent()?;
        }
        Ok(permissions)
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("options", &self.inner.options)
            .field("backend", &self.inner.backend.name())
            .finish()
    }
}

/// Split a relative path into segments, dropping empty and `.` segments.
/// `..` removes the previous segment and is ignored at the root.
pub fn clean_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments
}
