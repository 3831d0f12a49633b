//! Tree mutations: create, move, delete and list.
//!
//! A create writes the node record first and registers the directory entry
//! last, so a crash in between leaves an unreachable record rather than an
//! entry pointing at nothing. Moves are not atomic across the entry rename
//! and the record update; `nodefs check` reports the resulting orphans.
//! Creates link under the parent's exclusive lock and deletes hold the
//! node's own, so a directory cannot gain a child while it is removed.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::Path;

use nodefs_config::{log_tree_debug, log_tree_info, log_tree_warn};
use nodefs_xattr::{keys, Attributes, LockMode};
use rayon::prelude::*;
use tracing::instrument;

use crate::error::{Result, TreeError};
use crate::lookup::Lookup;
use crate::node::{format_time, Node};
use crate::resource::{ResourceId, ResourceType};

pub struct Tree {
    lookup: Lookup,
    pool: Option<rayon::ThreadPool>,
}

impl Tree {
    /// Listing uses a dedicated pool when `list_concurrency` is set
    pub fn new(lookup: Lookup) -> Result<Self> {
        let pool = match lookup.options().list_concurrency {
            0 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("nodefs-list-{i}"))
                    .build()
                    .map_err(|e| TreeError::Internal(format!("list pool: {e}")))?,
            ),
        };
        Ok(Self { lookup, pool })
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Create a directory at the placeholder `target`
    pub fn create_dir(&self, target: &Node) -> Result<Node> {
        self.create_node(target, ResourceType::Container, Attributes::new())
    }

    /// Create a file at `target` backed by `blob_id`
    pub fn touch_file(&self, target: &Node, blob_id: &str, blob_size: i64) -> Result<Node> {
        let mut attrs = Attributes::new();
        if !blob_id.is_empty() {
            attrs.set_string(keys::BLOB_ID, blob_id);
            attrs.set_int64(keys::BLOB_SIZE, blob_size);
        }
        self.create_node(target, ResourceType::File, attrs)
    }

    pub fn create_symlink(&self, target: &Node, link_target: &str) -> Result<Node> {
        let mut attrs = Attributes::new();
        attrs.set_string(keys::SYMLINK_TARGET, link_target);
        self.create_node(target, ResourceType::Symlink, attrs)
    }

    /// Create a mount point redirecting resolution to `reference`
    pub fn create_reference(&self, target: &Node, reference: &ResourceId) -> Result<Node> {
        if reference.space_id.is_empty() || reference.opaque_id.is_empty() {
            return Err(TreeError::InvalidReference(reference.to_string()));
        }
        let mut attrs = Attributes::new();
        attrs.set_string(keys::REFERENCE, &reference.to_reference_attr());
        self.create_node(target, ResourceType::Reference, attrs)
    }

    #[instrument(skip(self, target, extra), fields(name = %target.name), level = "debug")]
    fn create_node(&self, target: &Node, node_type: ResourceType, extra: Attributes) -> Result<Node> {
        if target.exists {
            return Err(TreeError::AlreadyExists(target.name.clone()));
        }
        validate_name(&target.name)?;

        let parent = Node::read(&self.lookup, &target.space_id, &target.parent_id)?;
        if !parent.is_dir() {
            return Err(TreeError::NotSupported(format!(
                "{} is not a container",
                parent.id
            )));
        }
        let id = if target.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            target.id.clone()
        };

        let node = {
            // the parent may be gone by the time the lock is ours
            let _parent_lock = parent.lock(LockMode::Exclusive)?;
            if !self.lookup.metadata_backend().exists(&parent.internal_path()) {
                return Err(TreeError::NotFound(parent.id.clone()));
            }
            let entry = parent.internal_path().join(&target.name);
            if fs::symlink_metadata(&entry).is_ok() {
                return Err(TreeError::AlreadyExists(target.name.clone()));
            }

            let internal = self.lookup.internal_path(&target.space_id, &id);
            create_placeholder(&internal, node_type).map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => TreeError::AlreadyExists(id.clone()),
                _ => e.into(),
            })?;

            let now = format_time(self.lookup.clock().now());
            let mut attrs = Attributes::new();
            attrs.set_int64(keys::TYPE, node_type.as_i64());
            attrs.set_string(keys::PARENT_ID, &target.parent_id);
            attrs.set_string(keys::NAME, &target.name);
            attrs.set_string(keys::MTIME, &now);
            attrs.set_string(keys::CTIME, &now);
            attrs.merge(extra);
            let written = self
                .lookup
                .metadata_backend()
                .set_multiple(&internal, attrs, true)
                .map_err(TreeError::from)
                .and_then(|()| Node::read_unchecked(&self.lookup, &target.space_id, &id));
            let node = match written {
                Ok(node) => node,
                Err(e) => {
                    self.roll_back(&internal, &id);
                    return Err(e);
                }
            };

            if let Err(e) = symlink(node.link_target(), &entry) {
                self.roll_back(&internal, &id);
                return Err(match e.kind() {
                    io::ErrorKind::AlreadyExists => TreeError::AlreadyExists(target.name.clone()),
                    _ => e.into(),
                });
            }
            node
        };

        parent.set_mtime(self.lookup.clock().now())?;
        log_tree_info!(
            "Created node",
            node_id = id.as_str(),
            parent_id = target.parent_id.as_str(),
            node_type = node_type.as_str(),
        );
        Ok(node)
    }

    /// Move or rename `old` to the placeholder `target`.
    ///
    /// The directory entry moves first, then `parentid` and `name` are
    /// rewritten under the node's lock.
    #[instrument(skip(self, old, target), fields(node_id = %old.id), level = "debug")]
    pub fn move_node(&self, old: &Node, target: &Node) -> Result<()> {
        if old.space_id != target.space_id {
            return Err(TreeError::NotSupported("cross-space move".to_string()));
        }
        if old.is_space_root() {
            return Err(TreeError::NotSupported("moving a space root".to_string()));
        }
        if target.exists {
            return Err(TreeError::AlreadyExists(target.name.clone()));
        }
        validate_name(&target.name)?;

        let new_parent = Node::read(&self.lookup, &target.space_id, &target.parent_id)?;
        if !new_parent.is_dir() {
            return Err(TreeError::NotSupported(format!(
                "{} is not a container",
                new_parent.id
            )));
        }
        if old.is_dir() {
            self.ensure_not_below(old, &new_parent)?;
        }

        let old_entry = old.entry_path();
        let new_entry = new_parent.internal_path().join(&target.name);
        if old_entry == new_entry {
            return Ok(());
        }
        if fs::symlink_metadata(&new_entry).is_ok() {
            return Err(TreeError::AlreadyExists(target.name.clone()));
        }
        fs::rename(&old_entry, &new_entry).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TreeError::NotFound(old.name.clone()),
            _ => e.into(),
        })?;

        {
            let _lock = old.lock(LockMode::Exclusive)?;
            let mut attrs = Attributes::new();
            attrs.set_string(keys::PARENT_ID, &new_parent.id);
            attrs.set_string(keys::NAME, &target.name);
            old.set_xattrs(attrs, false)?;
        }

        let now = self.lookup.clock().now();
        new_parent.set_mtime(now)?;
        if old.parent_id != new_parent.id {
            match old.parent() {
                Ok(old_parent) => old_parent.set_mtime(now)?,
                Err(e) => log_tree_warn!(
                    "Could not touch previous parent",
                    node_id = old.id.as_str(),
                    error = e.to_string().as_str(),
                ),
            }
        }
        log_tree_info!(
            "Moved node",
            node_id = old.id.as_str(),
            from = old.parent_id.as_str(),
            to = new_parent.id.as_str(),
        );
        Ok(())
    }

    fn ensure_not_below(&self, node: &Node, new_parent: &Node) -> Result<()> {
        let mut current = new_parent.clone();
        loop {
            if current.id == node.id {
                return Err(TreeError::NotSupported(format!(
                    "cannot move {} below itself",
                    node.name
                )));
            }
            if current.is_space_root() {
                return Ok(());
            }
            current = current.parent()?;
        }
    }

    /// Remove a leaf: its directory entry, record, lock file and placeholder
    #[instrument(skip(self, node), fields(node_id = %node.id), level = "debug")]
    pub fn delete(&self, node: &Node) -> Result<()> {
        if !node.exists {
            return Err(TreeError::NotFound(node.name.clone()));
        }
        if node.is_space_root() {
            return Err(TreeError::NotSupported("deleting a space root".to_string()));
        }
        {
            let _lock = node.lock(LockMode::Exclusive)?;
            if node.is_dir() && node.has_children()? {
                return Err(TreeError::NotALeaf(node.name.clone()));
            }

            match fs::remove_file(node.entry_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log_tree_warn!("Deleting unlinked node", node_id = node.id.as_str());
                }
                Err(e) => return Err(e.into()),
            }
            self.discard(&node.internal_path())?;
        }

        if let Ok(parent) = node.parent() {
            parent.set_mtime(self.lookup.clock().now())?;
        }
        log_tree_info!("Deleted node", node_id = node.id.as_str());
        Ok(())
    }

    /// Drop the record, placeholder and lock file of a node without an entry.
    /// The record goes first so a later lock holder sees the node as gone.
    fn discard(&self, internal: &Path) -> Result<()> {
        let backend = self.lookup.metadata_backend();
        backend.purge(internal)?;
        remove_placeholder(internal)?;
        ignore_missing(fs::remove_file(backend.lockfile_path(internal)))?;
        Ok(())
    }

    /// Best-effort cleanup of a half-created node, every step is attempted
    fn roll_back(&self, internal: &Path, id: &str) {
        let backend = self.lookup.metadata_backend();
        let steps = [
            backend.purge(internal).map_err(TreeError::from),
            remove_placeholder(internal).map_err(TreeError::from),
            ignore_missing(fs::remove_file(backend.lockfile_path(internal)))
                .map_err(TreeError::from),
        ];
        for step in steps {
            if let Err(e) = step {
                log_tree_warn!(
                    "Could not roll back node",
                    node_id = id,
                    error = e.to_string().as_str(),
                );
            }
        }
    }

    /// Children of a container, sorted by name
    pub fn list_folder(&self, node: &Node) -> Result<Vec<Node>> {
        if !node.is_dir() {
            return Err(TreeError::NotSupported(format!(
                "{} is not a container",
                node.name
            )));
        }
        let names = node.entry_names()?;
        log_tree_debug!(
            "Listing folder",
            node_id = node.id.as_str(),
            entries = names.len(),
        );
        let load = || {
            names
                .par_iter()
                .map(|name| node.child(name))
                .collect::<Result<Vec<_>>>()
        };
        match &self.pool {
            Some(pool) => pool.install(load),
            None => load(),
        }
    }
}

/// Empty directory or file at `internal`; fails if one already exists
fn create_placeholder(internal: &Path, node_type: ResourceType) -> io::Result<()> {
    if let Some(shard) = internal.parent() {
        fs::create_dir_all(shard)?;
    }
    if node_type == ResourceType::Container {
        fs::create_dir(internal)
    } else {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(internal)
            .map(drop)
    }
}

fn remove_placeholder(internal: &Path) -> io::Result<()> {
    if internal.is_dir() {
        ignore_missing(fs::remove_dir(internal))
    } else {
        ignore_missing(fs::remove_file(internal))
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(TreeError::NotSupported(format!("invalid name {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestTree;

    #[test]
    fn test_create_dir_registers_entry() {
        let t = TestTree::new();
        let docs = t.mkdir(&t.space, "docs");
        assert!(docs.exists);
        assert!(docs.is_dir());
        assert_eq!(docs.parent_id, t.space.id);
        assert!(docs.internal_path().is_dir());
        assert_eq!(
            t.lookup().node_id_from_parent_and_name(&t.space, "docs").unwrap(),
            docs.id
        );
    }

    #[test]
    fn test_create_duplicate_name() {
        let t = TestTree::new();
        t.mkdir(&t.space, "docs");
        let err = t.tree.create_dir(&t.space.new_child("docs")).unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists(ref n) if n == "docs"));
    }

    #[test]
    fn test_create_with_given_id() {
        let t = TestTree::new();
        let mut target = t.space.new_child("fixed");
        target.id = "0011223344556677".to_string();
        let node = t.tree.create_dir(&target).unwrap();
        assert_eq!(node.id, "0011223344556677");
        assert_eq!(t.space.child("fixed").unwrap().id, node.id);
    }

    #[test]
    fn test_create_with_taken_id() {
        let t = TestTree::new();
        let file = t.touch(&t.space, "a.txt");
        let mut target = t.space.new_child("b.txt");
        target.id = file.id.clone();

        let err = t.tree.touch_file(&target, "blob", 1).unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists(ref id) if *id == file.id));
        assert!(t.space.child("b.txt").unwrap_err().is_not_found());
        assert_eq!(
            Node::read(t.lookup(), &t.space.id, &file.id).unwrap().name,
            "a.txt"
        );
    }

    #[test]
    fn test_failed_record_write_removes_placeholder() {
        let t = TestTree::new();
        let mut target = t.space.new_child("docs");
        target.id = "aabbccddeeff".to_string();
        let internal = t.lookup().internal_path(&t.space.id, &target.id);
        let record = t.lookup().metadata_backend().metadata_path(&internal);
        fs::create_dir_all(record.join("stuck")).unwrap();

        assert!(t.tree.create_dir(&target).is_err());
        assert!(!internal.exists());
        assert!(t.space.child("docs").unwrap_err().is_not_found());
    }

    #[test]
    fn test_invalid_names() {
        let t = TestTree::new();
        for name in ["", ".", "..", "a/b"] {
            let err = t.tree.create_dir(&t.space.new_child(name)).unwrap_err();
            assert!(matches!(err, TreeError::NotSupported(_)), "{name:?}");
        }
    }

    #[test]
    fn test_create_below_file_is_rejected() {
        let t = TestTree::new();
        let file = t.touch(&t.space, "a.txt");
        let err = t.tree.create_dir(&file.new_child("x")).unwrap_err();
        assert!(matches!(err, TreeError::NotSupported(_)));
    }

    #[test]
    fn test_symlink_and_reference_attrs() {
        let t = TestTree::new();
        let link = t
            .tree
            .create_symlink(&t.space.new_child("ln"), "../elsewhere")
            .unwrap();
        assert_eq!(link.node_type(), ResourceType::Symlink);
        assert_eq!(link.symlink_target().unwrap(), "../elsewhere");

        let target = ResourceId::new("other-space", "other-node");
        let mount = t
            .tree
            .create_reference(&t.space.new_child("mnt"), &target)
            .unwrap();
        assert_eq!(mount.node_type(), ResourceType::Reference);
        assert_eq!(mount.reference_target().unwrap(), target);

        let err = t
            .tree
            .create_reference(&t.space.new_child("bad"), &ResourceId::space_root("x"))
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidReference(_)));
    }

    #[test]
    fn test_rename_in_place() {
        let t = TestTree::new();
        let file = t.touch(&t.space, "old.txt");
        t.tree.move_node(&file, &t.space.new_child("new.txt")).unwrap();

        assert!(t.space.child("old.txt").unwrap_err().is_not_found());
        let moved = t.space.child("new.txt").unwrap();
        assert_eq!(moved.id, file.id);
        assert_eq!(moved.name, "new.txt");
    }

    #[test]
    fn test_move_across_parents_keeps_id() {
        let t = TestTree::new();
        let a = t.mkdir(&t.space, "a");
        let b = t.mkdir(&t.space, "b");
        let file = t.touch(&a, "f");

        t.tree.move_node(&file, &b.new_child("g")).unwrap();
        let moved = t.lookup().walk_path(&t.space, "b/g", false, |_| Ok(())).unwrap();
        assert_eq!(moved.id, file.id);
        assert_eq!(moved.parent_id, b.id);
        assert_eq!(t.lookup().path(&moved, |_| true).unwrap(), "/b/g");
        assert!(a.child("f").is_err());
    }

    #[test]
    fn test_move_onto_existing_name() {
        let t = TestTree::new();
        let file = t.touch(&t.space, "a");
        t.touch(&t.space, "b");
        let target = t
            .lookup()
            .walk_path_for_create(&t.space, "b", false, |_| Ok(()))
            .unwrap();
        assert!(target.exists);
        let err = t.tree.move_node(&file, &target).unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists(_)));
    }

    #[test]
    fn test_move_below_itself() {
        let t = TestTree::new();
        let a = t.mkdir(&t.space, "a");
        let inner = t.mkdir(&a, "inner");
        let err = t.tree.move_node(&a, &inner.new_child("a")).unwrap_err();
        assert!(matches!(err, TreeError::NotSupported(_)));
        let err = t.tree.move_node(&a, &a.new_child("a")).unwrap_err();
        assert!(matches!(err, TreeError::NotSupported(_)));
    }

    #[test]
    fn test_delete_leaf() {
        let t = TestTree::new();
        let docs = t.mkdir(&t.space, "docs");
        let file = t.touch(&docs, "a.txt");
        let internal = file.internal_path();

        t.tree.delete(&file).unwrap();
        assert!(docs.child("a.txt").unwrap_err().is_not_found());
        assert!(!internal.exists());
        assert!(!t.lookup().metadata_backend().exists(&internal));

        t.tree.delete(&docs).unwrap();
        assert!(t.space.child("docs").is_err());
    }

    #[test]
    fn test_delete_reports_unremovable_record() {
        let t = TestTree::new();
        let file = t.touch(&t.space, "a.txt");
        let record = t
            .lookup()
            .metadata_backend()
            .metadata_path(&file.internal_path());
        fs::remove_file(&record).unwrap();
        fs::create_dir_all(record.join("stuck")).unwrap();

        let err = t.tree.delete(&file).unwrap_err();
        assert!(!err.is_not_found(), "{err:?}");
        assert!(record.exists());
    }

    #[test]
    fn test_create_into_parent_removed_while_waiting() {
        let t = TestTree::new();
        let docs = t.mkdir(&t.space, "docs");
        let target = docs.new_child("late.txt");

        let lock = docs.lock(LockMode::Exclusive).unwrap();
        std::thread::scope(|scope| {
            let create = scope.spawn(|| t.tree.touch_file(&target, "blob", 1));
            std::thread::sleep(std::time::Duration::from_millis(50));
            // remove docs the way delete does while the create is waiting
            t.tree.discard(&docs.internal_path()).unwrap();
            drop(lock);

            let err = create.join().unwrap().unwrap_err();
            assert!(err.is_not_found(), "{err:?}");
        });
        assert!(!docs.internal_path().exists());
    }

    #[test]
    fn test_delete_space_root() {
        let t = TestTree::new();
        assert!(matches!(
            t.tree.delete(&t.space),
            Err(TreeError::NotSupported(_))
        ));
    }

    #[test]
    fn test_list_folder() {
        let t = TestTree::new();
        let docs = t.mkdir(&t.space, "docs");
        for name in ["c", "a", "b"] {
            t.touch(&docs, name);
        }
        let names: Vec<_> = t
            .tree
            .list_folder(&docs)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(t.tree.list_folder(&docs.child("a").unwrap()).is_err());
    }

    #[test]
    fn test_list_folder_with_dedicated_pool() {
        let t = TestTree::with_list_concurrency(2);
        for i in 0..8 {
            t.touch(&t.space, &format!("f{i}"));
        }
        assert_eq!(t.tree.list_folder(&t.space).unwrap().len(), 8);
    }

    #[test]
    fn test_create_touches_parent_mtime() {
        let t = TestTree::new();
        let before = t.space.mtime().unwrap();
        t.clock.advance(chrono::Duration::seconds(1));
        t.mkdir(&t.space, "docs");
        let root = t.lookup().node_from_space_id(&t.space.id).unwrap();
        assert!(root.mtime().unwrap() > before);
    }
}
