//! Fixture shared by the unit tests of this crate.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nodefs_xattr::{LockOptions, SidecarBackend};
use tempfile::TempDir;

use crate::clock::FixedClock;
use crate::lookup::{Lookup, LookupOptions};
use crate::node::Node;
use crate::resource::Owner;
use crate::space::SpaceType;
use crate::tree::Tree;

pub struct TestTree {
    _temp: TempDir,
    pub clock: Arc<FixedClock>,
    pub tree: Tree,
    pub space: Node,
}

impl TestTree {
    pub fn new() -> Self {
        Self::build(|_| {})
    }

    pub fn with_grant_limit(limit: Option<usize>) -> Self {
        Self::build(|o| o.max_grants_per_node = limit)
    }

    pub fn with_list_concurrency(threads: usize) -> Self {
        Self::build(|o| o.list_concurrency = threads)
    }

    fn build(configure: impl FnOnce(&mut LookupOptions)) -> Self {
        let temp = TempDir::new().unwrap();
        let mut options = LookupOptions::new(temp.path().join("storage"));
        configure(&mut options);

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let backend = Arc::new(SidecarBackend::new(LockOptions::new(3, 1)));
        let lookup = Lookup::new(options, backend, clock.clone());
        let tree = Tree::new(lookup).unwrap();
        let space = tree
            .create_space(SpaceType::Project, "test", &Owner::new("owner", "idp"))
            .unwrap();
        Self {
            _temp: temp,
            clock,
            tree,
            space,
        }
    }

    pub fn lookup(&self) -> &Lookup {
        self.tree.lookup()
    }

    pub fn root(&self) -> PathBuf {
        self.lookup().internal_root().to_path_buf()
    }

    pub fn mkdir(&self, parent: &Node, name: &str) -> Node {
        self.tree.create_dir(&parent.new_child(name)).unwrap()
    }

    /// File with blob `blob-<name>` of 5 bytes
    pub fn touch(&self, parent: &Node, name: &str) -> Node {
        self.tree
            .touch_file(&parent.new_child(name), &format!("blob-{name}"), 5)
            .unwrap()
    }
}
