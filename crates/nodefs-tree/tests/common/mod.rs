//! Shared fixture for nodefs-tree integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nodefs_config::testing::TestEnvironment;
use nodefs_tree::{FixedClock, Lookup, LookupOptions, Node, Owner, SpaceType, Tree};
use nodefs_xattr::{LockOptions, SidecarBackend};

pub struct Store {
    pub env: TestEnvironment,
    pub clock: Arc<FixedClock>,
    pub tree: Tree,
    pub space: Node,
}

impl Store {
    pub fn new() -> Self {
        let env = TestEnvironment::new().unwrap();
        let config = env.config();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let lookup = Lookup::new(
            LookupOptions::from_config(&config),
            Arc::new(SidecarBackend::new(LockOptions::new(
                config.lock.max_retries,
                config.lock.initial_delay_ms,
            ))),
            clock.clone(),
        );
        let tree = Tree::new(lookup).unwrap();
        let space = tree
            .create_space(SpaceType::Project, "projects", &Owner::new("admin", "idp"))
            .unwrap();
        Self {
            env,
            clock,
            tree,
            space,
        }
    }

    pub fn lookup(&self) -> &Lookup {
        self.tree.lookup()
    }

    pub fn mkdir(&self, parent: &Node, name: &str) -> Node {
        self.tree.create_dir(&parent.new_child(name)).unwrap()
    }

    pub fn touch(&self, parent: &Node, name: &str, size: i64) -> Node {
        self.tree
            .touch_file(&parent.new_child(name), &format!("blob-{name}"), size)
            .unwrap()
    }

    /// Create every directory of `path` below the space root
    pub fn mkdir_p(&self, path: &str) -> Node {
        let mut current = self.space.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match current.child(segment) {
                Ok(existing) => existing,
                Err(_) => self.mkdir(&current, segment),
            };
        }
        current
    }
}
