//! Consistency check over all records of one space.
//!
//! Detects the damage an interrupted create, move or delete can leave
//! behind: records missing mandatory attributes, records without a matching
//! directory entry and entries pointing at no record.

use std::fs;
use std::path::{Path, PathBuf};

use nodefs_config::log_tree_warn;
use nodefs_xattr::sidecar::METADATA_SUFFIX;
use walkdir::WalkDir;

use crate::error::{Result, TreeError};
use crate::lookup::Lookup;
use crate::node::Node;
use crate::pathify;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Complete records found
    pub nodes: usize,
    /// Node ids whose record lacks type, parent id or name
    pub incomplete: Vec<String>,
    /// Node ids not registered in their recorded parent
    pub orphans: Vec<String>,
    /// Directory entries whose target record does not exist
    pub dangling: Vec<PathBuf>,
    /// Sum of blob sizes of all linked nodes
    pub total_blob_size: i64,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.incomplete.is_empty() && self.orphans.is_empty() && self.dangling.is_empty()
    }
}

impl Lookup {
    /// Walk every record below the `nodes/` directory of `space_id`
    pub fn check_space(&self, space_id: &str) -> Result<CheckReport> {
        let nodes_dir = pathify::nodes_dir(self.internal_root(), space_id);
        if !nodes_dir.is_dir() {
            return Err(TreeError::NotFound(space_id.to_string()));
        }

        let mut report = CheckReport::default();
        for entry in WalkDir::new(&nodes_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| TreeError::Internal(e.to_string()))?;
            let path = entry.path();

            if entry.path_is_symlink() {
                let target = fs::read_link(path)?;
                let id = pathify::node_id_from_link(&target);
                if !self.metadata_backend().exists(&self.internal_path(space_id, &id)) {
                    log_tree_warn!(
                        "Dangling directory entry",
                        entry = path.display().to_string().as_str(),
                    );
                    report.dangling.push(path.to_path_buf());
                }
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !entry.file_type().is_file() || !file_name.ends_with(METADATA_SUFFIX) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&nodes_dir) else {
                continue;
            };
            let relative = relative.to_string_lossy();
            let record = relative.strip_suffix(METADATA_SUFFIX).unwrap_or(&relative);
            let id = pathify::node_id_from_relative(Path::new(record));

            let node = match Node::read_unchecked(self, space_id, &id) {
                Ok(node) => node,
                Err(TreeError::IncompleteNode { .. }) => {
                    report.incomplete.push(id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.nodes += 1;
            if node.is_space_root() || self.is_linked(&node) {
                report.total_blob_size += node.blobsize;
            } else {
                report.orphans.push(id);
            }
        }
        Ok(report)
    }

    fn is_linked(&self, node: &Node) -> bool {
        match Node::read_unchecked(self, &node.space_id, &node.parent_id) {
            Ok(parent) => self
                .node_id_from_parent_and_name(&parent, &node.name)
                .map(|id| id == node.id)
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}
