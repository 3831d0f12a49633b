use std::fmt;
use std::fs;

use nodefs_config::log_tree_info;
use nodefs_xattr::{keys, Attributes};

use crate::error::{Result, TreeError};
use crate::node::{format_time, Node, ROOT_PARENT_ID};
use crate::resource::{Owner, ResourceType};
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceType {
    /// Space id is the owner's user id
    Personal,
    Project,
}

impl SpaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SpaceType::Personal => "personal",
            SpaceType::Project => "project",
        }
    }

    pub fn parse(s: &str) -> Option<SpaceType> {
        match s {
            "personal" => Some(SpaceType::Personal),
            "project" => Some(SpaceType::Project),
            _ => None,
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tree {
    /// Create the root node of a new space and return it
    pub fn create_space(&self, space_type: SpaceType, name: &str, owner: &Owner) -> Result<Node> {
        let space_id = match space_type {
            SpaceType::Personal if owner.id.is_empty() => {
                return Err(TreeError::NotSupported(
                    "personal space without owner id".to_string(),
                ))
            }
            SpaceType::Personal => owner.id.clone(),
            SpaceType::Project => uuid::Uuid::new_v4().to_string(),
        };

        let lookup = self.lookup();
        let backend = lookup.metadata_backend();
        let internal = lookup.internal_path(&space_id, &space_id);
        if backend.exists(&internal) {
            return Err(TreeError::AlreadyExists(space_id));
        }
        fs::create_dir_all(&internal)?;

        let now = format_time(lookup.clock().now());
        let mut attrs = Attributes::new();
        attrs.set_int64(keys::TYPE, ResourceType::Container.as_i64());
        attrs.set_string(keys::PARENT_ID, ROOT_PARENT_ID);
        attrs.set_string(keys::NAME, name);
        attrs.set_string(keys::OWNER_ID, &owner.id);
        attrs.set_string(keys::OWNER_IDP, &owner.idp);
        attrs.set_string(keys::SPACE_TYPE, space_type.as_str());
        attrs.set_string(keys::SPACE_NAME, name);
        attrs.set_string(keys::MTIME, &now);
        attrs.set_string(keys::CTIME, &now);
        backend.set_multiple(&internal, attrs, true)?;

        log_tree_info!(
            "Created space",
            space_id = space_id.as_str(),
            space_type = space_type.as_str(),
        );
        lookup.node_from_space_id(&space_id)
    }
}
