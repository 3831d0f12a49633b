//! Resource identifiers and the small value types shared by lookup and tree.

use std::fmt;

use crate::error::{Result, TreeError};

/// Scheme of the reference attribute value
pub const REFERENCE_SCHEME: &str = "cs3:";

/// Stored as the decimal value in the type attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Invalid = 0,
    File = 1,
    Container = 2,
    Reference = 3,
    Symlink = 4,
}

impl ResourceType {
    pub fn from_i64(value: i64) -> ResourceType {
        match value {
            1 => ResourceType::File,
            2 => ResourceType::Container,
            3 => ResourceType::Reference,
            4 => ResourceType::Symlink,
            _ => ResourceType::Invalid,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Invalid => "invalid",
            ResourceType::File => "file",
            ResourceType::Container => "container",
            ResourceType::Reference => "reference",
            ResourceType::Symlink => "symlink",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node: `(space_id, opaque_id)`.
///
/// An empty `opaque_id` addresses the root of the space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceId {
    pub space_id: String,
    pub opaque_id: String,
}

impl ResourceId {
    pub fn new(space_id: impl Into<String>, opaque_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// Root of `space_id`
    pub fn space_root(space_id: impl Into<String>) -> Self {
        Self::new(space_id, "")
    }

    /// Value of the reference attribute pointing at this resource
    pub fn to_reference_attr(&self) -> String {
        format!("{REFERENCE_SCHEME}{}/{}", self.space_id, self.opaque_id)
    }

    /// Parse `cs3:<space>/<node>`
    pub fn from_reference_attr(value: &str) -> Result<ResourceId> {
        let rest = value
            .strip_prefix(REFERENCE_SCHEME)
            .ok_or_else(|| TreeError::InvalidReference(format!("missing scheme in {value:?}")))?;
        let (space_id, opaque_id) = rest
            .split_once('/')
            .ok_or_else(|| TreeError::InvalidReference(format!("missing node id in {value:?}")))?;
        if space_id.is_empty() || opaque_id.is_empty() || opaque_id.contains('/') {
            return Err(TreeError::InvalidReference(value.to_string()));
        }
        Ok(ResourceId::new(space_id, opaque_id))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.space_id, self.opaque_id)
    }
}

/// External reference: a resource id plus an optional relative path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reference {
    pub resource_id: Option<ResourceId>,
    pub path: String,
}

impl Reference {
    pub fn new(resource_id: ResourceId, path: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id),
            path: path.into(),
        }
    }
}

/// Opaque caller identity as handed in by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub id: String,
    pub groups: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Owner {
    pub id: String,
    pub idp: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, idp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            idp: idp.into(),
        }
    }
}
