//! Attribute names persisted on every node record.
//!
//! All keys live below the `user.nodefs.` namespace so that a record can be
//! mirrored into real extended attributes without clashing with other tools.

pub const PREFIX: &str = "user.nodefs.";

/// Node type, stored as the decimal resource type number
pub const TYPE: &str = "user.nodefs.type";
pub const PARENT_ID: &str = "user.nodefs.parentid";
/// Base name of the node, rewritten on rename and move
pub const NAME: &str = "user.nodefs.name";

pub const BLOB_ID: &str = "user.nodefs.blobid";
/// Decimal byte size of the blob
pub const BLOB_SIZE: &str = "user.nodefs.blobsize";

pub const OWNER_ID: &str = "user.nodefs.owner.id";
pub const OWNER_IDP: &str = "user.nodefs.owner.idp";
pub const OWNER_TYPE: &str = "user.nodefs.owner.type";

/// Modification time, RFC3339 with nanoseconds
pub const MTIME: &str = "user.nodefs.mtime";
/// Creation time, RFC3339 with nanoseconds
pub const CTIME: &str = "user.nodefs.ctime";

/// Reference target in the form `cs3:<spaceID>/<nodeID>`
pub const REFERENCE: &str = "user.nodefs.cs3.ref";
pub const SYMLINK_TARGET: &str = "user.nodefs.symlink.target";

pub const SPACE_NAME: &str = "user.nodefs.space.name";
pub const SPACE_TYPE: &str = "user.nodefs.space.type";

/// Prefix of all grant attributes, followed by the principal
pub const GRANT_PREFIX: &str = "user.nodefs.grant.";
pub const GRANT_USER_PREFIX: &str = "user.nodefs.grant.u:";
pub const GRANT_GROUP_PREFIX: &str = "user.nodefs.grant.g:";

pub const USER_ACE_PREFIX: &str = "u:";
pub const GROUP_ACE_PREFIX: &str = "g:";

/// Attribute key holding the grant of `principal`
pub fn grant_key(principal: &str) -> String {
    format!("{GRANT_PREFIX}{principal}")
}

/// True for keys that must be present on a complete node record
pub fn is_mandatory(key: &str) -> bool {
    matches!(key, TYPE | PARENT_ID | NAME)
}
