//! # nodefs-tree
//!
//! Files and directories as independently addressable nodes.
//!
//! Every node is identified by `(space_id, node_id)` and stored at a sharded
//! location below the storage root:
//!
//! ```text
//! <root>/spaces/<pathify(space, 1, 2)>/nodes/<pathify(node, 4, 2)>
//! ```
//!
//! The tree structure is a set of parent links. A directory holds one
//! symlink per child, named after the child and pointing at the child's
//! location, so renames and moves never change a node id.
//!
//! - [`Lookup`] resolves references and paths to [`Node`]s and back
//! - [`Tree`] creates, moves, deletes and lists nodes
//! - grants live on nodes as ACE attributes, see [`Node::add_grant`]

pub mod check;
pub mod clock;
pub mod error;
pub mod grants;
pub mod lookup;
pub mod node;
pub mod pathify;
pub mod resource;
pub mod space;
pub mod tree;

#[cfg(test)]
mod testing;

pub use check::CheckReport;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, Result, TreeError};
pub use grants::AccessDecision;
pub use lookup::{Lookup, LookupOptions};
pub use node::{Node, ROOT_PARENT_ID};
pub use resource::{Owner, Reference, ResourceId, ResourceType, User};
pub use space::SpaceType;
pub use tree::Tree;
