//! Sharded on-disk addressing.
//!
//! ```text
//! <root>/spaces/<pathify(space, 1, 2)>/nodes/<pathify(node, 4, 2)>
//! ```
//!
//! Directory entries are symlinks named after the child, inside the parent's
//! node directory, pointing at `../../../../../<pathify(child, 4, 2)>`.

use std::path::{Path, PathBuf};

/// Depth of the node id shard
pub const NODE_SHARD_DEPTH: usize = 4;
/// Depth of the space id shard
pub const SPACE_SHARD_DEPTH: usize = 1;
pub const SHARD_WIDTH: usize = 2;

/// Split the start of `id` into `depth` segments of `width` characters.
///
/// Stops early when fewer than `width + 1` characters would remain, so the
/// final component is never empty.
///
/// ```
/// # use nodefs_tree::pathify::pathify;
/// assert_eq!(pathify("aabbccdd", 3, 1), "a/a/b/bccdd");
/// assert_eq!(pathify("ab", 4, 2), "ab");
/// ```
pub fn pathify(id: &str, depth: usize, width: usize) -> String {
    let chars: Vec<char> = id.chars().collect();
    let mut out = String::with_capacity(id.len() + depth);
    let mut i = 0;
    while i < depth {
        if chars.len() <= i * width + width {
            break;
        }
        out.extend(&chars[i * width..i * width + width]);
        out.push('/');
        i += 1;
    }
    out.extend(&chars[(i * width).min(chars.len())..]);
    out
}

/// Directory holding all spaces
pub fn spaces_dir(root: &Path) -> PathBuf {
    root.join("spaces")
}

/// Directory holding all node records of `space_id`
pub fn nodes_dir(root: &Path, space_id: &str) -> PathBuf {
    spaces_dir(root)
        .join(pathify(space_id, SPACE_SHARD_DEPTH, SHARD_WIDTH))
        .join("nodes")
}

/// Location of a node inside the store
pub fn internal_path(root: &Path, space_id: &str, node_id: &str) -> PathBuf {
    nodes_dir(root, space_id).join(pathify(node_id, NODE_SHARD_DEPTH, SHARD_WIDTH))
}

/// Symlink target of the directory entry for `node_id`
pub fn link_target(node_id: &str) -> PathBuf {
    let mut target = PathBuf::from("../../../../..");
    target.push(pathify(node_id, NODE_SHARD_DEPTH, SHARD_WIDTH));
    target
}

/// Node id encoded in a directory entry target
pub fn node_id_from_link(target: &Path) -> String {
    target
        .to_string_lossy()
        .trim_start_matches(|c: char| c == '/' || c == '.')
        .replace('/', "")
}

/// Rebuild a node id from a path relative to a `nodes/` directory
pub fn node_id_from_relative(relative: &Path) -> String {
    relative.to_string_lossy().replace('/', "")
}
