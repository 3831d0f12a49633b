//! Path helpers shared by the config loader and the CLI.

use std::path::{Path, PathBuf};

/// Expand a leading `~/` to the user's home directory.
///
/// Paths without the prefix, and all paths when no home directory can be
/// determined, are returned unchanged.
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Check if a path is within a directory (security check for path traversal).
///
/// Both paths are canonicalized before comparison to handle symlinks and `..`.
/// Returns false if either path cannot be canonicalized.
pub fn is_within_directory(path: impl AsRef<Path>, dir: impl AsRef<Path>) -> bool {
    match (path.as_ref().canonicalize(), dir.as_ref().canonicalize()) {
        (Ok(canonical_path), Ok(canonical_dir)) => canonical_path.starts_with(&canonical_dir),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/srv/nodefs"), PathBuf::from("/srv/nodefs"));
        assert_eq!(expand_tilde("relative/dir"), PathBuf::from("relative/dir"));
    }

    #[test]
    fn test_expand_tilde_uses_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/.nodefs"), home.join(".nodefs"));
        }
    }

    #[test]
    fn test_is_within_directory() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("spaces");
        std::fs::create_dir_all(&inner).unwrap();

        assert!(is_within_directory(&inner, temp.path()));
        assert!(!is_within_directory(temp.path(), &inner));
        assert!(!is_within_directory(temp.path().join("missing"), temp.path()));
    }
}
