//! Path resolution and reconstruction over a real on-disk store

mod common;

use std::fs;

use common::Store;
use nodefs_tree::{ErrorKind, Reference, ResourceId, ResourceType, TreeError};
use walkdir::WalkDir;

fn no_check(_: &nodefs_tree::Node) -> nodefs_tree::Result<()> {
    Ok(())
}

#[test]
fn test_docs_a_txt_walk_and_path() {
    let s = Store::new();
    let docs = s.mkdir(&s.space, "docs");
    let file = s.touch(&docs, "a.txt", 12);

    let found = s
        .lookup()
        .walk_path(&s.space, "docs/a.txt", false, no_check)
        .unwrap();
    assert_eq!(found.id, file.id);
    assert_eq!(found.node_type(), ResourceType::File);
    assert_eq!(found.blob_id, "blob-a.txt");
    assert_eq!(found.blobsize, 12);

    assert_eq!(s.lookup().path(&found, |_| true).unwrap(), "/docs/a.txt");
}

#[test]
fn test_walk_then_path_roundtrip() {
    let s = Store::new();
    let paths = [
        "a",
        "a/b",
        "a/b/c",
        "a/b/c/deep.bin",
        "x/y",
        "x/y/with space.txt",
        "x/ünïcode",
    ];
    for path in paths {
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (s.mkdir_p(dir), name),
            None => (s.space.clone(), path),
        };
        if dir.child(name).is_err() {
            s.mkdir(&dir, name);
        }
    }

    for path in paths {
        let node = s.lookup().walk_path(&s.space, path, false, no_check).unwrap();
        assert_eq!(s.lookup().path(&node, |_| true).unwrap(), format!("/{path}"));

        let slashed = format!("/{path}/");
        let again = s.lookup().walk_path(&s.space, &slashed, false, no_check).unwrap();
        assert_eq!(again.id, node.id);
    }
}

#[test]
fn test_missing_intermediate_segment() {
    let s = Store::new();
    let docs = s.mkdir(&s.space, "docs");
    s.touch(&docs, "a.txt", 1);

    let err = s
        .lookup()
        .walk_path(&s.space, "docs/missing/x", false, no_check)
        .unwrap_err();
    assert!(matches!(err, TreeError::NotFound(ref seg) if seg == "missing"));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = s
        .lookup()
        .walk_path(&s.space, "docs/a.txt/extra", false, no_check)
        .unwrap_err();
    assert!(matches!(err, TreeError::NotFound(ref seg) if seg == "extra"));

    // create-style walks still need every intermediate segment
    let err = s
        .lookup()
        .walk_path_for_create(&s.space, "docs/missing/x", false, no_check)
        .unwrap_err();
    assert!(matches!(err, TreeError::NotFound(ref seg) if seg == "missing"));
}

#[test]
fn test_strict_and_create_walks_differ_on_last_segment() {
    let s = Store::new();
    let docs = s.mkdir(&s.space, "docs");

    let err = s
        .lookup()
        .walk_path(&s.space, "docs/new.txt", false, no_check)
        .unwrap_err();
    assert!(err.is_not_found());

    let target = s
        .lookup()
        .walk_path_for_create(&s.space, "docs/new.txt", false, no_check)
        .unwrap();
    assert!(!target.exists);
    assert_eq!(target.parent_id, docs.id);
    assert_eq!(target.name, "new.txt");

    let created = s.tree.touch_file(&target, "blob", 3).unwrap();
    let found = s
        .lookup()
        .walk_path(&s.space, "docs/new.txt", false, no_check)
        .unwrap();
    assert_eq!(found.id, created.id);
}

#[test]
fn test_node_from_resource_for_create() {
    let s = Store::new();
    s.mkdir(&s.space, "docs");
    let reference = Reference::new(ResourceId::space_root(&s.space.id), "docs/report.pdf");

    assert!(s.lookup().node_from_resource(&reference).unwrap_err().is_not_found());
    let target = s.lookup().node_from_resource_for_create(&reference).unwrap();
    assert!(!target.exists);
    assert_eq!(target.name, "report.pdf");
}

#[test]
fn test_path_stops_at_permission_boundary() {
    let s = Store::new();
    let inner = s.mkdir_p("secret/inner");
    let file = s.touch(&inner, "a.txt", 1);

    let path = s
        .lookup()
        .path(&file, |ancestor| ancestor.id != inner.id)
        .unwrap();
    assert_eq!(path, "/a.txt");

    let path = s
        .lookup()
        .path(&file, |ancestor| ancestor.name != "secret")
        .unwrap();
    assert_eq!(path, "/inner/a.txt");
}

#[test]
fn test_path_of_orphan_names_missing_parent() {
    let s = Store::new();
    let docs = s.mkdir(&s.space, "docs");
    let file = s.touch(&docs, "a.txt", 1);
    s.lookup()
        .metadata_backend()
        .purge(&docs.internal_path())
        .unwrap();

    let err = s.lookup().path(&file, |_| true).unwrap_err();
    assert!(matches!(err, TreeError::NotFound(ref id) if *id == docs.id));
}

#[test]
fn test_references_are_followed() {
    let s = Store::new();
    let other = s
        .tree
        .create_space(
            nodefs_tree::SpaceType::Project,
            "shared",
            &nodefs_tree::Owner::new("bob", "idp"),
        )
        .unwrap();
    let shared_dir = s.mkdir(&other, "shared-docs");
    let shared_file = s.touch(&shared_dir, "plan.md", 7);

    let mount = s
        .tree
        .create_reference(&s.space.new_child("mnt"), &shared_dir.resource_id())
        .unwrap();
    assert_eq!(mount.node_type(), ResourceType::Reference);

    let through = s
        .lookup()
        .walk_path(&s.space, "mnt/plan.md", true, no_check)
        .unwrap();
    assert_eq!(through.id, shared_file.id);
    assert_eq!(through.space_id, other.id);
    assert_eq!(s.lookup().path(&through, |_| true).unwrap(), "/shared-docs/plan.md");

    // without following, the reference is a leaf
    let err = s
        .lookup()
        .walk_path(&s.space, "mnt/plan.md", false, no_check)
        .unwrap_err();
    assert!(err.is_not_found());

    let mount_root = s
        .tree
        .create_reference(&s.space.new_child("whole"), &nodefs_tree::ResourceId::new(&other.id, &other.id))
        .unwrap();
    let root = s
        .lookup()
        .walk_path(&s.space, "whole", true, no_check)
        .unwrap();
    assert_ne!(root.id, mount_root.id);
    assert!(root.is_space_root());
    assert_eq!(root.space_root_id, other.id);
}

#[test]
fn test_broken_reference_is_invalid() {
    let s = Store::new();
    let mount = s
        .tree
        .create_reference(&s.space.new_child("mnt"), &ResourceId::new("gone", "gone-node"))
        .unwrap();
    mount
        .set_xattr(nodefs_xattr::keys::REFERENCE, b"not-a-reference")
        .unwrap();

    let err = s
        .lookup()
        .walk_path(&s.space, "mnt", true, no_check)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_delete_non_leaf_leaves_store_untouched() {
    let s = Store::new();
    let docs = s.mkdir(&s.space, "docs");
    s.touch(&docs, "a.txt", 1);

    let snapshot = || -> Vec<(String, Vec<u8>)> {
        WalkDir::new(&s.env.storage_root)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| !e.file_name().to_string_lossy().ends_with(".mlock"))
            .map(|e| {
                let content = if e.file_type().is_file() {
                    fs::read(e.path()).unwrap()
                } else {
                    Vec::new()
                };
                (e.path().display().to_string(), content)
            })
            .collect()
    };
    let before = snapshot();

    let err = s.tree.delete(&docs).unwrap_err();
    assert!(matches!(err, TreeError::NotALeaf(ref name) if name == "docs"));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(snapshot(), before);
}
