//! Grants on nodes and permission assembly along the tree

mod common;

use common::Store;
use nodefs_ace::{Ace, AceType, Grant, Grantee, Permissions, Timestamp};
use nodefs_tree::{Clock, ErrorKind, TreeError, User};
use nodefs_xattr::keys;

#[test]
fn test_allow_rw_ace_on_file() {
    let s = Store::new();
    let file = s.touch(&s.space, "a.txt", 1);

    let ace = Ace {
        permissions: "rw".into(),
        ..Ace::from_grant(&Grant::new(Grantee::User("alice".into()), Permissions::STAT))
    };
    let (principal, value) = ace.marshal();
    file.set_xattr(&keys::grant_key(&principal), &value).unwrap();

    let granted = file
        .read_grant(&Grantee::User("alice".into()))
        .unwrap()
        .permissions;
    assert_eq!(granted, Permissions::READ_FAMILY | Permissions::WRITE_FAMILY);
}

#[test]
fn test_deny_ace_ignores_letters() {
    let s = Store::new();
    let file = s.touch(&s.space, "a.txt", 1);

    let mut ace = Ace::from_grant(&Grant::new(Grantee::User("bob".into()), Permissions::editor()));
    ace.ace_type = AceType::Deny;
    let (principal, value) = ace.marshal();
    file.set_xattr(&keys::grant_key(&principal), &value).unwrap();

    let bob = User::new("bob");
    assert!(file
        .read_grant(&Grantee::User("bob".into()))
        .unwrap()
        .permissions
        .is_empty());
    assert!(file.is_denied(&bob));
    assert_eq!(
        s.lookup().assemble_permissions(&file, &bob).unwrap(),
        Permissions::empty()
    );
}

#[test]
fn test_corrupted_grant_surfaces_encoding_error() {
    let s = Store::new();
    let file = s.touch(&s.space, "a.txt", 1);
    file.add_grant(&Grant::new(Grantee::User("alice".into()), Permissions::viewer()))
        .unwrap();

    let key = keys::grant_key("u:alice");
    let mut value = file.xattr(&key).unwrap();
    value[0] = 0x01;
    file.set_xattr(&key, &value).unwrap();

    let err = file.read_grant(&Grantee::User("alice".into())).unwrap_err();
    assert!(matches!(err, TreeError::InconsistentEncoding(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_permissions_accumulate_up_to_space_root() {
    let s = Store::new();
    let projects = s.mkdir(&s.space, "projects");
    let alpha = s.mkdir(&projects, "alpha");
    let file = s.touch(&alpha, "spec.md", 1);

    projects
        .add_grant(&Grant::new(Grantee::Group("staff".into()), Permissions::viewer()))
        .unwrap();
    alpha
        .add_grant(&Grant::new(Grantee::User("carol".into()), Permissions::DELETE))
        .unwrap();

    let carol = User::new("carol").with_groups(["staff"]);
    let granted = s.lookup().assemble_permissions(&file, &carol).unwrap();
    assert!(granted.contains(Permissions::viewer().effective()));
    assert!(granted.contains(Permissions::DELETE));

    let outsider = User::new("dave");
    assert!(s.lookup().assemble_permissions(&file, &outsider).unwrap().is_empty());

    let owner = User::new("admin");
    assert_eq!(
        s.lookup().assemble_permissions(&file, &owner).unwrap(),
        Permissions::all()
    );
}

#[test]
fn test_ancestor_deny_is_terminal() {
    let s = Store::new();
    let projects = s.mkdir(&s.space, "projects");
    let alpha = s.mkdir(&projects, "alpha");
    let file = s.touch(&alpha, "spec.md", 1);

    file.add_grant(&Grant::new(Grantee::User("erin".into()), Permissions::editor()))
        .unwrap();
    projects
        .deny_grant(&Grantee::Group("contractors".into()), "admin")
        .unwrap();

    let erin = User::new("erin").with_groups(["contractors"]);
    assert!(s.lookup().assemble_permissions(&file, &erin).unwrap().is_empty());

    let employee = User::new("erin");
    assert_eq!(
        s.lookup().assemble_permissions(&file, &employee).unwrap(),
        Permissions::editor().effective()
    );
}

#[test]
fn test_expired_grant_stops_counting() {
    let s = Store::new();
    let file = s.touch(&s.space, "a.txt", 1);
    let expires = Timestamp::new(s.clock.now().timestamp() as u64 + 3600, 0);
    file.add_grant(
        &Grant::new(Grantee::User("frank".into()), Permissions::viewer()).with_expiration(expires),
    )
    .unwrap();

    let frank = User::new("frank");
    assert!(!s.lookup().assemble_permissions(&file, &frank).unwrap().is_empty());

    s.clock.advance(chrono::Duration::hours(2));
    assert!(s.lookup().assemble_permissions(&file, &frank).unwrap().is_empty());
}

#[test]
fn test_path_truncated_by_grant_visibility() {
    let s = Store::new();
    let private = s.mkdir(&s.space, "private");
    let shared = s.mkdir(&private, "shared");
    let file = s.touch(&shared, "notes.txt", 1);
    shared
        .add_grant(&Grant::new(Grantee::User("gina".into()), Permissions::viewer()))
        .unwrap();

    let gina = User::new("gina");
    let visible = |n: &nodefs_tree::Node| {
        n.read_user_permissions(&gina)
            .map(|d| d.permissions.contains(Permissions::STAT))
            .unwrap_or(false)
    };
    assert_eq!(s.lookup().path(&file, visible).unwrap(), "/shared/notes.txt");
}

#[test]
fn test_grant_cap_from_config_default() {
    let s = Store::new();
    let file = s.touch(&s.space, "busy.txt", 1);
    let limit = nodefs_config::DEFAULT_MAX_GRANTS_PER_NODE;
    for i in 0..limit {
        file.add_grant(&Grant::new(Grantee::User(format!("user{i}")), Permissions::viewer()))
            .unwrap();
    }
    let err = file
        .add_grant(&Grant::new(Grantee::User("one-too-many".into()), Permissions::viewer()))
        .unwrap_err();
    assert!(matches!(err, TreeError::GrantLimitExceeded { limit: l, .. } if l == limit));
    assert_eq!(file.list_grants().unwrap().len(), limit);
}
