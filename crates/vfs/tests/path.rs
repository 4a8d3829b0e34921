//! path 集成测试

use std::sync::Arc;

use vfs::{
    FsError, MountTable, NAME_MAX, PathComponent, RamFs, Tnode, normalize_path, parse_path,
    resolve, resolve_parent, split_path,
};

/// 根下有 `etc/passwd`、`tmp/` 和文件 `motd`
fn tree() -> (MountTable, Arc<Tnode>) {
    let mounts = MountTable::new();
    let root = mounts
        .mount(RamFs::with_files(vec![("motd".into(), b"hi".to_vec())]), None, "/")
        .unwrap()
        .root()
        .clone();
    root.mkdir("etc", 0o755)
        .unwrap()
        .create("passwd", 0o644)
        .unwrap();
    root.mkdir("tmp", 0o1777).unwrap();
    (mounts, root)
}

#[test]
fn test_parse_path_components() {
    assert_eq!(
        parse_path("/usr/./lib/.."),
        vec![
            PathComponent::Root,
            PathComponent::Normal("usr".into()),
            PathComponent::Current,
            PathComponent::Normal("lib".into()),
            PathComponent::Parent,
        ]
    );
    assert_eq!(parse_path("a//b"), parse_path("a/b"));
    assert!(parse_path("").is_empty());
}

#[test]
fn test_normalize_path() {
    assert_eq!(normalize_path("//usr///lib/"), "/usr/lib");
    assert_eq!(normalize_path("/usr/lib/../bin/./sh"), "/usr/bin/sh");
    // 绝对路径的 .. 停在根上，相对路径保留前导 ..
    assert_eq!(normalize_path("/../../etc"), "/etc");
    assert_eq!(normalize_path("../a/../../b"), "../../b");
    assert_eq!(normalize_path("a/.."), ".");
    assert_eq!(normalize_path(""), ".");
}

#[test]
fn test_split_path() {
    assert_eq!(
        split_path("/etc/passwd").unwrap(),
        ("/etc".to_string(), "passwd".to_string())
    );
    assert_eq!(
        split_path("/motd").unwrap(),
        ("/".to_string(), "motd".to_string())
    );
    assert_eq!(
        split_path("motd").unwrap(),
        (".".to_string(), "motd".to_string())
    );
    assert_eq!(split_path("/etc/"), Err(FsError::InvalidArgument));
}

#[test]
fn test_resolve_absolute_and_relative() {
    let (_mounts, root) = tree();
    let etc = resolve(&root, &root, "/etc").unwrap();

    let passwd = resolve(&root, &etc, "passwd").unwrap();
    assert_eq!(passwd.name(), "passwd");
    assert!(Arc::ptr_eq(
        &passwd,
        &resolve(&root, &root, "/tmp/../etc/./passwd").unwrap()
    ));

    let motd = resolve(&root, &etc, "../motd").unwrap();
    assert_eq!(motd.inode().size(), 2);
}

#[test]
fn test_resolve_parent_stays_at_root() {
    let (_mounts, root) = tree();
    let top = resolve(&root, &root, "/../../..").unwrap();
    assert!(Arc::ptr_eq(&top, &root));
}

#[test]
fn test_resolve_errors() {
    let (_mounts, root) = tree();
    assert_eq!(
        resolve(&root, &root, "/etc/shadow").unwrap_err(),
        FsError::NotFound
    );
    assert_eq!(
        resolve(&root, &root, "/motd/x").unwrap_err(),
        FsError::NotDirectory
    );

    let long = "x".repeat(NAME_MAX + 1);
    assert_eq!(
        resolve(&root, &root, &format!("/tmp/{long}")).unwrap_err(),
        FsError::NameTooLong
    );
}

#[test]
fn test_resolve_parent() {
    let (_mounts, root) = tree();
    let (dir, name) = resolve_parent(&root, &root, "/etc/group").unwrap();
    assert_eq!(dir.name(), "etc");
    assert_eq!(name, "group");

    assert_eq!(
        resolve_parent(&root, &root, "/etc/..").unwrap_err(),
        FsError::InvalidArgument
    );
    assert_eq!(
        resolve_parent(&root, &root, "/nope/file").unwrap_err(),
        FsError::NotFound
    );
    assert_eq!(
        resolve_parent(&root, &root, "/motd/file").unwrap_err(),
        FsError::NotDirectory
    );
}
