//! mount 集成测试

use std::sync::Arc;

use vfs::{
    FileSystemDriver, FsError, InodeKind, MountTable, OpenFlags, RamFs, SeekWhence, Tnode,
};

fn file_list(names: &[(&str, &str)]) -> Vec<(String, Vec<u8>)> {
    names
        .iter()
        .map(|(n, c)| (n.to_string(), c.as_bytes().to_vec()))
        .collect()
}

fn ramfs_root() -> (MountTable, Arc<Tnode>) {
    let table = MountTable::new();
    table.mount(RamFs::new(), None, "/").unwrap();
    let root = table.root().unwrap();
    (table, root)
}

#[test]
fn test_mount_populates_children_from_listing() {
    let (table, root) = ramfs_root();
    root.mkdir("mnt", 0o755).unwrap();

    let image = RamFs::with_files(file_list(&[
        ("a.txt", "alpha"),
        ("b.txt", "bravo!"),
        ("empty", ""),
    ]));
    let sb = table.mount(image, None, "/mnt").unwrap();

    let children = sb.root().children();
    assert_eq!(children.len(), 3);
    let mut seen: Vec<(String, usize)> = children
        .iter()
        .map(|t| (t.name().to_string(), t.inode().size()))
        .collect();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("a.txt".to_string(), 5),
            ("b.txt".to_string(), 6),
            ("empty".to_string(), 0),
        ]
    );
}

#[test]
fn test_first_mount_becomes_root() {
    let table = MountTable::new();
    assert_eq!(table.root().unwrap_err(), FsError::NotFound);
    assert_eq!(
        table.mount(RamFs::new(), None, "/mnt").unwrap_err(),
        FsError::NotFound
    );

    let sb = table.mount(RamFs::new(), None, "/").unwrap();
    assert!(Arc::ptr_eq(sb.root(), &table.root().unwrap()));
    assert!(sb.mountpoint().is_none());
    assert_eq!(
        table.mount(RamFs::new(), None, "/").unwrap_err(),
        FsError::Busy
    );
}

#[test]
fn test_lookup_is_idempotent() {
    let (table, root) = ramfs_root();
    root.create("f", 0o644).unwrap();

    let a = table.lookup("/f").unwrap();
    let b = table.lookup("/f").unwrap();
    assert!(Arc::ptr_eq(a.inode(), b.inode()));
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_lookup_errors() {
    let (table, root) = ramfs_root();
    root.create("file", 0o644).unwrap();
    root.mkdir("dir", 0o755).unwrap();

    assert_eq!(table.lookup("/missing").unwrap_err(), FsError::NotFound);
    assert_eq!(
        table.lookup("/file/child").unwrap_err(),
        FsError::NotDirectory
    );
    let dir = table.lookup("/dir").unwrap();
    assert_eq!(
        dir.open(OpenFlags::O_RDONLY).unwrap_err(),
        FsError::InvalidOperation
    );
    assert_eq!(
        root.create("file", 0o644).unwrap_err(),
        FsError::AlreadyExists
    );
}

#[test]
fn test_resolution_crosses_mounts_both_ways() {
    let (table, root) = ramfs_root();
    root.mkdir("mnt", 0o755).unwrap();
    root.create("top", 0o644).unwrap();
    table
        .mount(RamFs::with_files(file_list(&[("inner", "x")])), None, "/mnt")
        .unwrap();

    let inner = table.lookup("/mnt/inner").unwrap();
    assert_eq!(inner.inode().kind(), InodeKind::File);

    let mnt = table.lookup("/mnt").unwrap();
    assert!(mnt.parent().is_none());
    let top = table.lookup_from(&mnt, "../top").unwrap();
    assert!(Arc::ptr_eq(&top, &table.lookup("/top").unwrap()));

    // 根之上的 ".." 停在根
    let r = table.lookup("/../..").unwrap();
    assert!(Arc::ptr_eq(&r, &root));
}

#[test]
fn test_umount() {
    let (table, root) = ramfs_root();
    root.mkdir("mnt", 0o755).unwrap();
    table
        .mount(RamFs::with_files(file_list(&[("inner", "x")])), None, "/mnt")
        .unwrap();

    assert_eq!(table.umount("/").unwrap_err(), FsError::Busy);
    assert_eq!(table.umount("/nowhere").unwrap_err(), FsError::NotFound);

    let sb = table.umount("/mnt").unwrap();
    assert_eq!(sb.fs_name(), "ramfs");
    assert_eq!(table.lookup("/mnt/inner").unwrap_err(), FsError::NotFound);
    assert_eq!(table.list().len(), 1);
}

#[test]
fn test_file_read_write_seek() {
    let (table, root) = ramfs_root();
    root.create("data", 0o644).unwrap();
    let node = table.lookup("/data").unwrap();

    let file = node.open(OpenFlags::O_RDWR).unwrap();
    assert_eq!(file.write(b"hello world").unwrap(), 11);
    assert_eq!(node.inode().size(), 11);

    assert_eq!(file.seek(6, SeekWhence::Set).unwrap(), 6);
    let mut buf = [0u8; 16];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"world");
    assert_eq!(file.read(&mut buf).unwrap(), 0);

    assert_eq!(file.seek(-5, SeekWhence::End).unwrap(), 6);
    assert_eq!(
        file.seek(-7, SeekWhence::Cur).unwrap_err(),
        FsError::InvalidArgument
    );

    let appender = node
        .open(OpenFlags::O_WRONLY | OpenFlags::O_APPEND)
        .unwrap();
    appender.write(b"!").unwrap();
    assert_eq!(node.inode().size(), 12);
    assert_eq!(
        appender.read(&mut buf).unwrap_err(),
        FsError::BadFileDescriptor
    );

    file.close().unwrap();
    assert_eq!(file.close().unwrap_err(), FsError::BadFileDescriptor);
    assert_eq!(file.read(&mut buf).unwrap_err(), FsError::BadFileDescriptor);
}

#[test]
fn test_write_past_end_zero_fills_gap() {
    let (table, root) = ramfs_root();
    root.create("sparse", 0o644).unwrap();
    let node = table.lookup("/sparse").unwrap();
    let file = node.open(OpenFlags::O_RDWR).unwrap();

    file.write(b"ab").unwrap();
    file.seek(6, SeekWhence::Set).unwrap();
    assert_eq!(file.write(b"cd").unwrap(), 2);
    assert_eq!(node.inode().size(), 8);

    // 覆盖已有内容不改变大小
    file.seek(1, SeekWhence::Set).unwrap();
    file.write(b"X").unwrap();
    assert_eq!(node.inode().size(), 8);

    let mut buf = [0xffu8; 8];
    assert_eq!(file.read_at(0, &mut buf).unwrap(), 8);
    assert_eq!(&buf, b"aX\0\0\0\0cd");
}

#[test]
fn test_driver_name() {
    let fs: Arc<dyn FileSystemDriver> = RamFs::new();
    assert_eq!(fs.fs_name(), "ramfs");
}
