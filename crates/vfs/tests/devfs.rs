//! devfs 集成测试

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use vfs::{
    DevFs, Device, File, FileMode, FileOps, FileTable, FsError, FsResult, InodeKind, MountTable,
    OpenFlags, RamFs, Tnode, makedev,
};

/// 读出全零，写入计数后丢弃
#[derive(Default)]
struct ZeroDevice {
    written: AtomicUsize,
    closed: AtomicUsize,
}

impl FileOps for ZeroDevice {
    fn read(&self, _file: &File, _offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, _file: &File, _offset: usize, buf: &[u8]) -> FsResult<usize> {
        self.written.fetch_add(buf.len(), Ordering::Relaxed);
        Ok(buf.len())
    }

    fn close(&self, _file: &File) -> FsResult<()> {
        self.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn zero(ops: Arc<ZeroDevice>, name: &str, minor: u32) -> Device {
    Device {
        name: name.to_string(),
        number: makedev(1, minor),
        mode: FileMode::with_kind(InodeKind::CharDevice, 0o666),
        ops,
    }
}

fn boot_vfs() -> (MountTable, Arc<DevFs>) {
    let table = MountTable::new();
    table.mount(RamFs::new(), None, "/").unwrap();
    table.root().unwrap().mkdir("dev", 0o755).unwrap();
    let devfs = DevFs::new();
    table.mount(devfs.clone(), None, "/dev").unwrap();
    (table, devfs)
}

#[test]
fn test_register_makes_node_appear() {
    let (table, devfs) = boot_vfs();
    let ops = Arc::new(ZeroDevice::default());
    devfs.register(zero(ops.clone(), "zero", 5)).unwrap();

    let node = table.lookup("/dev/zero").unwrap();
    assert_eq!(node.inode().kind(), InodeKind::CharDevice);
    assert_eq!(node.inode().device(), Some(makedev(1, 5)));

    let file = node.open(OpenFlags::O_RDWR).unwrap();
    assert_eq!(file.device(), Some(makedev(1, 5)));
    let mut buf = [0xffu8; 8];
    assert_eq!(file.read(&mut buf).unwrap(), 8);
    assert_eq!(buf, [0u8; 8]);
    file.write(b"abc").unwrap();
    assert_eq!(ops.written.load(Ordering::Relaxed), 3);

    drop(file);
    assert_eq!(ops.closed.load(Ordering::Relaxed), 1);
}

#[test]
fn test_devices_registered_before_mount_are_listed() {
    let devfs = DevFs::new();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "null", 3))
        .unwrap();

    let table = MountTable::new();
    table.mount(RamFs::new(), None, "/").unwrap();
    table.root().unwrap().mkdir("dev", 0o755).unwrap();
    let sb = table.mount(devfs, None, "/dev").unwrap();
    assert_eq!(sb.root().children().len(), 1);
    assert!(table.lookup("/dev/null").is_ok());
}

#[test]
fn test_register_keeps_going_past_cached_name() {
    let table = MountTable::new();
    table.mount(RamFs::new(), None, "/").unwrap();
    table.root().unwrap().mkdir("dev", 0o755).unwrap();
    let devfs = DevFs::new();
    let sb = table.mount(devfs.clone(), None, "/dev").unwrap();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "zero", 5))
        .unwrap();

    // 挂载根下已有同名缓存节点时，注册照常完成，原节点保持不变
    let root = sb.root();
    let zero_inode = table.lookup("/dev/zero").unwrap().inode().clone();
    root.add_child(Tnode::new("tty", zero_inode, root)).unwrap();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "tty", 6))
        .unwrap();
    assert_eq!(
        table.lookup("/dev/tty").unwrap().inode().device(),
        Some(makedev(1, 5))
    );

    // 注销后重新查找得到注册表中的设备
    devfs.unregister(makedev(1, 6)).unwrap();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "tty", 6))
        .unwrap();
    assert_eq!(
        table.lookup("/dev/tty").unwrap().inode().device(),
        Some(makedev(1, 6))
    );
}

#[test]
fn test_register_duplicate_and_unregister_absent() {
    let (table, devfs) = boot_vfs();
    let ops = Arc::new(ZeroDevice::default());
    devfs.register(zero(ops.clone(), "zero", 5)).unwrap();

    assert_eq!(
        devfs.register(zero(ops.clone(), "zero2", 5)).unwrap_err(),
        FsError::AlreadyExists
    );
    assert_eq!(
        devfs.unregister(makedev(1, 9)).unwrap_err(),
        FsError::NotFound
    );

    let bad = Device {
        name: "plain".to_string(),
        number: makedev(1, 7),
        mode: FileMode::with_kind(InodeKind::File, 0o644),
        ops,
    };
    assert_eq!(devfs.register(bad).unwrap_err(), FsError::InvalidArgument);

    devfs.unregister(makedev(1, 5)).unwrap();
    assert!(devfs.is_empty());
    assert_eq!(table.lookup("/dev/zero").unwrap_err(), FsError::NotFound);
}

#[test]
fn test_file_table_slots() {
    let (table, devfs) = boot_vfs();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "zero", 5))
        .unwrap();
    let node = table.lookup("/dev/zero").unwrap();

    let files = FileTable::new(3);
    let f = node.open(OpenFlags::O_RDONLY).unwrap();
    assert_eq!(files.alloc(f.clone()).unwrap(), 0);
    assert_eq!(files.dup(0).unwrap(), 1);
    assert_eq!(files.alloc(f.clone()).unwrap(), 2);
    assert_eq!(files.alloc(f.clone()).unwrap_err(), FsError::TooManyOpenFiles);

    files.close(1).unwrap();
    assert_eq!(files.close(1).unwrap_err(), FsError::BadFileDescriptor);
    assert_eq!(files.get(1).unwrap_err(), FsError::BadFileDescriptor);
    assert_eq!(files.alloc(f.clone()).unwrap(), 1);

    assert!(files.install_at(2, f.clone()).unwrap().is_some());
    assert_eq!(
        files.install_at(3, f.clone()).unwrap_err(),
        FsError::BadFileDescriptor
    );

    let taken = files.take_all();
    assert_eq!(taken.len(), 3);
    assert!(files.is_empty());
}

#[test]
fn test_file_table_cloexec() {
    let (table, devfs) = boot_vfs();
    devfs
        .register(zero(Arc::new(ZeroDevice::default()), "zero", 5))
        .unwrap();
    let node = table.lookup("/dev/zero").unwrap();

    let files = FileTable::default();
    files
        .alloc(node.open(OpenFlags::O_RDONLY | OpenFlags::O_CLOEXEC).unwrap())
        .unwrap();
    files.alloc(node.open(OpenFlags::O_RDONLY).unwrap()).unwrap();

    let forked = files.clone_table();
    assert_eq!(forked.len(), 2);
    assert_eq!(files.close_exec(), 1);
    assert_eq!(files.len(), 1);
    assert!(files.get(1).is_ok());
    assert_eq!(forked.len(), 2);
}
