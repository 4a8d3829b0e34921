//! 超级块与文件系统驱动接口

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicUsize, Ordering};

use sync::SpinLock;

use crate::dev::DeviceId;
use crate::{FsResult, Inode, Tnode};

/// 文件系统驱动
///
/// 所有文件系统实现都必须实现此 trait。
pub trait FileSystemDriver: Send + Sync {
    /// 文件系统类型名称
    fn fs_name(&self) -> &'static str;

    /// 在设备上建立一个文件系统实例，返回其超级块
    fn mount(self: Arc<Self>, device: Option<DeviceId>) -> FsResult<Arc<SuperBlock>>;
}

/// 每次挂载的元数据
pub struct SuperBlock {
    fs_name: &'static str,
    device: Option<DeviceId>,
    root: Arc<Tnode>,
    driver: Arc<dyn FileSystemDriver>,
    mountpoint: SpinLock<Weak<Tnode>>,
    next_index: AtomicUsize,
}

/// 根 inode 的编号
pub const ROOT_INODE_INDEX: usize = 1;

impl SuperBlock {
    /// 创建超级块
    ///
    /// `make_root` 收到超级块自身的弱引用，用它构造根目录 inode
    /// （编号为 [`ROOT_INODE_INDEX`]）。
    pub fn new<F>(
        driver: Arc<dyn FileSystemDriver>,
        device: Option<DeviceId>,
        make_root: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Weak<SuperBlock>) -> Inode,
    {
        Arc::new_cyclic(|weak| {
            let root = Tnode::new_root(Arc::new(make_root(weak)));
            Self {
                fs_name: driver.fs_name(),
                device,
                root,
                driver,
                mountpoint: SpinLock::new(Weak::new()),
                next_index: AtomicUsize::new(ROOT_INODE_INDEX + 1),
            }
        })
    }

    /// 文件系统类型名称
    pub fn fs_name(&self) -> &'static str {
        self.fs_name
    }

    /// 底层设备号
    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// 文件系统根 tnode
    pub fn root(&self) -> &Arc<Tnode> {
        &self.root
    }

    /// 创建它的驱动
    pub fn driver(&self) -> &Arc<dyn FileSystemDriver> {
        &self.driver
    }

    /// 分配一个新的 inode 编号
    pub fn alloc_index(&self) -> usize {
        self.next_index.fetch_add(1, Ordering::Relaxed)
    }

    /// 被此文件系统覆盖的挂载点；作为全局根时为 `None`
    pub fn mountpoint(&self) -> Option<Arc<Tnode>> {
        self.mountpoint.lock().upgrade()
    }

    pub(crate) fn set_mountpoint(&self, tnode: Weak<Tnode>) {
        *self.mountpoint.lock() = tnode;
    }
}

impl core::fmt::Debug for SuperBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuperBlock")
            .field("fs_name", &self.fs_name)
            .field("device", &self.device)
            .finish()
    }
}
