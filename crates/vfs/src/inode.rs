//! Inode：文件或目录的身份、元数据与操作
//!
//! 同一个文件在树中可能被多个 [`crate::Tnode`] 引用（例如重复 lookup），
//! 但它们指向同一个 `Arc<Inode>`，因此 inode 的身份可以用 `Arc::ptr_eq` 比较。

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicUsize, Ordering};

use uapi::fcntl::OpenFlags;

use crate::dev::DeviceId;
use crate::{File, FileOps, FsError, FsResult, SuperBlock, Tnode};

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    /// 普通文件
    File,
    /// 目录
    Directory,
    /// 字符设备
    CharDevice,
    /// 块设备
    BlockDevice,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 文件权限和类型（与 POSIX 兼容）
    pub struct FileMode: u32 {
        /// 文件类型掩码
        const S_IFMT   = 0o170000;
        /// 普通文件
        const S_IFREG  = 0o100000;
        /// 目录
        const S_IFDIR  = 0o040000;
        /// 字符设备
        const S_IFCHR  = 0o020000;
        /// 块设备
        const S_IFBLK  = 0o060000;

        /// 用户读
        const S_IRUSR  = 0o400;
        /// 用户写
        const S_IWUSR  = 0o200;
        /// 用户执行
        const S_IXUSR  = 0o100;
        /// 组读
        const S_IRGRP  = 0o040;
        /// 组写
        const S_IWGRP  = 0o020;
        /// 组执行
        const S_IXGRP  = 0o010;
        /// 其他读
        const S_IROTH  = 0o004;
        /// 其他写
        const S_IWOTH  = 0o002;
        /// 其他执行
        const S_IXOTH  = 0o001;
    }
}

impl FileMode {
    /// 检查是否有读权限（暂时只检查用户权限）
    pub fn can_read(&self) -> bool {
        self.contains(FileMode::S_IRUSR)
    }

    /// 检查是否有写权限
    pub fn can_write(&self) -> bool {
        self.contains(FileMode::S_IWUSR)
    }

    /// 由类型和权限位构造
    pub fn with_kind(kind: InodeKind, perm: u32) -> Self {
        let ty = match kind {
            InodeKind::File => FileMode::S_IFREG,
            InodeKind::Directory => FileMode::S_IFDIR,
            InodeKind::CharDevice => FileMode::S_IFCHR,
            InodeKind::BlockDevice => FileMode::S_IFBLK,
        };
        ty | FileMode::from_bits_truncate(perm & 0o777)
    }
}

/// 轻量级目录项（readdir 返回）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 文件名
    pub name: String,
    /// Inode 编号
    pub index: usize,
    /// 文件类型
    pub kind: InodeKind,
    /// 文件大小（字节）
    pub size: usize,
}

/// 文件系统驱动为 inode 提供的操作
///
/// 目录相关操作（`lookup`/`readdir`/`create`/`mkdir`）对非目录 inode 调用时
/// 应返回 [`FsError::NotDirectory`]。
pub trait InodeOps: Send + Sync {
    /// 在目录 `dir` 中查找 `name`，返回以 `dir` 为父节点的新 tnode
    fn lookup(&self, dir: &Arc<Tnode>, name: &str) -> Option<Arc<Tnode>>;

    /// 列出目录内容
    fn readdir(&self, dir: &Inode) -> FsResult<Vec<DirEntry>>;

    /// 该 inode 打开后使用的文件操作；没有则不可打开
    fn file_ops(&self, _inode: &Arc<Inode>) -> Option<Arc<dyn FileOps>> {
        None
    }

    /// 打开 inode，得到一个文件会话
    fn open(&self, inode: &Arc<Inode>, flags: OpenFlags) -> FsResult<Arc<File>> {
        let ops = self.file_ops(inode).ok_or(FsError::InvalidOperation)?;
        Ok(File::new(inode.clone(), ops, flags))
    }

    /// 在目录中创建普通文件
    fn create(&self, _dir: &Arc<Inode>, _name: &str, _perm: u32) -> FsResult<Arc<Inode>> {
        Err(FsError::InvalidOperation)
    }

    /// 在目录中创建子目录
    fn mkdir(&self, _dir: &Arc<Inode>, _name: &str, _perm: u32) -> FsResult<Arc<Inode>> {
        Err(FsError::InvalidOperation)
    }
}

/// 索引节点
pub struct Inode {
    index: usize,
    kind: InodeKind,
    mode: FileMode,
    size: AtomicUsize,
    device: Option<DeviceId>,
    superblock: Weak<SuperBlock>,
    ops: Arc<dyn InodeOps>,
    private: Option<Arc<dyn Any + Send + Sync>>,
}

impl Inode {
    /// 创建 inode，大小为 0，无设备号和私有数据
    pub fn new(
        index: usize,
        kind: InodeKind,
        mode: FileMode,
        superblock: Weak<SuperBlock>,
        ops: Arc<dyn InodeOps>,
    ) -> Self {
        Self {
            index,
            kind,
            mode,
            size: AtomicUsize::new(0),
            device: None,
            superblock,
            ops,
            private: None,
        }
    }

    /// 设置初始大小
    pub fn with_size(self, size: usize) -> Self {
        self.size.store(size, Ordering::Relaxed);
        self
    }

    /// 设置设备号
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// 挂上驱动私有数据
    pub fn with_private(mut self, data: Arc<dyn Any + Send + Sync>) -> Self {
        self.private = Some(data);
        self
    }

    /// Inode 编号（在所属超级块内唯一）
    pub fn index(&self) -> usize {
        self.index
    }

    /// 文件类型
    pub fn kind(&self) -> InodeKind {
        self.kind
    }

    /// 是否为目录
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    /// 权限与类型位
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// 文件大小（字节）
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// 更新文件大小
    pub fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    /// 设备号（设备节点才有）
    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// 所属超级块；卸载后可能已不存在
    pub fn superblock(&self) -> Option<Arc<SuperBlock>> {
        self.superblock.upgrade()
    }

    /// 所属超级块的弱引用，新建子 inode 时沿用
    pub fn superblock_weak(&self) -> Weak<SuperBlock> {
        self.superblock.clone()
    }

    /// 驱动操作表
    pub fn ops(&self) -> &Arc<dyn InodeOps> {
        &self.ops
    }

    /// 按类型取驱动私有数据
    pub fn private<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.private.as_deref()?.downcast_ref::<T>()
    }

    /// 生成该 inode 的目录项描述
    pub fn dir_entry(&self, name: &str) -> DirEntry {
        DirEntry {
            name: String::from(name),
            index: self.index,
            kind: self.kind,
            size: self.size(),
        }
    }
}

impl core::fmt::Debug for Inode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("size", &self.size())
            .field("device", &self.device)
            .finish()
    }
}
