//! 文件会话层
//!
//! [`File`] 是一次打开得到的会话对象，维护读写位置和打开标志；
//! 真正的数据访问交给驱动提供的 [`FileOps`]，以显式 offset 进行，
//! 因此同一个 inode 可以被多个 `File` 共享。
//!
//! 进程的文件表中以 `Arc<File>` 形式保存。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use sync::SpinLock;
use uapi::fcntl::{OpenFlags, SeekWhence};

use crate::dev::DeviceId;
use crate::{FsError, FsResult, Inode};

/// 驱动提供的文件操作
pub trait FileOps: Send + Sync {
    /// 从 `offset` 读取数据，返回读取的字节数
    fn read(&self, file: &File, offset: usize, buf: &mut [u8]) -> FsResult<usize>;

    /// 在 `offset` 写入数据，返回写入的字节数
    fn write(&self, file: &File, offset: usize, buf: &[u8]) -> FsResult<usize>;

    /// 会话关闭时调用一次
    fn close(&self, _file: &File) -> FsResult<()> {
        Ok(())
    }
}

/// 打开的文件
pub struct File {
    inode: Arc<Inode>,
    cursor: SpinLock<usize>,
    ops: Arc<dyn FileOps>,
    device: Option<DeviceId>,
    flags: OpenFlags,
    closed: AtomicBool,
}

impl File {
    /// 以 `ops` 打开 `inode`
    pub fn new(inode: Arc<Inode>, ops: Arc<dyn FileOps>, flags: OpenFlags) -> Arc<Self> {
        let device = inode.device();
        Arc::new(Self {
            inode,
            cursor: SpinLock::new(0),
            ops,
            device,
            flags,
            closed: AtomicBool::new(false),
        })
    }

    /// 对应的 inode
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 设备号（设备文件才有）
    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// 打开标志
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// 当前读写位置
    pub fn offset(&self) -> usize {
        *self.cursor.lock()
    }

    fn check_open(&self) -> FsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FsError::BadFileDescriptor)
        } else {
            Ok(())
        }
    }

    /// 从当前位置读取并推进位置
    pub fn read(&self, buf: &mut [u8]) -> FsResult<usize> {
        self.check_open()?;
        if !self.flags.readable() {
            return Err(FsError::BadFileDescriptor);
        }
        // 持有位置锁完成整次读取，并发读不会读到同一段
        let mut cursor = self.cursor.lock();
        let n = self.ops.read(self, *cursor, buf)?;
        *cursor += n;
        Ok(n)
    }

    /// 从指定偏移读取，不改变读写位置
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> FsResult<usize> {
        self.check_open()?;
        if !self.flags.readable() {
            return Err(FsError::BadFileDescriptor);
        }
        self.ops.read(self, offset, buf)
    }

    /// 在当前位置写入并推进位置；`O_APPEND` 时先移到文件末尾
    pub fn write(&self, buf: &[u8]) -> FsResult<usize> {
        self.check_open()?;
        if !self.flags.writable() {
            return Err(FsError::BadFileDescriptor);
        }
        let mut cursor = self.cursor.lock();
        if self.flags.contains(OpenFlags::O_APPEND) {
            *cursor = self.inode.size();
        }
        let n = self.ops.write(self, *cursor, buf)?;
        *cursor += n;
        Ok(n)
    }

    /// 调整读写位置，返回新位置
    pub fn seek(&self, offset: isize, whence: SeekWhence) -> FsResult<usize> {
        self.check_open()?;
        let mut cursor = self.cursor.lock();
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => *cursor,
            SeekWhence::End => self.inode.size(),
        };
        let target = base
            .checked_add_signed(offset)
            .ok_or(FsError::InvalidArgument)?;
        *cursor = target;
        Ok(target)
    }

    /// 关闭会话；重复关闭返回 `BadFileDescriptor`
    pub fn close(&self) -> FsResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(FsError::BadFileDescriptor);
        }
        self.ops.close(self)
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            if let Err(e) = self.close() {
                log::warn!("vfs: close of inode {} failed: {:?}", self.inode.index(), e);
            }
        }
    }
}

impl core::fmt::Debug for File {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("File")
            .field("inode", &self.inode.index())
            .field("offset", &self.offset())
            .field("flags", &self.flags)
            .finish()
    }
}
