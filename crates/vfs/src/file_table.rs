//! 进程文件表
//!
//! 每个进程持有一张固定大小的文件表，表项为 `Arc<File>`：
//!
//! - `alloc()` 分配“最小可用 fd”，表满时返回 `TooManyOpenFiles`
//! - `dup/dup2` 共享底层 `Arc<File>`（因此共享 offset）
//! - 带 `O_CLOEXEC` 安装的表项会在 `close_exec()` 时关闭

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use sync::SpinLock;
use uapi::fcntl::OpenFlags;

use crate::{File, FsError, FsResult};

/// 默认的文件表大小
pub const DEFAULT_FILE_TABLE_SIZE: usize = 64;

#[derive(Clone)]
struct Slot {
    file: Arc<File>,
    cloexec: bool,
}

/// 文件表
pub struct FileTable {
    slots: SpinLock<Vec<Option<Slot>>>,
}

impl fmt::Debug for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let used = slots.iter().filter(|slot| slot.is_some()).count();
        f.debug_struct("FileTable")
            .field("size", &slots.len())
            .field("used", &used)
            .finish()
    }
}

impl FileTable {
    /// 创建有 `size` 个槽位的空表
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        Self {
            slots: SpinLock::new(slots),
        }
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// 已占用槽位数
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// 是否没有任何打开的文件
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 分配最小可用的文件描述符
    pub fn alloc(&self, file: Arc<File>) -> FsResult<usize> {
        let cloexec = file.flags().contains(OpenFlags::O_CLOEXEC);
        let mut slots = self.slots.lock();
        let (fd, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        *slot = Some(Slot { file, cloexec });
        Ok(fd)
    }

    /// 在指定位置安装文件，原有表项被替换并返回
    pub fn install_at(&self, fd: usize, file: Arc<File>) -> FsResult<Option<Arc<File>>> {
        let cloexec = file.flags().contains(OpenFlags::O_CLOEXEC);
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(fd).ok_or(FsError::BadFileDescriptor)?;
        Ok(slot.replace(Slot { file, cloexec }).map(|old| old.file))
    }

    /// 获取文件对象
    pub fn get(&self, fd: usize) -> FsResult<Arc<File>> {
        self.slots
            .lock()
            .get(fd)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.file.clone())
            .ok_or(FsError::BadFileDescriptor)
    }

    /// 关闭文件描述符
    ///
    /// 表项被移除；若这是该文件的最后一个引用，会话随之关闭。
    pub fn close(&self, fd: usize) -> FsResult<()> {
        let slot = self
            .slots
            .lock()
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(FsError::BadFileDescriptor)?;
        // 在表锁之外释放，驱动的 close 回调不在锁内执行
        drop(slot);
        Ok(())
    }

    /// 复制文件描述符到最小可用位置（新表项不带 `O_CLOEXEC`）
    pub fn dup(&self, old_fd: usize) -> FsResult<usize> {
        let mut slots = self.slots.lock();
        let file = slots
            .get(old_fd)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.file.clone())
            .ok_or(FsError::BadFileDescriptor)?;
        let (fd, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        *slot = Some(Slot {
            file,
            cloexec: false,
        });
        Ok(fd)
    }

    /// 复制文件描述符到指定位置
    pub fn dup2(&self, old_fd: usize, new_fd: usize) -> FsResult<usize> {
        let file = self.get(old_fd)?;
        if old_fd == new_fd {
            return Ok(new_fd);
        }
        let old = {
            let mut slots = self.slots.lock();
            let slot = slots.get_mut(new_fd).ok_or(FsError::BadFileDescriptor)?;
            slot.replace(Slot {
                file,
                cloexec: false,
            })
        };
        drop(old);
        Ok(new_fd)
    }

    /// 克隆整个文件表（用于 fork），共享所有打开的文件
    pub fn clone_table(&self) -> Self {
        Self {
            slots: SpinLock::new(self.slots.lock().clone()),
        }
    }

    /// 关闭所有带有 CLOEXEC 标志的文件（用于 exec）
    pub fn close_exec(&self) -> usize {
        let closed: Vec<Slot> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter(|slot| slot.as_ref().is_some_and(|s| s.cloexec))
                .filter_map(|slot| slot.take())
                .collect()
        };
        closed.len()
    }

    /// 取走并清空所有已打开的文件描述符
    pub fn take_all(&self) -> Vec<(usize, Arc<File>)> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .enumerate()
            .filter_map(|(fd, slot)| slot.take().map(|s| (fd, s.file)))
            .collect()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_TABLE_SIZE)
    }
}
