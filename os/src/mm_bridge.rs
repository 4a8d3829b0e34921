//! 把 vfs 的打开文件适配为 [`mm::MmFile`]，供文件后备的内存对象按需读取

use alloc::sync::Arc;

use mm::{MmError, MmFile, MmResult};
use vfs::{File, FsError};

/// 包装一个打开的文件
pub struct FileBacking(Arc<File>);

impl FileBacking {
    /// 包装 `file`
    pub fn new(file: Arc<File>) -> Arc<Self> {
        Arc::new(Self(file))
    }

    /// 被包装的文件
    pub fn file(&self) -> &Arc<File> {
        &self.0
    }
}

/// 读取失败的页按无效地址处理，缺页的访问者因此被终止
impl MmFile for FileBacking {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> MmResult<usize> {
        self.0.read_at(offset, buf).map_err(|e| match e {
            FsError::OutOfMemory => MmError::OutOfMemory,
            _ => MmError::InvalidAddress,
        })
    }
}
