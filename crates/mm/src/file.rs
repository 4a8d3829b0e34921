//! 文件映射接口 trait 定义

use crate::error::MmResult;

/// 可映射到内存的文件
///
/// 文件后备的内存对象在页首次被访问时通过它填充内容。
/// os crate 把 vfs 的打开文件适配为此 trait。
pub trait MmFile: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> MmResult<usize>;
}
