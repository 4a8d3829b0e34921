//! 内存管理错误类型

use uapi::error::ErrorKind;

/// 内存管理操作的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// 区域会与相邻区域重叠
    WouldOverlap,
    /// 区域会收缩为空，或越过地址 0 / 后备对象起点
    WouldUnderflow,
    /// 指定类型的区域不存在
    NotFound,
    /// 虚拟页未映射
    NotMapped,
    /// 虚拟页已映射
    AlreadyMapped,
    /// 物理帧（含页表帧）耗尽
    OutOfMemory,
    /// 地址未对齐、不在任何区域内或访问权限不符
    InvalidAddress,
    /// 标志组合无效
    InvalidFlags,
}

impl MmError {
    /// 对应的错误分类
    pub const fn kind(self) -> ErrorKind {
        match self {
            MmError::WouldOverlap | MmError::WouldUnderflow | MmError::AlreadyMapped => {
                ErrorKind::PlacementConflict
            }
            MmError::NotFound | MmError::NotMapped => ErrorKind::NotFound,
            MmError::OutOfMemory => ErrorKind::ResourceExhausted,
            MmError::InvalidAddress | MmError::InvalidFlags => ErrorKind::InvalidInput,
        }
    }

    /// 转换为负的 errno
    pub const fn to_errno(self) -> isize {
        match self {
            MmError::InvalidAddress => -uapi::errno::EFAULT,
            other => other.kind().to_errno(),
        }
    }
}

/// 内存管理操作的结果类型
pub type MmResult<T> = Result<T, MmError>;
