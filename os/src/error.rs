//! 内核上下文层的错误类型

use mm::MmError;
use task::TaskError;
use uapi::error::ErrorKind;
use vfs::FsError;

/// 汇总各子系统错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// 内存管理错误
    Mm(MmError),
    /// 文件系统错误
    Fs(FsError),
    /// 进程与调度错误
    Task(TaskError),
}

impl KernelError {
    /// 对应的错误分类
    pub const fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Mm(e) => e.kind(),
            KernelError::Fs(e) => e.kind(),
            KernelError::Task(e) => e.kind(),
        }
    }

    /// 转换为负的 errno
    pub const fn to_errno(&self) -> isize {
        match self {
            KernelError::Mm(e) => e.to_errno(),
            KernelError::Fs(e) => e.to_errno(),
            KernelError::Task(e) => e.to_errno(),
        }
    }
}

impl From<MmError> for KernelError {
    fn from(e: MmError) -> Self {
        KernelError::Mm(e)
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        KernelError::Fs(e)
    }
}

impl From<TaskError> for KernelError {
    fn from(e: TaskError) -> Self {
        KernelError::Task(e)
    }
}

/// 内核上下文层的结果类型
pub type KernelResult<T> = Result<T, KernelError>;
