//! 任务子系统错误类型

use mm::MmError;
use uapi::error::ErrorKind;
use vfs::FsError;

/// 进程、调度与用户互斥量操作的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// 进程号已被登记
    AlreadyExists,
    /// 进程、定时器或互斥量表项不存在
    NotFound,
    /// 目标核的 IPI 收件箱已满
    QueueFull,
    /// 表项增长或分配失败
    OutOfMemory,
    /// 核号超出范围
    InvalidCpu,
    /// 内存管理错误
    Mm(MmError),
    /// 文件系统错误
    Fs(FsError),
}

impl TaskError {
    /// 对应的错误分类
    pub const fn kind(&self) -> ErrorKind {
        match self {
            TaskError::AlreadyExists => ErrorKind::PlacementConflict,
            TaskError::NotFound => ErrorKind::NotFound,
            TaskError::QueueFull | TaskError::OutOfMemory => ErrorKind::ResourceExhausted,
            TaskError::InvalidCpu => ErrorKind::InvalidInput,
            TaskError::Mm(e) => e.kind(),
            TaskError::Fs(e) => e.kind(),
        }
    }

    /// 转换为负的 errno
    pub const fn to_errno(&self) -> isize {
        match self {
            TaskError::NotFound => -uapi::errno::ESRCH,
            TaskError::QueueFull => -uapi::errno::EAGAIN,
            TaskError::Mm(e) => e.to_errno(),
            TaskError::Fs(e) => e.to_errno(),
            other => other.kind().to_errno(),
        }
    }
}

impl From<MmError> for TaskError {
    fn from(e: MmError) -> Self {
        TaskError::Mm(e)
    }
}

impl From<FsError> for TaskError {
    fn from(e: FsError) -> Self {
        TaskError::Fs(e)
    }
}

/// 任务子系统操作的结果类型
pub type TaskResult<T> = Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_passthrough() {
        assert_eq!(
            TaskError::from(MmError::InvalidAddress).to_errno(),
            -uapi::errno::EFAULT
        );
        assert_eq!(TaskError::QueueFull.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(TaskError::OutOfMemory.to_errno(), -uapi::errno::ENOMEM);
        assert_eq!(TaskError::AlreadyExists.to_errno(), -uapi::errno::EEXIST);
    }
}
