//! VFS 错误类型
//!
//! 定义了与 POSIX 兼容的文件系统错误码，可通过 [`FsError::to_errno()`] 转换为系统调用错误码，
//! 也可通过 [`FsError::kind()`] 归入内核统一的错误分类。

use uapi::errno;
use uapi::error::ErrorKind;

/// VFS 错误类型
///
/// 各错误码对应标准 POSIX errno 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    // 文件/目录相关
    /// 文件不存在 (-ENOENT)
    NotFound,
    /// 文件已存在 (-EEXIST)
    AlreadyExists,
    /// 不是目录 (-ENOTDIR)
    NotDirectory,
    /// 是目录 (-EISDIR)
    IsDirectory,
    /// 目录非空 (-ENOTEMPTY)
    DirectoryNotEmpty,

    // 文件描述符相关
    /// 无效的文件描述符 (-EBADF)
    BadFileDescriptor,
    /// 打开的文件过多 (-EMFILE)
    TooManyOpenFiles,

    // 参数相关
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 文件名过长 (-ENAMETOOLONG)
    NameTooLong,
    /// 该 inode 不支持此操作，例如打开没有文件操作的目录 (-EOPNOTSUPP)
    InvalidOperation,

    // 文件系统相关
    /// 挂载点或设备正忙 (-EBUSY)
    Busy,
    /// 设备不存在 (-ENODEV)
    NoDevice,
    /// I/O 错误 (-EIO)
    IoError,
    /// 内存不足 (-ENOMEM)
    OutOfMemory,
}

impl FsError {
    /// 对应的错误分类
    pub const fn kind(&self) -> ErrorKind {
        match self {
            FsError::AlreadyExists | FsError::Busy => ErrorKind::PlacementConflict,
            FsError::NotFound | FsError::NoDevice | FsError::BadFileDescriptor => {
                ErrorKind::NotFound
            }
            FsError::TooManyOpenFiles | FsError::OutOfMemory => ErrorKind::ResourceExhausted,
            FsError::NotDirectory
            | FsError::IsDirectory
            | FsError::DirectoryNotEmpty
            | FsError::InvalidArgument
            | FsError::NameTooLong
            | FsError::InvalidOperation
            | FsError::IoError => ErrorKind::InvalidInput,
        }
    }

    /// 转换为系统调用错误码（负数）
    pub const fn to_errno(&self) -> isize {
        match self {
            FsError::NotFound => -errno::ENOENT,
            FsError::IoError => -errno::EIO,
            FsError::BadFileDescriptor => -errno::EBADF,
            FsError::OutOfMemory => -errno::ENOMEM,
            FsError::Busy => -errno::EBUSY,
            FsError::AlreadyExists => -errno::EEXIST,
            FsError::NoDevice => -errno::ENODEV,
            FsError::NotDirectory => -errno::ENOTDIR,
            FsError::IsDirectory => -errno::EISDIR,
            FsError::InvalidArgument => -errno::EINVAL,
            FsError::TooManyOpenFiles => -errno::EMFILE,
            FsError::NameTooLong => -errno::ENAMETOOLONG,
            FsError::DirectoryNotEmpty => -errno::ENOTEMPTY,
            FsError::InvalidOperation => -errno::EOPNOTSUPP,
        }
    }
}

/// VFS 操作的结果类型
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound.to_errno(), -2);
        assert_eq!(FsError::TooManyOpenFiles.to_errno(), -24);
        assert_eq!(FsError::NotDirectory.to_errno(), -20);
        assert_eq!(FsError::AlreadyExists.kind(), ErrorKind::PlacementConflict);
        assert_eq!(FsError::TooManyOpenFiles.kind(), ErrorKind::ResourceExhausted);
    }
}
