//! 与 Linux 兼容的错误码
//!
//! 系统调用返回 `-errno` 表示失败。

pub const EPERM: isize = 1;
pub const ENOENT: isize = 2;
pub const ESRCH: isize = 3;
pub const EINTR: isize = 4;
pub const EIO: isize = 5;
pub const EBADF: isize = 9;
pub const EAGAIN: isize = 11;
pub const ENOMEM: isize = 12;
pub const EACCES: isize = 13;
pub const EFAULT: isize = 14;
pub const EBUSY: isize = 16;
pub const EEXIST: isize = 17;
pub const ENODEV: isize = 19;
pub const ENOTDIR: isize = 20;
pub const EISDIR: isize = 21;
pub const EINVAL: isize = 22;
pub const EMFILE: isize = 24;
pub const ENOSPC: isize = 28;
pub const ENAMETOOLONG: isize = 36;
pub const ENOTEMPTY: isize = 39;
pub const ELOOP: isize = 40;
pub const EOPNOTSUPP: isize = 95;
