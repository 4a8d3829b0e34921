//! 文件打开标志与 lseek 定位方式

bitflags::bitflags! {
    /// open(2) 的标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const O_RDONLY    = 0o0;
        const O_WRONLY    = 0o1;
        const O_RDWR      = 0o2;
        const O_CREAT     = 0o100;
        const O_EXCL      = 0o200;
        const O_TRUNC     = 0o1000;
        const O_APPEND    = 0o2000;
        const O_NONBLOCK  = 0o4000;
        const O_DIRECTORY = 0o200000;
        const O_CLOEXEC   = 0o2000000;
    }
}

impl OpenFlags {
    /// 访问模式掩码
    pub const ACCMODE: u32 = 0o3;

    /// 是否可读
    pub fn readable(&self) -> bool {
        let mode = self.bits() & Self::ACCMODE;
        mode == Self::O_RDONLY.bits() || mode == Self::O_RDWR.bits()
    }

    /// 是否可写
    pub fn writable(&self) -> bool {
        let mode = self.bits() & Self::ACCMODE;
        mode == Self::O_WRONLY.bits() || mode == Self::O_RDWR.bits()
    }
}

/// lseek 的定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode() {
        assert!(OpenFlags::O_RDONLY.readable());
        assert!(!OpenFlags::O_RDONLY.writable());
        assert!(OpenFlags::O_WRONLY.writable());
        assert!(!OpenFlags::O_WRONLY.readable());
        let rw = OpenFlags::O_RDWR | OpenFlags::O_CREAT;
        assert!(rw.readable() && rw.writable());
    }
}
