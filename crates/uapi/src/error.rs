//! 内核错误分类
//!
//! 各子系统（mm / vfs / task）拥有各自的错误枚举，但都可以归入下面四类之一。
//! 调用方可以据此决定处理策略；核心内部不会对任何一类错误自动重试。
//!
//! 致命异常（未处理的缺页、通用保护异常、双重异常、非法指令）不属于错误，
//! 它们直接终止出错的执行上下文，不会以返回值的形式出现。

use crate::errno;

/// 非致命错误的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 放置冲突：内存区域操作会与相邻区域重叠，或越过边界
    PlacementConflict,
    /// 按键查找区域、进程、tnode 或表项失败
    NotFound,
    /// 资源耗尽：物理帧、表项或文件表槽位不足
    ResourceExhausted,
    /// 无效输入：错误的地址、标志组合或路径
    InvalidInput,
}

impl ErrorKind {
    /// 该分类的默认错误码（负数）
    pub const fn to_errno(self) -> isize {
        match self {
            ErrorKind::PlacementConflict => -errno::EEXIST,
            ErrorKind::NotFound => -errno::ENOENT,
            ErrorKind::ResourceExhausted => -errno::ENOMEM,
            ErrorKind::InvalidInput => -errno::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_errno_is_negative() {
        for kind in [
            ErrorKind::PlacementConflict,
            ErrorKind::NotFound,
            ErrorKind::ResourceExhausted,
            ErrorKind::InvalidInput,
        ] {
            assert!(kind.to_errno() < 0);
        }
        assert_eq!(ErrorKind::NotFound.to_errno(), -2);
    }
}
