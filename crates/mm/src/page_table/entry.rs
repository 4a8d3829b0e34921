//! 页表项

use bitflags::bitflags;

use crate::address::Ppn;

bitflags! {
    /// 与架构无关的页表项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UniversalPTEFlag: u64 {
        /// 有效
        const VALID = 1 << 0;
        /// 可读
        const READABLE = 1 << 1;
        /// 可写
        const WRITEABLE = 1 << 2;
        /// 可执行
        const EXECUTABLE = 1 << 3;
        /// 用户态可访问
        const USER_ACCESSIBLE = 1 << 4;
        /// 全局映射
        const GLOBAL = 1 << 5;
        /// 已访问
        const ACCESSED = 1 << 6;
        /// 已写脏
        const DIRTY = 1 << 7;
    }
}

impl UniversalPTEFlag {
    /// 用户可读写数据页
    pub const fn user_rw() -> Self {
        Self::VALID
            .union(Self::READABLE)
            .union(Self::WRITEABLE)
            .union(Self::USER_ACCESSIBLE)
    }

    /// 内核可读写数据页
    pub const fn kernel_rw() -> Self {
        Self::VALID.union(Self::READABLE).union(Self::WRITEABLE)
    }

    /// 是否为叶子项（任一 R/W/X 置位）
    pub const fn is_leaf(self) -> bool {
        self.intersects(
            Self::READABLE
                .union(Self::WRITEABLE)
                .union(Self::EXECUTABLE),
        )
    }
}

const FLAG_MASK: u64 = 0xff;
const PPN_SHIFT: u32 = 10;
const PPN_MASK: u64 = (1 << 44) - 1;

/// 64 位页表项
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// 空表项
    pub const EMPTY: Self = Self(0);

    /// 由页号和标志构造
    pub fn new(ppn: Ppn, flags: UniversalPTEFlag) -> Self {
        Self(((ppn.0 as u64 & PPN_MASK) << PPN_SHIFT) | flags.bits())
    }

    /// 物理页号
    pub fn ppn(self) -> Ppn {
        Ppn(((self.0 >> PPN_SHIFT) & PPN_MASK) as usize)
    }

    /// 标志
    pub fn flags(self) -> UniversalPTEFlag {
        UniversalPTEFlag::from_bits_truncate(self.0 & FLAG_MASK)
    }

    /// 是否有效
    pub fn is_valid(self) -> bool {
        self.flags().contains(UniversalPTEFlag::VALID)
    }

    /// 是否为有效叶子项
    pub fn is_leaf(self) -> bool {
        self.is_valid() && self.flags().is_leaf()
    }
}
