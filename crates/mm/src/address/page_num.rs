//! 页码抽象模块
//!
//! 页码是地址空间中页的索引，它将内存管理抽象与底层字节地址解耦。

use core::fmt;
use core::ops::{Add, Sub};

use super::types::{Paddr, Vaddr};
use super::{PAGE_SHIFT, PAGE_SIZE};

/// 页码 Trait，由 [`Ppn`] 和 [`Vpn`] 实现
pub trait PageNum:
    Copy + Ord + Add<usize, Output = Self> + Sub<usize, Output = Self> + fmt::Debug
{
    /// 关联的地址类型
    type TAddress: Copy;

    /// 由 usize 构造
    fn from_usize(value: usize) -> Self;

    /// 取出 usize 值
    fn as_usize(self) -> usize;

    /// 包含该地址的页（向下取整）
    fn from_addr_floor(addr: Self::TAddress) -> Self;

    /// 向上取整：页内地址指向下一页
    fn from_addr_ceil(addr: Self::TAddress) -> Self;

    /// 页的起始地址
    fn start_addr(self) -> Self::TAddress;

    /// 页的结束地址（下一页的起始地址）
    fn end_addr(self) -> Self::TAddress {
        (self + 1).start_addr()
    }
}

macro_rules! impl_page_num {
    ($type:ident, $addr:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $type(pub usize);

        impl PageNum for $type {
            type TAddress = $addr;

            fn from_usize(value: usize) -> Self {
                Self(value)
            }

            fn as_usize(self) -> usize {
                self.0
            }

            fn from_addr_floor(addr: $addr) -> Self {
                Self(addr.as_usize() >> PAGE_SHIFT)
            }

            fn from_addr_ceil(addr: $addr) -> Self {
                Self(addr.as_usize().div_ceil(PAGE_SIZE))
            }

            fn start_addr(self) -> $addr {
                $addr::from_usize(self.0 << PAGE_SHIFT)
            }
        }

        impl Add<usize> for $type {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $type {
            type Output = Self;

            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($type), self.0)
            }
        }
    };
}

impl_page_num!(Ppn, Paddr, "物理页码");
impl_page_num!(Vpn, Vaddr, "虚拟页码");

/// 半开页码区间 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageNumRange<T: PageNum> {
    /// 起始页码（包含）
    pub start: T,
    /// 结束页码（不包含）
    pub end: T,
}

impl<T: PageNum> PageNumRange<T> {
    /// 创建区间
    pub fn new(start: T, end: T) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// 从起始页码和页数创建区间
    pub fn from_start_len(start: T, len: usize) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// 起始页码
    pub fn start(&self) -> T {
        self.start
    }

    /// 结束页码（不包含）
    pub fn end(&self) -> T {
        self.end
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    /// 是否为空区间
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 是否包含给定页码
    pub fn contains(&self, page: T) -> bool {
        page >= self.start && page < self.end
    }

    /// 两个区间是否重叠（相邻不算重叠）
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    /// 区间迭代器
    pub fn iter(&self) -> PageNumRangeIterator<T> {
        PageNumRangeIterator {
            current: self.start,
            end: self.end,
        }
    }
}

impl<T: PageNum> IntoIterator for PageNumRange<T> {
    type Item = T;
    type IntoIter = PageNumRangeIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 按升序返回区间内每个页码
pub struct PageNumRangeIterator<T: PageNum> {
    current: T,
    end: T,
}

impl<T: PageNum> Iterator for PageNumRangeIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.current >= self.end {
            return None;
        }
        let page = self.current;
        self.current = self.current + 1;
        Some(page)
    }
}

/// 物理页码范围
pub type PpnRange = PageNumRange<Ppn>;
/// 虚拟页码范围
pub type VpnRange = PageNumRange<Vpn>;
