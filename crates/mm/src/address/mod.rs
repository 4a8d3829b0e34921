//! 地址模块
//!
//! 物理/虚拟地址与页码的强类型封装。
//!
//! - [`Paddr`] / [`Vaddr`]：字节地址
//! - [`Ppn`] / [`Vpn`]：页码，由 [`PageNum`] 统一描述
//! - [`PpnRange`] / [`VpnRange`]：半开页码区间 `[start, end)`
//!
//! 页大小固定为 [`PAGE_SIZE`]，与三级页表的布局一致。

mod page_num;
mod types;

pub use page_num::{PageNum, PageNumRange, PageNumRangeIterator, Ppn, PpnRange, Vpn, VpnRange};
pub use types::{Paddr, Vaddr};

/// 页大小（4 KiB）
pub const PAGE_SIZE: usize = 4096;

/// 页内偏移位数
pub const PAGE_SHIFT: usize = 12;
