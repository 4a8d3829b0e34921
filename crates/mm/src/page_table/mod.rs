//! 页表模块
//!
//! 三级基数页表（Sv39 布局）：每级 9 位索引，4 KiB 页，
//! 64 位表项的低 8 位为标志、第 10 位起为物理页号。
//! 页表自身使用的帧来自全局帧分配器，随 [`PageTable`] 一起释放。

mod entry;
mod table;

pub use entry::{PageTableEntry, UniversalPTEFlag};
pub use table::PageTable;

/// 页表级数
pub const LEVELS: usize = 3;

/// 每个页表页的表项数
pub const ENTRIES_PER_TABLE: usize = 512;

/// 虚拟页号的有效位数
pub const VPN_BITS: usize = 9 * LEVELS;
